// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// User-function callouts: the host-side ids a compiled program's
// `uf.NAME(...)` calls resolve to. A callout has no body in the
// program itself; it is a numbered hook the embedding host registers
// and serves at run time (`CallUserFunction(which)`).
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum UserFnError {
    DuplicateName(String),
    DuplicateId(u8),
}

impl fmt::Display for UserFnError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UserFnError::DuplicateName(n) => write!(f, "duplicate user function '{}'", n),
            UserFnError::DuplicateId(id) => write!(f, "user function id {} registered twice", id),
        }
    }
}

impl std::error::Error for UserFnError {}

/// One `userfn NAME = id;` declaration, mapping a source-level name to
/// the numeric callout id emitted in `CallUserFunction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserFnId(pub u8);

/// The set of callouts a program may invoke via `uf.NAME(...)`.
#[derive(Debug, Clone, Default)]
pub struct UserFnTable {
    by_name: HashMap<String, UserFnId>,
}

impl UserFnTable {
    pub fn new() -> Self {
        UserFnTable { by_name: HashMap::new() }
    }

    pub fn register(&mut self, name: &str, id: u8) -> Result<(), UserFnError> {
        if self.by_name.contains_key(name) {
            return Err(UserFnError::DuplicateName(name.to_string()));
        }
        if self.by_name.values().any(|existing| existing.0 == id) {
            return Err(UserFnError::DuplicateId(id));
        }
        self.by_name.insert(name.to_string(), UserFnId(id));
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<UserFnId> {
        self.by_name.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_resolves() {
        let mut t = UserFnTable::new();
        t.register("led_set", 0).unwrap();
        t.register("led_get", 1).unwrap();
        assert_eq!(t.resolve("led_set"), Some(UserFnId(0)));
        assert_eq!(t.resolve("missing"), None);
    }

    #[test]
    fn rejects_duplicate_id() {
        let mut t = UserFnTable::new();
        t.register("a", 0).unwrap();
        assert_eq!(t.register("b", 0), Err(UserFnError::DuplicateId(0)));
    }
}
