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
use embedvm::globals::{GlobalTable, Kind, ViewDecl};
use embedvm::il::{Compiler, Parser};
use embedvm::ll::program::Program;
use embedvm::userfn::UserFnTable;

fn compile(src: &str, globals: &GlobalTable, userfns: &UserFnTable) -> Vec<u8> {
    let ast = Parser::new(src).parse().unwrap();
    let mut ll = Program::new();
    Compiler::new(globals, userfns).compile(&ast, &mut ll).unwrap();
    ll.fix_all().unwrap();
    ll.to_binary().unwrap()
}

#[test]
fn function_with_default_argument_compiles() {
    let globals = GlobalTable::build(&[]).unwrap();
    let userfns = UserFnTable::new();
    let src = "\
def add(a, b = 10) {
    return a + b;
}
def main() {
    return add(1) + add(1, 2);
}
";
    let bytes = compile(src, &globals, &userfns);
    assert!(!bytes.is_empty());
}

#[test]
fn while_loop_with_else_compiles() {
    let globals = GlobalTable::build(&[]).unwrap();
    let userfns = UserFnTable::new();
    let src = "\
def main() {
    x = 0;
    while x < 5 {
        x = x + 1;
        if x == 3 {
            break;
        }
    } else {
        x = -1;
    }
    return x;
}
";
    let bytes = compile(src, &globals, &userfns);
    assert!(!bytes.is_empty());
}

#[test]
fn for_range_over_signed_global_array_compiles() {
    let decls = vec![ViewDecl::array("samples", Kind::Int8Signed, 16)];
    let globals = GlobalTable::build(&decls).unwrap();
    let userfns = UserFnTable::new();
    let src = "\
def main() {
    total = 0;
    for i in range(0, 16) {
        total = total + gv.samples[i];
    }
    return total;
}
";
    let bytes = compile(src, &globals, &userfns);
    assert!(!bytes.is_empty());
}

#[test]
fn multi_target_assignment_compiles() {
    let globals = GlobalTable::build(&[]).unwrap();
    let userfns = UserFnTable::new();
    let src = "\
def main() {
    a = b = 7;
    return a + b;
}
";
    let bytes = compile(src, &globals, &userfns);
    assert!(!bytes.is_empty());
}

#[test]
fn chained_comparison_compiles() {
    let globals = GlobalTable::build(&[]).unwrap();
    let userfns = UserFnTable::new();
    let src = "\
def main(a, b, c) {
    return a < b < c;
}
";
    let bytes = compile(src, &globals, &userfns);
    assert!(!bytes.is_empty());
}
