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
use crate::ll::instruction::{BinOp, CmpOp, UnOp};

// ============================================================================
// Expressions
// ============================================================================

#[derive(Clone, Debug)]
pub enum Expr {
    Int(i32),
    Name(String),
    GlobalScalar(String),
    GlobalIndex(String, Box<Expr>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// A chain of comparisons (`a < b < c`), evaluated pairwise and
    /// combined with logical-and.
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    Call(String, Vec<Expr>),
    UserCall(String, Vec<Expr>),
}

// ============================================================================
// Assignment targets
// ============================================================================

#[derive(Clone, Debug)]
pub enum LValue {
    Name(String),
    GlobalScalar(String),
    GlobalIndex(String, Box<Expr>),
}

// ============================================================================
// Statements
// ============================================================================

#[derive(Clone, Debug)]
pub enum Stmt {
    Expr(Expr),
    Assign(Vec<LValue>, Expr),
    If(Vec<(Expr, Vec<Stmt>)>, Vec<Stmt>),
    While(Expr, Vec<Stmt>, Vec<Stmt>),
    ForRange {
        var: String,
        start: Expr,
        stop: Expr,
        step: i32,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
}

// ============================================================================
// Top-level declarations
// ============================================================================

#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub defaults: Vec<i32>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug)]
pub struct UserFnDecl {
    pub name: String,
    pub id: u8,
}

#[derive(Clone, Debug, Default)]
pub struct Program {
    pub functions: Vec<Function>,
    pub userfns: Vec<UserFnDecl>,
}
