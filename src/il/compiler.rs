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
use crate::globals::GlobalTable;
use crate::il::term::{Expr, Function, LValue, Program as IlProgram, Stmt};
use crate::ll::block::{FreeBlock, Label};
use crate::ll::instruction::{BinOp, CmpOp, Instruction, LabelTarget};
use crate::ll::program::Program as LlProgram;
use crate::userfn::UserFnTable;
use std::collections::{HashMap, HashSet};
use std::fmt;

type Result<T> = std::result::Result<T, CompilerError>;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CompilerError {
    DuplicateFunction(String),
    UndefinedName(String),
    UndefinedFunction(String),
    UndefinedUserFunction(String),
    UndefinedGlobal(String),
    GlobalIsArray(String),
    GlobalIsScalar(String),
    BreakOutsideLoop,
    ContinueOutsideLoop,
    TooManyArguments(String),
    TooFewArguments(String),
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompilerError::DuplicateFunction(n) => write!(f, "function '{}' defined twice", n),
            CompilerError::UndefinedName(n) => write!(f, "undefined name '{}'", n),
            CompilerError::UndefinedFunction(n) => write!(f, "call to undefined function '{}'", n),
            CompilerError::UndefinedUserFunction(n) => {
                write!(f, "call to undeclared user function '{}'", n)
            }
            CompilerError::UndefinedGlobal(n) => write!(f, "undefined global '{}'", n),
            CompilerError::GlobalIsArray(n) => {
                write!(f, "'{}' is an array global, an index is required", n)
            }
            CompilerError::GlobalIsScalar(n) => write!(f, "'{}' is a scalar global, it cannot be indexed", n),
            CompilerError::BreakOutsideLoop => write!(f, "'break' outside of a loop"),
            CompilerError::ContinueOutsideLoop => write!(f, "'continue' outside of a loop"),
            CompilerError::TooManyArguments(n) => write!(f, "too many arguments in call to '{}'", n),
            CompilerError::TooFewArguments(n) => write!(f, "too few arguments in call to '{}'", n),
        }
    }
}

impl std::error::Error for CompilerError {}

// ============================================================================
// Function table
// ============================================================================

#[derive(Debug, Clone)]
struct FunctionInfo {
    label: LabelTarget,
    nparams: usize,
    defaults: Vec<i32>,
}

// ============================================================================
// Compiler
// ============================================================================

/// Lowers a parsed [`IlProgram`] into an unfixed [`LlProgram`]: one
/// concatenated free code block holding every function body, preceded
/// by the data block backing declared global views.
pub struct Compiler<'a> {
    globals: &'a GlobalTable,
    userfns: &'a UserFnTable,
    functions: HashMap<String, FunctionInfo>,
}

impl<'a> Compiler<'a> {
    pub fn new(globals: &'a GlobalTable, userfns: &'a UserFnTable) -> Self {
        Compiler { globals, userfns, functions: HashMap::new() }
    }

    pub fn compile(mut self, program: &IlProgram, ll: &mut LlProgram) -> Result<()> {
        // Register every function's entry label and signature first,
        // so calls may forward-reference functions declared later.
        for f in &program.functions {
            if self.functions.contains_key(&f.name) {
                return Err(CompilerError::DuplicateFunction(f.name.clone()));
            }
            let label = LabelTarget(ll.fresh_label());
            self.functions.insert(
                f.name.clone(),
                FunctionInfo { label, nparams: f.params.len(), defaults: f.defaults.clone() },
            );
        }

        let mut code = FreeBlock::new();
        for f in &program.functions {
            let entry = self.functions.get(&f.name).unwrap().label;
            let mut fc = FunctionCompiler::new(&self, ll, f, entry);
            let body = fc.compile_function(f)?;
            code.extend(body);
        }

        ll.push_data(self.globals.data_block());
        ll.push_code(code);
        Ok(())
    }
}

// ============================================================================
// Per-function compilation
// ============================================================================

struct FunctionCompiler<'c, 'a> {
    compiler: &'c Compiler<'a>,
    ll: &'c mut LlProgram,
    slots: HashMap<String, i8>,
    loop_stack: Vec<(LabelTarget, LabelTarget)>,
    block: FreeBlock,
}

impl<'c, 'a> FunctionCompiler<'c, 'a> {
    fn new(compiler: &'c Compiler<'a>, ll: &'c mut LlProgram, f: &Function, entry: LabelTarget) -> Self {
        let mut slots = HashMap::new();
        for (i, name) in f.params.iter().enumerate() {
            slots.insert(name.clone(), -1 - i as i8);
        }

        let params: HashSet<&String> = f.params.iter().collect();
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        collect_locals(&f.body, &params, &mut order, &mut seen);
        for (i, name) in order.into_iter().enumerate() {
            slots.insert(name, i as i8);
        }

        let mut block = FreeBlock::new();
        block.push_label(Label::exported(entry.0, f.name.clone()));

        FunctionCompiler { compiler, ll, slots, loop_stack: Vec::new(), block }
    }

    fn num_locals(&self) -> usize {
        self.slots.values().filter(|&&slot| slot >= 0).count()
    }

    fn compile_function(&mut self, f: &Function) -> Result<FreeBlock> {
        let nlocals = self.num_locals();
        if nlocals > 0 {
            self.block.push(Instruction::PushZeros((nlocals - 1) as u8));
        }
        self.compile_stmts(&f.body)?;
        if !matches!(f.body.last(), Some(Stmt::Return(_))) {
            self.block.push(Instruction::Return0);
        }
        Ok(std::mem::replace(&mut self.block, FreeBlock::new()))
    }

    fn fresh_label(&mut self) -> LabelTarget {
        LabelTarget(self.ll.fresh_label())
    }

    fn slot_of(&self, name: &str) -> Result<i8> {
        self.slots.get(name).copied().ok_or_else(|| CompilerError::UndefinedName(name.to_string()))
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn compile_stmts(&mut self, stmts: &[Stmt]) -> Result<()> {
        for s in stmts {
            self.compile_stmt(s)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, s: &Stmt) -> Result<()> {
        match s {
            Stmt::Expr(e) => {
                self.push_expr(e)?;
                self.block.push(Instruction::DropValue);
            }
            Stmt::Assign(targets, rhs) => self.compile_assign(targets, rhs)?,
            Stmt::If(branches, orelse) => self.compile_if(branches, orelse)?,
            Stmt::While(cond, body, orelse) => self.compile_while(cond, body, orelse)?,
            Stmt::ForRange { var, start, stop, step, body, orelse } => {
                self.compile_for_range(var, start, stop, *step, body, orelse)?
            }
            Stmt::Break => {
                let (_, brk) = self.loop_stack.last().copied().ok_or(CompilerError::BreakOutsideLoop)?;
                self.block.push(Instruction::JumpV(brk));
            }
            Stmt::Continue => {
                let (cont, _) =
                    self.loop_stack.last().copied().ok_or(CompilerError::ContinueOutsideLoop)?;
                self.block.push(Instruction::JumpV(cont));
            }
            Stmt::Return(None) => self.block.push(Instruction::Return0),
            Stmt::Return(Some(e)) => {
                self.push_expr(e)?;
                self.block.push(Instruction::Return);
            }
        }
        Ok(())
    }

    fn compile_assign(&mut self, targets: &[LValue], rhs: &Expr) -> Result<()> {
        self.push_expr(rhs)?;
        for _ in 0..targets.len().saturating_sub(1) {
            self.block.push(Instruction::Bury(0));
        }
        for target in targets {
            self.store_lvalue(target)?;
        }
        Ok(())
    }

    fn store_lvalue(&mut self, target: &LValue) -> Result<()> {
        match target {
            LValue::Name(n) => {
                let slot = self.slot_of(n)?;
                self.block.push(Instruction::PopLocal(slot));
            }
            LValue::GlobalScalar(n) => {
                let view = self
                    .compiler
                    .globals
                    .get(n)
                    .ok_or_else(|| CompilerError::UndefinedGlobal(n.clone()))?;
                if view.is_array {
                    return Err(CompilerError::GlobalIsArray(n.clone()));
                }
                let (width, mode) = view.scalar_mode();
                self.block.push(Instruction::GlobalAccess {
                    width,
                    store: true,
                    mode,
                    addr: Some(view.address),
                });
            }
            LValue::GlobalIndex(n, idx) => {
                let view = self
                    .compiler
                    .globals
                    .get(n)
                    .ok_or_else(|| CompilerError::UndefinedGlobal(n.clone()))?;
                if !view.is_array {
                    return Err(CompilerError::GlobalIsScalar(n.clone()));
                }
                let (width, mode) = view.indexed_mode();
                let addr = view.address;
                self.push_expr(idx)?;
                self.block.push(Instruction::GlobalAccess { width, store: true, mode, addr: Some(addr) });
            }
        }
        Ok(())
    }

    fn compile_if(&mut self, branches: &[(Expr, Vec<Stmt>)], orelse: &[Stmt]) -> Result<()> {
        let lend = self.fresh_label();
        for (cond, body) in branches {
            let lnext = self.fresh_label();
            self.push_expr(cond)?;
            self.block.push(Instruction::JumpIfNotV(lnext));
            self.compile_stmts(body)?;
            self.block.push(Instruction::JumpV(lend));
            self.block.push_label(Label::new(lnext.0));
        }
        self.compile_stmts(orelse)?;
        self.block.push_label(Label::new(lend.0));
        Ok(())
    }

    fn compile_while(&mut self, cond: &Expr, body: &[Stmt], orelse: &[Stmt]) -> Result<()> {
        let lstart = self.fresh_label();
        let lelse = self.fresh_label();
        let lend = self.fresh_label();

        self.block.push_label(Label::new(lstart.0));
        self.push_expr(cond)?;
        self.block.push(Instruction::JumpIfNotV(lelse));

        self.loop_stack.push((lstart, lend));
        self.compile_stmts(body)?;
        self.loop_stack.pop();

        self.block.push(Instruction::JumpV(lstart));
        self.block.push_label(Label::new(lelse.0));
        self.compile_stmts(orelse)?;
        self.block.push_label(Label::new(lend.0));
        Ok(())
    }

    fn compile_for_range(
        &mut self,
        var: &str,
        start: &Expr,
        stop: &Expr,
        step: i32,
        body: &[Stmt],
        orelse: &[Stmt],
    ) -> Result<()> {
        let lcmp = self.fresh_label();
        let lregend = self.fresh_label();
        let lcont = self.fresh_label();
        let lbreakend = self.fresh_label();
        let var_slot = self.slot_of(var)?;

        self.push_expr(stop)?;
        self.push_expr(start)?;
        self.block.push_label(Label::new(lcmp.0));
        self.block.push(Instruction::Bury(0));
        self.block.push(Instruction::Dig(1));
        self.block.push(Instruction::Bury(2));
        let cmp = if step > 0 { CmpOp::Geq } else { CmpOp::Leq };
        self.block.push(Instruction::Compare(cmp));
        self.block.push(Instruction::JumpIfV(lregend));
        self.block.push(Instruction::Bury(0));
        self.block.push(Instruction::PopLocal(var_slot));

        self.loop_stack.push((lcont, lbreakend));
        self.compile_stmts(body)?;
        self.loop_stack.pop();

        self.block.push_label(Label::new(lcont.0));
        self.block.push(Instruction::PushConstantV(step));
        self.block.push(Instruction::Binary(BinOp::Add));
        self.block.push(Instruction::JumpV(lcmp));
        self.block.push_label(Label::new(lregend.0));
        self.compile_stmts(orelse)?;
        self.block.push_label(Label::new(lbreakend.0));
        self.block.push(Instruction::DropValue);
        self.block.push(Instruction::DropValue);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn push_expr(&mut self, e: &Expr) -> Result<()> {
        match e {
            Expr::Int(v) => self.block.push(Instruction::PushConstantV(*v)),
            Expr::Name(n) => {
                let slot = self.slot_of(n)?;
                self.block.push(Instruction::PushLocal(slot));
            }
            Expr::GlobalScalar(n) => {
                let view = self
                    .compiler
                    .globals
                    .get(n)
                    .ok_or_else(|| CompilerError::UndefinedGlobal(n.clone()))?;
                if view.is_array {
                    return Err(CompilerError::GlobalIsArray(n.clone()));
                }
                let (width, mode) = view.scalar_mode();
                self.block.push(Instruction::GlobalAccess {
                    width,
                    store: false,
                    mode,
                    addr: Some(view.address),
                });
            }
            Expr::GlobalIndex(n, idx) => {
                let view = self
                    .compiler
                    .globals
                    .get(n)
                    .ok_or_else(|| CompilerError::UndefinedGlobal(n.clone()))?;
                if !view.is_array {
                    return Err(CompilerError::GlobalIsScalar(n.clone()));
                }
                let (width, mode) = view.indexed_mode();
                let addr = view.address;
                self.push_expr(idx)?;
                self.block.push(Instruction::GlobalAccess { width, store: false, mode, addr: Some(addr) });
            }
            Expr::Unary(op, inner) => {
                self.push_expr(inner)?;
                self.block.push(Instruction::Unary(*op));
            }
            Expr::Binary(op, lhs, rhs) => {
                self.push_expr(lhs)?;
                self.push_expr(rhs)?;
                self.block.push(Instruction::Binary(*op));
            }
            Expr::Compare(first, chain) => self.push_compare(first, chain)?,
            Expr::Call(name, args) => self.push_call(name, args)?,
            Expr::UserCall(name, args) => self.push_user_call(name, args)?,
        }
        Ok(())
    }

    /// Re-evaluates shared operands rather than caching them on the
    /// stack: `a < b < c` becomes `(a < b) && (b < c)`, with `b`
    /// emitted twice.
    fn push_compare(&mut self, first: &Expr, chain: &[(CmpOp, Expr)]) -> Result<()> {
        let mut left = first;
        for (i, (op, right)) in chain.iter().enumerate() {
            self.push_expr(left)?;
            self.push_expr(right)?;
            self.block.push(Instruction::Compare(*op));
            if i > 0 {
                self.block.push(Instruction::Binary(BinOp::LAnd));
            }
            left = right;
        }
        Ok(())
    }

    fn push_call(&mut self, name: &str, args: &[Expr]) -> Result<()> {
        let info = self
            .compiler
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| CompilerError::UndefinedFunction(name.to_string()))?;
        if args.len() > info.nparams {
            return Err(CompilerError::TooManyArguments(name.to_string()));
        }
        if args.len() + info.defaults.len() < info.nparams {
            return Err(CompilerError::TooFewArguments(name.to_string()));
        }
        let missing = info.nparams - args.len();
        for i in 0..missing {
            let value = info.defaults[info.defaults.len() - 1 - i];
            self.block.push(Instruction::PushConstantV(value));
        }
        for a in args.iter().rev() {
            self.push_expr(a)?;
        }
        self.block.push(Instruction::CallV(info.label));
        if info.nparams > 0 {
            self.block.push(Instruction::PopMany((info.nparams - 1) as u8));
        }
        Ok(())
    }

    fn push_user_call(&mut self, name: &str, args: &[Expr]) -> Result<()> {
        let id = self
            .compiler
            .userfns
            .resolve(name)
            .ok_or_else(|| CompilerError::UndefinedUserFunction(name.to_string()))?;
        for a in args.iter().rev() {
            self.push_expr(a)?;
        }
        self.block.push(Instruction::PushConstantV(args.len() as i32));
        self.block.push(Instruction::CallUserFunction(id.0));
        Ok(())
    }
}

fn collect_locals(
    stmts: &[Stmt],
    params: &HashSet<&String>,
    order: &mut Vec<String>,
    seen: &mut HashSet<String>,
) {
    for s in stmts {
        match s {
            Stmt::Assign(targets, _) => {
                for t in targets {
                    if let LValue::Name(n) = t {
                        if !params.contains(n) && seen.insert(n.clone()) {
                            order.push(n.clone());
                        }
                    }
                }
            }
            Stmt::If(branches, orelse) => {
                for (_, body) in branches {
                    collect_locals(body, params, order, seen);
                }
                collect_locals(orelse, params, order, seen);
            }
            Stmt::While(_, body, orelse) => {
                collect_locals(body, params, order, seen);
                collect_locals(orelse, params, order, seen);
            }
            Stmt::ForRange { var, body, orelse, .. } => {
                if !params.contains(var) && seen.insert(var.clone()) {
                    order.push(var.clone());
                }
                collect_locals(body, params, order, seen);
                collect_locals(orelse, params, order, seen);
            }
            Stmt::Expr(_) | Stmt::Break | Stmt::Continue | Stmt::Return(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::globals::{GlobalTable, Kind, ViewDecl};
    use crate::il::parser::Parser;
    use crate::userfn::UserFnTable;

    fn compile_source(src: &str, globals: &GlobalTable, userfns: &UserFnTable) -> LlProgram {
        let ast = Parser::new(src).parse().unwrap();
        let mut ll = LlProgram::new();
        Compiler::new(globals, userfns).compile(&ast, &mut ll).unwrap();
        ll
    }

    #[test]
    fn compiles_and_fixes_simple_function() {
        let globals = GlobalTable::build(&[]).unwrap();
        let userfns = UserFnTable::new();
        let mut ll = compile_source("def main() { return 1 + 2; }", &globals, &userfns);
        ll.fix_all().unwrap();
        let bytes = ll.to_binary().unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn toggle_loop_with_global_compiles() {
        let decls = vec![ViewDecl::scalar("toggling", Kind::Int8Unsigned)];
        let globals = GlobalTable::build(&decls).unwrap();
        let userfns = UserFnTable::new();
        let src = "def main() { for i in range(0, 10) { gv.toggling = 1 - gv.toggling; } }";
        let mut ll = compile_source(src, &globals, &userfns);
        ll.fix_all().unwrap();
        assert!(!ll.to_binary().unwrap().is_empty());
    }

    #[test]
    fn undefined_function_call_is_an_error() {
        let globals = GlobalTable::build(&[]).unwrap();
        let userfns = UserFnTable::new();
        let ast = Parser::new("def main() { return missing(); }").parse().unwrap();
        let mut ll = LlProgram::new();
        let err = Compiler::new(&globals, &userfns).compile(&ast, &mut ll).unwrap_err();
        assert_eq!(err, CompilerError::UndefinedFunction("missing".to_string()));
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let globals = GlobalTable::build(&[]).unwrap();
        let userfns = UserFnTable::new();
        let ast = Parser::new("def main() { break; }").parse().unwrap();
        let mut ll = LlProgram::new();
        let err = Compiler::new(&globals, &userfns).compile(&ast, &mut ll).unwrap_err();
        assert_eq!(err, CompilerError::BreakOutsideLoop);
    }

    #[test]
    fn user_function_callout_compiles() {
        let globals = GlobalTable::build(&[]).unwrap();
        let mut userfns = UserFnTable::new();
        userfns.register("led_set", 3).unwrap();
        let src = "userfn led_set = 3;\ndef main() { uf.led_set(1, 0); return; }";
        let mut ll = compile_source(src, &globals, &userfns);
        ll.fix_all().unwrap();
        assert!(!ll.to_binary().unwrap().is_empty());
    }

    #[test]
    fn undeclared_user_function_is_an_error() {
        let globals = GlobalTable::build(&[]).unwrap();
        let userfns = UserFnTable::new();
        let ast = Parser::new("def main() { uf.missing(); return; }").parse().unwrap();
        let mut ll = LlProgram::new();
        let err = Compiler::new(&globals, &userfns).compile(&ast, &mut ll).unwrap_err();
        assert_eq!(err, CompilerError::UndefinedUserFunction("missing".to_string()));
    }

    #[test]
    fn global_array_access_compiles() {
        let decls = vec![ViewDecl::array("buf", Kind::Int8Unsigned, 8)];
        let globals = GlobalTable::build(&decls).unwrap();
        let userfns = UserFnTable::new();
        let src = "def main() {\n  i = 0;\n  gv.buf[i] = gv.buf[i] + 1;\n  return gv.buf[i];\n}\n";
        let mut ll = compile_source(src, &globals, &userfns);
        ll.fix_all().unwrap();
        assert!(!ll.to_binary().unwrap().is_empty());
    }

    #[test]
    fn indexing_a_scalar_global_is_an_error() {
        let decls = vec![ViewDecl::scalar("flag", Kind::Int8Unsigned)];
        let globals = GlobalTable::build(&decls).unwrap();
        let userfns = UserFnTable::new();
        let ast = Parser::new("def main() { return gv.flag[0]; }").parse().unwrap();
        let mut ll = LlProgram::new();
        let err = Compiler::new(&globals, &userfns).compile(&ast, &mut ll).unwrap_err();
        assert_eq!(err, CompilerError::GlobalIsScalar("flag".to_string()));
    }
}
