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
use super::lexer;
use super::lexer::{Lexer, Span, Token};
use super::term::{Expr, Function, LValue, Program, Stmt, UserFnDecl};
use crate::ll::instruction::{BinOp, CmpOp, UnOp};
use std::fmt;

// =========================================================================
// Error
// =========================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum ErrorCode {
    UnexpectedToken,
    UnexpectedEof,
    ExpectedToken(Token),
    ExpectedTokenIn(Vec<Token>),
    InvalidAssignmentTarget,
    DefaultArgumentsMustBeTrailing,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub span: Span<Token>,
    pub code: ErrorCode,
}

impl Error {
    pub fn new(span: Span<Token>, code: ErrorCode) -> Error {
        Error { span, code }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "parse error at {}: {:?}", self.span.start(), self.code)
    }
}

impl std::error::Error for Error {}

impl From<(Token, Span<Token>)> for Error {
    fn from((t, s): (Token, Span<Token>)) -> Error {
        Error::new(s, ErrorCode::ExpectedToken(t))
    }
}

impl From<lexer::Error> for Error {
    fn from(e: lexer::Error) -> Error {
        match e {
            lexer::Error::Expected(t, s) => Error::new(s, ErrorCode::ExpectedToken(t)),
            lexer::Error::ExpectedIn(ts, s) => Error::new(s, ErrorCode::ExpectedTokenIn(ts)),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// =========================================================================
// Parser
// =========================================================================

pub struct Parser {
    lexer: Lexer,
}

impl Parser {
    pub fn new(input: &str) -> Self {
        Self { lexer: super::lexer::create(input) }
    }

    /// Parse a complete source file into a program.
    pub fn parse(&mut self) -> Result<Program> {
        let mut program = Program::default();
        self.skip_whitespace();
        while !self.lexer.is_eof() {
            match self.lexer.peek().kind {
                Token::Def => program.functions.push(self.parse_function()?),
                Token::Userfn => program.userfns.push(self.parse_userfn_decl()?),
                _ => {
                    let tok = self.lexer.peek();
                    return Err(Error::new(tok, ErrorCode::UnexpectedToken));
                }
            }
            self.skip_whitespace();
        }
        Ok(program)
    }

    // =====================================================================
    // Top-level declarations
    // =====================================================================

    fn parse_function(&mut self) -> Result<Function> {
        self.lexer.snap(Token::Def)?;
        self.skip_whitespace();
        let name = self.snap_identifier()?;
        self.skip_whitespace();
        self.lexer.snap(Token::LeftParen)?;
        let params = self.parse_param_list()?;
        self.lexer.snap(Token::RightParen)?;
        self.skip_whitespace();
        self.lexer.snap(Token::LeftBrace)?;
        let body = self.parse_stmts_until(Token::RightBrace)?;
        self.lexer.snap(Token::RightBrace)?;

        let first_default = params.iter().position(|(_, d)| d.is_some());
        if let Some(idx) = first_default {
            if params[idx..].iter().any(|(_, d)| d.is_none()) {
                let tok = self.lexer.peek();
                return Err(Error::new(tok, ErrorCode::DefaultArgumentsMustBeTrailing));
            }
        }
        let defaults = params
            .iter()
            .filter_map(|(_, d)| *d)
            .collect();
        let params = params.into_iter().map(|(n, _)| n).collect();
        Ok(Function { name, params, defaults, body })
    }

    fn parse_param_list(&mut self) -> Result<Vec<(String, Option<i32>)>> {
        let mut params = Vec::new();
        self.skip_whitespace();
        while self.lexer.peek().kind != Token::RightParen {
            if !params.is_empty() {
                self.lexer.snap(Token::Comma)?;
                self.skip_whitespace();
            }
            let name = self.snap_identifier()?;
            self.skip_whitespace();
            let default = if self.lexer.peek().kind == Token::Equals {
                self.lexer.next();
                self.skip_whitespace();
                Some(self.parse_signed_int_literal()?)
            } else {
                None
            };
            params.push((name, default));
            self.skip_whitespace();
        }
        Ok(params)
    }

    fn parse_userfn_decl(&mut self) -> Result<UserFnDecl> {
        self.lexer.snap(Token::Userfn)?;
        self.skip_whitespace();
        let name = self.snap_identifier()?;
        self.skip_whitespace();
        self.lexer.snap(Token::Equals)?;
        self.skip_whitespace();
        let id = self.parse_signed_int_literal()?;
        self.lexer.snap(Token::Semicolon)?;
        Ok(UserFnDecl { name, id: id as u8 })
    }

    // =====================================================================
    // Statements
    // =====================================================================

    fn parse_stmts_until(&mut self, terminator: Token) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        self.skip_whitespace();
        while self.lexer.peek().kind != terminator {
            stmts.push(self.parse_stmt()?);
            self.skip_whitespace();
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        self.skip_whitespace();
        match self.lexer.peek().kind {
            Token::If => self.parse_if(),
            Token::While => self.parse_while(),
            Token::For => self.parse_for(),
            Token::Break => {
                self.lexer.next();
                self.lexer.snap(Token::Semicolon)?;
                Ok(Stmt::Break)
            }
            Token::Continue => {
                self.lexer.next();
                self.lexer.snap(Token::Semicolon)?;
                Ok(Stmt::Continue)
            }
            Token::Return => self.parse_return(),
            _ => self.parse_expr_or_assign_stmt(),
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.skip_whitespace();
        self.lexer.snap(Token::LeftBrace)?;
        let body = self.parse_stmts_until(Token::RightBrace)?;
        self.lexer.snap(Token::RightBrace)?;
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        self.lexer.snap(Token::If)?;
        let mut branches = Vec::new();
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        branches.push((cond, body));
        loop {
            self.skip_whitespace();
            if self.lexer.peek().kind == Token::Elif {
                self.lexer.next();
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                branches.push((cond, body));
            } else {
                break;
            }
        }
        self.skip_whitespace();
        let orelse = if self.lexer.peek().kind == Token::Else {
            self.lexer.next();
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::If(branches, orelse))
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        self.lexer.snap(Token::While)?;
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        self.skip_whitespace();
        let orelse = if self.lexer.peek().kind == Token::Else {
            self.lexer.next();
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::While(cond, body, orelse))
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        self.lexer.snap(Token::For)?;
        self.skip_whitespace();
        let var = self.snap_identifier()?;
        self.skip_whitespace();
        self.lexer.snap(Token::In)?;
        self.skip_whitespace();
        self.lexer.snap(Token::Range)?;
        self.lexer.snap(Token::LeftParen)?;
        let first = self.parse_expr()?;
        self.skip_whitespace();
        let (start, stop, step) = if self.lexer.peek().kind == Token::Comma {
            self.lexer.next();
            let second = self.parse_expr()?;
            self.skip_whitespace();
            let step = if self.lexer.peek().kind == Token::Comma {
                self.lexer.next();
                self.skip_whitespace();
                self.parse_signed_int_literal()?
            } else {
                1
            };
            (first, second, step)
        } else {
            (Expr::Int(0), first, 1)
        };
        self.skip_whitespace();
        self.lexer.snap(Token::RightParen)?;
        let body = self.parse_block()?;
        self.skip_whitespace();
        let orelse = if self.lexer.peek().kind == Token::Else {
            self.lexer.next();
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::ForRange { var, start, stop, step, body, orelse })
    }

    fn parse_return(&mut self) -> Result<Stmt> {
        self.lexer.snap(Token::Return)?;
        self.skip_whitespace();
        if self.lexer.peek().kind == Token::Semicolon {
            self.lexer.next();
            Ok(Stmt::Return(None))
        } else {
            let e = self.parse_expr()?;
            self.lexer.snap(Token::Semicolon)?;
            Ok(Stmt::Return(Some(e)))
        }
    }

    fn parse_expr_or_assign_stmt(&mut self) -> Result<Stmt> {
        let mut exprs = vec![self.parse_expr()?];
        self.skip_whitespace();
        while self.lexer.peek().kind == Token::Equals {
            self.lexer.next();
            exprs.push(self.parse_expr()?);
            self.skip_whitespace();
        }
        self.lexer.snap(Token::Semicolon)?;
        if exprs.len() == 1 {
            Ok(Stmt::Expr(exprs.pop().unwrap()))
        } else {
            let value = exprs.pop().unwrap();
            let mut targets = Vec::with_capacity(exprs.len());
            for e in exprs {
                targets.push(self.expr_to_lvalue(e)?);
            }
            Ok(Stmt::Assign(targets, value))
        }
    }

    fn expr_to_lvalue(&self, e: Expr) -> Result<LValue> {
        match e {
            Expr::Name(n) => Ok(LValue::Name(n)),
            Expr::GlobalScalar(n) => Ok(LValue::GlobalScalar(n)),
            Expr::GlobalIndex(n, idx) => Ok(LValue::GlobalIndex(n, idx)),
            _ => Err(Error::new(self.lexer.peek(), ErrorCode::InvalidAssignmentTarget)),
        }
    }

    // =====================================================================
    // Expressions
    //
    // Precedence, loosest to tightest: `||`, `&&`, comparisons (chained),
    // `|`, `^`, `&`, `<<`/`>>`, `+`/`-`, `*`//`%`, unary, primary/postfix.
    // =====================================================================

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_expr_or()
    }

    fn parse_expr_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_expr_and()?;
        self.skip_whitespace();
        while self.lexer.peek().kind == Token::PipePipe {
            self.lexer.next();
            let rhs = self.parse_expr_and()?;
            lhs = Expr::Binary(BinOp::LOr, Box::new(lhs), Box::new(rhs));
            self.skip_whitespace();
        }
        Ok(lhs)
    }

    fn parse_expr_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_expr_compare()?;
        self.skip_whitespace();
        while self.lexer.peek().kind == Token::AmpersandAmpersand {
            self.lexer.next();
            let rhs = self.parse_expr_compare()?;
            lhs = Expr::Binary(BinOp::LAnd, Box::new(lhs), Box::new(rhs));
            self.skip_whitespace();
        }
        Ok(lhs)
    }

    const COMPARATORS: &'static [Token] = &[
        Token::Less,
        Token::LessEquals,
        Token::Greater,
        Token::GreaterEquals,
        Token::EqualsEquals,
        Token::BangEquals,
    ];

    fn parse_expr_compare(&mut self) -> Result<Expr> {
        let lhs = self.parse_expr_bitor()?;
        self.skip_whitespace();
        let mut chain = Vec::new();
        while let Ok(tok) = self.lexer.snap_any(Self::COMPARATORS) {
            let op = Self::cmpop_from_token(tok.kind).unwrap();
            let rhs = self.parse_expr_bitor()?;
            chain.push((op, rhs));
            self.skip_whitespace();
        }
        if chain.is_empty() {
            Ok(lhs)
        } else {
            Ok(Expr::Compare(Box::new(lhs), chain))
        }
    }

    fn parse_expr_bitor(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_expr_bitxor()?;
        self.skip_whitespace();
        while self.lexer.peek().kind == Token::Pipe {
            self.lexer.next();
            let rhs = self.parse_expr_bitxor()?;
            lhs = Expr::Binary(BinOp::BOr, Box::new(lhs), Box::new(rhs));
            self.skip_whitespace();
        }
        Ok(lhs)
    }

    fn parse_expr_bitxor(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_expr_bitand()?;
        self.skip_whitespace();
        while self.lexer.peek().kind == Token::Caret {
            self.lexer.next();
            let rhs = self.parse_expr_bitand()?;
            lhs = Expr::Binary(BinOp::BXor, Box::new(lhs), Box::new(rhs));
            self.skip_whitespace();
        }
        Ok(lhs)
    }

    fn parse_expr_bitand(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_expr_shift()?;
        self.skip_whitespace();
        while self.lexer.peek().kind == Token::Ampersand {
            self.lexer.next();
            let rhs = self.parse_expr_shift()?;
            lhs = Expr::Binary(BinOp::BAnd, Box::new(lhs), Box::new(rhs));
            self.skip_whitespace();
        }
        Ok(lhs)
    }

    const SHIFTS: &'static [Token] = &[Token::ShiftLeft, Token::ShiftRight];

    fn parse_expr_shift(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_expr_additive()?;
        self.skip_whitespace();
        while let Ok(tok) = self.lexer.snap_any(Self::SHIFTS) {
            let op = if tok.kind == Token::ShiftLeft { BinOp::Shl } else { BinOp::Shr };
            let rhs = self.parse_expr_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
            self.skip_whitespace();
        }
        Ok(lhs)
    }

    const ADDITIVE: &'static [Token] = &[Token::Plus, Token::Minus];

    fn parse_expr_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_expr_multiplicative()?;
        self.skip_whitespace();
        while let Ok(tok) = self.lexer.snap_any(Self::ADDITIVE) {
            let op = if tok.kind == Token::Plus { BinOp::Add } else { BinOp::Sub };
            let rhs = self.parse_expr_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
            self.skip_whitespace();
        }
        Ok(lhs)
    }

    const MULTIPLICATIVE: &'static [Token] = &[Token::Star, Token::Slash, Token::Percent];

    fn parse_expr_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_expr_unary()?;
        self.skip_whitespace();
        while let Ok(tok) = self.lexer.snap_any(Self::MULTIPLICATIVE) {
            let op = match tok.kind {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => BinOp::Mod,
            };
            let rhs = self.parse_expr_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
            self.skip_whitespace();
        }
        Ok(lhs)
    }

    fn parse_expr_unary(&mut self) -> Result<Expr> {
        self.skip_whitespace();
        match self.lexer.peek().kind {
            Token::Plus => {
                // Unary `+` is a no-op: parse and discard it, keeping
                // the inner expression with no wrapping node.
                self.lexer.next();
                self.parse_expr_unary()
            }
            Token::Minus => {
                self.lexer.next();
                let e = self.parse_expr_unary()?;
                Ok(Expr::Unary(UnOp::Neg, Box::new(e)))
            }
            Token::Bang => {
                self.lexer.next();
                let e = self.parse_expr_unary()?;
                Ok(Expr::Unary(UnOp::LNot, Box::new(e)))
            }
            Token::Tilde => {
                self.lexer.next();
                let e = self.parse_expr_unary()?;
                Ok(Expr::Unary(UnOp::BNot, Box::new(e)))
            }
            _ => self.parse_expr_primary(),
        }
    }

    fn parse_expr_primary(&mut self) -> Result<Expr> {
        self.skip_whitespace();
        let lookahead = self.lexer.peek();
        match lookahead.kind {
            Token::Integer => {
                let tok = self.lexer.next();
                let text = self.lexer.get_str(tok);
                let v: i64 = text.parse().map_err(|_| Error::new(tok, ErrorCode::UnexpectedToken))?;
                Ok(Expr::Int(v as i32))
            }
            Token::LeftParen => {
                self.lexer.next();
                let e = self.parse_expr()?;
                self.skip_whitespace();
                self.lexer.snap(Token::RightParen)?;
                Ok(e)
            }
            Token::Identifier => {
                let tok = self.lexer.next();
                let name = self.lexer.get_str(tok);
                match name.as_str() {
                    "gv" => self.parse_global_access(),
                    "uf" => self.parse_user_call(),
                    _ => {
                        self.skip_whitespace();
                        if self.lexer.peek().kind == Token::LeftParen {
                            let args = self.parse_arg_list()?;
                            Ok(Expr::Call(name, args))
                        } else {
                            Ok(Expr::Name(name))
                        }
                    }
                }
            }
            _ => Err(Error::new(lookahead, ErrorCode::UnexpectedToken)),
        }
    }

    fn parse_global_access(&mut self) -> Result<Expr> {
        self.lexer.snap(Token::Dot)?;
        let name = self.snap_identifier()?;
        if self.lexer.peek().kind == Token::LeftBracket {
            self.lexer.next();
            let idx = self.parse_expr()?;
            self.skip_whitespace();
            self.lexer.snap(Token::RightBracket)?;
            Ok(Expr::GlobalIndex(name, Box::new(idx)))
        } else {
            Ok(Expr::GlobalScalar(name))
        }
    }

    fn parse_user_call(&mut self) -> Result<Expr> {
        self.lexer.snap(Token::Dot)?;
        let name = self.snap_identifier()?;
        let args = self.parse_arg_list()?;
        Ok(Expr::UserCall(name, args))
    }

    fn parse_arg_list(&mut self) -> Result<Vec<Expr>> {
        self.skip_whitespace();
        self.lexer.snap(Token::LeftParen)?;
        let mut args = Vec::new();
        self.skip_whitespace();
        while self.lexer.peek().kind != Token::RightParen {
            if !args.is_empty() {
                self.lexer.snap(Token::Comma)?;
                self.skip_whitespace();
            }
            args.push(self.parse_expr()?);
            self.skip_whitespace();
        }
        self.lexer.snap(Token::RightParen)?;
        Ok(args)
    }

    // =====================================================================
    // Helpers
    // =====================================================================

    fn snap_identifier(&mut self) -> Result<String> {
        let tok = self.lexer.snap(Token::Identifier)?;
        Ok(self.lexer.get_str(tok))
    }

    /// Parse an integer literal, with an optional leading `-`, used for
    /// default-argument values, user-function ids, and `range` steps,
    /// none of which are general expressions.
    fn parse_signed_int_literal(&mut self) -> Result<i32> {
        self.skip_whitespace();
        let negative = if self.lexer.peek().kind == Token::Minus {
            self.lexer.next();
            true
        } else {
            false
        };
        let tok = self.lexer.snap(Token::Integer)?;
        let text = self.lexer.get_str(tok);
        let v: i64 = text.parse().map_err(|_| Error::new(tok, ErrorCode::UnexpectedToken))?;
        Ok(if negative { -(v as i32) } else { v as i32 })
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.lexer.peek().kind {
                Token::Gap | Token::NewLine => {
                    self.lexer.next();
                }
                _ => break,
            }
        }
    }

    fn cmpop_from_token(token: Token) -> Option<CmpOp> {
        Some(match token {
            Token::Less => CmpOp::Lt,
            Token::LessEquals => CmpOp::Leq,
            Token::Greater => CmpOp::Gt,
            Token::GreaterEquals => CmpOp::Geq,
            Token::EqualsEquals => CmpOp::Eq,
            Token::BangEquals => CmpOp::Neq,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_function() {
        let mut p = Parser::new("def main() {\n  x = 3;\n  return x;\n}\n");
        let program = p.parse().unwrap();
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.functions[0].name, "main");
        assert_eq!(program.functions[0].body.len(), 2);
    }

    #[test]
    fn parse_userfn_decl() {
        let mut p = Parser::new("userfn beep = 1;\ndef main() { uf.beep(1); return; }\n");
        let program = p.parse().unwrap();
        assert_eq!(program.userfns.len(), 1);
        assert_eq!(program.userfns[0].name, "beep");
        assert_eq!(program.userfns[0].id, 1);
    }

    #[test]
    fn parse_for_range_with_step() {
        let mut p = Parser::new("def main() {\n  for i in range(0, 16, 1) {\n    gv.a = gv.a + 1;\n  }\n}\n");
        let program = p.parse().unwrap();
        let body = &program.functions[0].body;
        assert_eq!(body.len(), 1);
        assert!(matches!(body[0], Stmt::ForRange { step: 1, .. }));
    }

    #[test]
    fn parse_chained_comparison() {
        let mut p = Parser::new("def main() { return a < b < c; }\n");
        let program = p.parse().unwrap();
        match &program.functions[0].body[0] {
            Stmt::Return(Some(Expr::Compare(_, chain))) => assert_eq!(chain.len(), 2),
            _ => panic!("expected a chained comparison"),
        }
    }

    #[test]
    fn unary_plus_is_a_no_op() {
        let mut p = Parser::new("def main(y) { x = +y; return x; }\n");
        let program = p.parse().unwrap();
        match &program.functions[0].body[0] {
            Stmt::Assign(_, value) => assert!(matches!(value, Expr::Name(n) if n == "y")),
            _ => panic!("expected an assignment"),
        }
    }
}
