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
use crate::lex;
use crate::lex::{Scanner, Span, TableTokenizer};
use std::fmt;

// =================================================================
// Token
// =================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Token {
    // Keywords
    Def,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Range,
    Break,
    Continue,
    Return,
    Userfn,
    // Literals / names
    Identifier,
    Integer,
    // Punctuation
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Semicolon,
    Dot,
    Equals,
    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    ShiftLeft,
    ShiftRight,
    Ampersand,
    Pipe,
    Caret,
    AmpersandAmpersand,
    PipePipe,
    Bang,
    Tilde,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
    EqualsEquals,
    BangEquals,
    // Trivia
    Gap,
    NewLine,
    EOF,
    Error,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Lexer = lex::Lexer<TableTokenizer<char, Token>>;

/// Construct a lexer over a source string.
pub fn create(input: &str) -> Lexer {
    let tokenizer = TableTokenizer::new(RULES.to_vec());
    let chars = input.chars().collect();
    lex::Lexer::new(chars, tokenizer)
}

// =================================================================
// Parser-facing lexer errors
// =================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Expected(Token, Span<Token>),
    ExpectedIn(Vec<Token>, Span<Token>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Expected(t, s) => write!(f, "expected {:?}, found {:?}", t, s.kind),
            Error::ExpectedIn(ts, s) => write!(f, "expected one of {:?}, found {:?}", ts, s.kind),
        }
    }
}

impl std::error::Error for Error {}

impl Lexer {
    /// True when the next token is `EOF`.
    pub fn is_eof(&self) -> bool {
        self.peek().kind == Token::EOF
    }

    /// Render the text underlying a previously-snapped span.
    pub fn get_str(&self, span: Span<Token>) -> String {
        self.get(span).iter().collect()
    }

    /// Match one of several token kinds, whichever comes next.
    pub fn snap_any(&mut self, kinds: &[Token]) -> Result<Span<Token>, Error> {
        let lookahead = self.peek();
        if kinds.contains(&lookahead.kind) {
            self.next();
            Ok(lookahead)
        } else {
            Err(Error::ExpectedIn(kinds.to_vec(), lookahead))
        }
    }
}

// =================================================================
// Rules
// =================================================================

type ScanResult = std::result::Result<Span<Token>, ()>;

const KEYWORDS: &[(&str, Token)] = &[
    ("def", Token::Def),
    ("if", Token::If),
    ("elif", Token::Elif),
    ("else", Token::Else),
    ("while", Token::While),
    ("for", Token::For),
    ("in", Token::In),
    ("range", Token::Range),
    ("break", Token::Break),
    ("continue", Token::Continue),
    ("return", Token::Return),
    ("userfn", Token::Userfn),
];

fn scan_integer(input: &[char]) -> ScanResult {
    scan_whilst(input, Token::Integer, |c| c.is_ascii_digit())
}

fn scan_identifier_or_keyword(input: &[char]) -> ScanResult {
    if input.is_empty() || !(input[0].is_ascii_alphabetic() || input[0] == '_') {
        return Err(());
    }
    let r = scan_whilst(input, Token::Identifier, |c| c.is_ascii_alphanumeric() || c == '_')?;
    let text: String = input[r.range()].iter().collect();
    for (kw, tok) in KEYWORDS {
        if *kw == text {
            return Ok(Span::new(*tok, r.range()));
        }
    }
    Ok(r)
}

fn scan_gap(input: &[char]) -> ScanResult {
    scan_whilst(input, Token::Gap, |c| c == ' ' || c == '\t' || c == '\r')
}

fn scan_newline(input: &[char]) -> ScanResult {
    scan_one(input, Token::NewLine, '\n')
}

fn scan_comment(input: &[char]) -> ScanResult {
    if input.first() != Some(&'#') {
        return Err(());
    }
    let mut i = 0;
    while i < input.len() && input[i] != '\n' {
        i += 1;
    }
    Ok(Span::new(Token::Gap, 0..i))
}

fn scan_two(input: &[char], t: Token, s: &str) -> ScanResult {
    let cs: Vec<char> = s.chars().collect();
    if input.len() >= cs.len() && input[..cs.len()] == cs[..] {
        Ok(Span::new(t, 0..cs.len()))
    } else {
        Err(())
    }
}

fn scan_operator(input: &[char]) -> ScanResult {
    // Longest-match-first multi-char operators, then single-char ones.
    let two_char: &[(&str, Token)] = &[
        ("<<", Token::ShiftLeft),
        (">>", Token::ShiftRight),
        ("&&", Token::AmpersandAmpersand),
        ("||", Token::PipePipe),
        ("<=", Token::LessEquals),
        (">=", Token::GreaterEquals),
        ("==", Token::EqualsEquals),
        ("!=", Token::BangEquals),
    ];
    for (s, t) in two_char {
        if let Ok(span) = scan_two(input, *t, s) {
            return Ok(span);
        }
    }
    let one_char: &[(char, Token)] = &[
        ('(', Token::LeftParen),
        (')', Token::RightParen),
        ('{', Token::LeftBrace),
        ('}', Token::RightBrace),
        ('[', Token::LeftBracket),
        (']', Token::RightBracket),
        (',', Token::Comma),
        (';', Token::Semicolon),
        ('.', Token::Dot),
        ('=', Token::Equals),
        ('+', Token::Plus),
        ('-', Token::Minus),
        ('*', Token::Star),
        ('/', Token::Slash),
        ('%', Token::Percent),
        ('&', Token::Ampersand),
        ('|', Token::Pipe),
        ('^', Token::Caret),
        ('!', Token::Bang),
        ('~', Token::Tilde),
        ('<', Token::Less),
        ('>', Token::Greater),
    ];
    for (c, t) in one_char {
        if let Ok(span) = scan_one(input, *t, *c) {
            return Ok(span);
        }
    }
    Err(())
}

fn scan_eof(input: &[char]) -> ScanResult {
    if input.is_empty() {
        Ok(Span::new(Token::EOF, 0..0))
    } else {
        Err(())
    }
}

/// Catches anything no other rule recognised, so the tokenizer always
/// terminates instead of panicking; the parser turns a stray `Error`
/// token into a proper syntax error.
fn scan_unknown(input: &[char]) -> ScanResult {
    if input.is_empty() {
        Err(())
    } else {
        Ok(Span::new(Token::Error, 0..1))
    }
}

fn scan_whilst<P>(input: &[char], t: Token, pred: P) -> ScanResult
where
    P: Fn(char) -> bool,
{
    let mut i = 0;
    while i < input.len() && pred(input[i]) {
        i += 1;
    }
    if i == 0 {
        Err(())
    } else {
        Ok(Span::new(t, 0..i))
    }
}

fn scan_one(input: &[char], t: Token, c: char) -> ScanResult {
    if !input.is_empty() && input[0] == c {
        Ok(Span::new(t, 0..1))
    } else {
        Err(())
    }
}

static RULES: &[Scanner<char, Token>] = &[
    scan_eof,
    scan_comment,
    scan_identifier_or_keyword,
    scan_integer,
    scan_gap,
    scan_newline,
    scan_operator,
    scan_unknown,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lex_keyword_vs_identifier() {
        let mut l = create("if iffy");
        assert_eq!(l.next().kind, Token::If);
        assert_eq!(l.next().kind, Token::Gap);
        assert_eq!(l.next().kind, Token::Identifier);
        assert_eq!(l.next().kind, Token::EOF);
    }

    #[test]
    fn lex_operators_longest_match() {
        let mut l = create("<<=");
        assert_eq!(l.next().kind, Token::ShiftLeft);
        assert_eq!(l.next().kind, Token::Equals);
        assert_eq!(l.next().kind, Token::EOF);
    }

    #[test]
    fn lex_comment_is_skipped_as_gap() {
        let mut l = create("# hello\nbreak");
        assert_eq!(l.next().kind, Token::Gap);
        assert_eq!(l.next().kind, Token::NewLine);
        assert_eq!(l.next().kind, Token::Break);
        assert_eq!(l.next().kind, Token::EOF);
    }
}
