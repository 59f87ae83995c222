//! Lexer for tally source text.
//!
//! Uses Logos for fast, compile-time optimized tokenization.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use logos::Logos;
use rust_decimal::Decimal;

/// Token type for the tally formula language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // === Declaration keywords ===
    #[token("module")]
    Module,
    #[token("export")]
    Export,
    #[token("argument")]
    Argument,
    #[token("const")]
    Const,
    #[token("import")]
    Import,
    #[token("from")]
    From,
    #[token("as")]
    As,

    // === Expression keywords ===
    #[token("await")]
    Await,
    #[token("if")]
    If,
    #[token("where")]
    Where,
    #[token("list")]
    List,
    #[token("object")]
    Object,

    // === Logical operators ===
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,

    // === Literals ===
    #[token("true")]
    True,
    #[token("false")]
    False,

    /// Decimal literal with optional fractional part
    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| Decimal::from_str(lex.slice()).ok())]
    Number(Decimal),

    /// Double-quoted string with backslash escapes, no embedded newlines
    #[regex(r#""([^"\\\n]|\\[^\n])*""#, |lex| unescape(lex.slice()))]
    Str(String),

    /// Identifier, either bare or quoted (`'...'` admits any character)
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    #[regex(r"'[^'\n]*'", |lex| { let s = lex.slice(); s[1..s.len() - 1].to_owned() })]
    Ident(String),

    // === Punctuation ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token(";")]
    Semi,

    // === Operators ===
    #[token("=")]
    Eq,
    #[token("<>")]
    Ne,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("&")]
    Amp,
}

/// A line/column pair in source text, both 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    /// Compute the position of a byte offset in `source`
    pub fn of(source: &str, offset: usize) -> Self {
        let prefix = &source[..offset.min(source.len())];
        let line = prefix.matches('\n').count() as u32 + 1;
        let column = match prefix.rfind('\n') {
            Some(nl) => (offset - nl) as u32,
            None => offset as u32 + 1,
        };
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Error during lexing
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub position: Position,
    pub slice: String,
}

/// Category of lex failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnterminatedString,
    InvalidEscape,
    UnexpectedCharacter,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LexErrorKind::UnterminatedString => {
                write!(f, "unterminated string at {}", self.position)
            }
            LexErrorKind::InvalidEscape => {
                write!(f, "invalid escape in string at {}", self.position)
            }
            LexErrorKind::UnexpectedCharacter => {
                write!(f, "unexpected character '{}' at {}", self.slice, self.position)
            }
        }
    }
}

impl std::error::Error for LexError {}

/// Tokenize source text into tokens paired with their byte spans
pub fn lex(source: &str) -> Result<Vec<(Token, Range<usize>)>, LexError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                let slice = lexer.slice();
                // A failed match starting with a quote is a string that either
                // never closed or carried an escape unescape() rejected.
                let kind = if slice.starts_with('"') {
                    if slice.len() >= 2 && slice.ends_with('"') {
                        LexErrorKind::InvalidEscape
                    } else {
                        LexErrorKind::UnterminatedString
                    }
                } else {
                    LexErrorKind::UnexpectedCharacter
                };
                return Err(LexError {
                    kind,
                    position: Position::of(source, lexer.span().start),
                    slice: slice.to_string(),
                });
            }
        }
    }

    Ok(tokens)
}

/// Resolve escapes in a quoted string slice (quotes included).
///
/// Supported escapes: `\\ \" \n \r \t \u{HHHH}`.
fn unescape(slice: &str) -> Option<String> {
    let body = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'u' => {
                if chars.next()? != '{' {
                    return None;
                }
                let mut hex = String::new();
                loop {
                    match chars.next()? {
                        '}' => break,
                        c if c.is_ascii_hexdigit() && hex.len() < 6 => hex.push(c),
                        _ => return None,
                    }
                }
                let code = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(code)?);
            }
            _ => return None,
        }
    }

    Some(out)
}
