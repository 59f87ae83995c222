//! Parse error types.

use std::fmt;

use crate::lexer::{LexError, LexErrorKind, Position, Token};

/// Parse error with what was expected, what was found, and where.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Description of what the parser was looking for
    pub expected: String,
    /// The offending token, if parsing stopped on one
    pub found: Option<Token>,
    pub position: Position,
}

/// Category of parse failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Tokenization failed before parsing could proceed
    Lex(LexErrorKind),
    /// A specific token was expected but a different one was found
    UnexpectedToken,
    /// The input ended while a construct was incomplete
    UnexpectedEof,
    /// Tokens are present but violate the grammar
    InvalidSyntax,
}

impl ParseError {
    pub fn expected_token(expected: &Token, found: Option<Token>, position: Position) -> Self {
        Self {
            kind: if found.is_none() {
                ParseErrorKind::UnexpectedEof
            } else {
                ParseErrorKind::UnexpectedToken
            },
            expected: format!("{expected:?}"),
            found,
            position,
        }
    }

    pub fn expected(context: &str, found: Option<Token>, position: Position) -> Self {
        Self {
            kind: if found.is_none() {
                ParseErrorKind::UnexpectedEof
            } else {
                ParseErrorKind::UnexpectedToken
            },
            expected: context.to_string(),
            found,
            position,
        }
    }

    pub fn invalid_syntax(message: impl Into<String>, position: Position) -> Self {
        Self {
            kind: ParseErrorKind::InvalidSyntax,
            expected: message.into(),
            found: None,
            position,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        Self {
            kind: ParseErrorKind::Lex(err.kind),
            expected: err.to_string(),
            found: None,
            position: err.position,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.found) {
            (ParseErrorKind::Lex(_), _) | (ParseErrorKind::InvalidSyntax, _) => {
                write!(f, "{} at {}", self.expected, self.position)
            }
            (_, Some(found)) => write!(
                f,
                "expected {}, found {:?} at {}",
                self.expected, found, self.position
            ),
            (_, None) => write!(
                f,
                "expected {}, found end of input at {}",
                self.expected, self.position
            ),
        }
    }
}

impl std::error::Error for ParseError {}
