//! Token stream wrapper for the hand-written parser.

use std::ops::Range;

use crate::lexer::{Position, Token};
use crate::parser::ParseError;

/// Token stream with one-token lookahead and position tracking.
pub struct TokenStream<'src> {
    source: &'src str,
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
}

impl<'src> TokenStream<'src> {
    pub fn new(source: &'src str, tokens: Vec<(Token, Range<usize>)>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
        }
    }

    /// Peek at the current token without consuming it.
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(tok, _)| tok)
    }

    /// Peek at the nth token ahead without consuming.
    pub fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(tok, _)| tok)
    }

    /// Advance to the next token and return the consumed one.
    pub fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(tok, _)| tok.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Check if the current token matches the expected variant.
    pub fn check(&self, expected: &Token) -> bool {
        matches!(self.peek(), Some(t) if std::mem::discriminant(t) == std::mem::discriminant(expected))
    }

    /// Consume the current token if it matches, else report what was expected.
    pub fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if self.check(&expected) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::expected_token(
                &expected,
                self.peek().cloned(),
                self.position(),
            ))
        }
    }

    /// Consume an identifier token and return its text.
    pub fn expect_ident(&mut self, context: &str) -> Result<(String, Range<usize>), ParseError> {
        let span = self.span();
        match self.peek() {
            Some(Token::Ident(_)) => match self.advance() {
                Some(Token::Ident(name)) => Ok((name, span)),
                _ => unreachable!("peek/advance disagree"),
            },
            found => Err(ParseError::expected(
                context,
                found.cloned(),
                self.position(),
            )),
        }
    }

    /// Check if we've reached the end of the token stream.
    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Byte span of the current token (empty at EOF).
    pub fn span(&self) -> Range<usize> {
        match self.tokens.get(self.pos) {
            Some((_, span)) => span.clone(),
            None => self.source.len()..self.source.len(),
        }
    }

    /// Line/column of the current token.
    pub fn position(&self) -> Position {
        Position::of(self.source, self.span().start)
    }
}
