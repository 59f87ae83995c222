//! Hand-written recursive descent parser for tally source text.
//!
//! ## Architecture
//!
//! - `stream`: TokenStream wrapper with one-token lookahead
//! - `error`: ParseError types
//! - `expr`: expression parser using precedence climbing
//! - `decl`: declaration parsers (keyword-dispatched)

mod error;
mod stream;

mod decl;
mod expr;

pub use error::{ParseError, ParseErrorKind};
pub use stream::TokenStream;

use crate::ast;
use crate::lexer;

/// Parse a complete program from source text.
pub fn parse_program(source: &str) -> Result<ast::Program, ParseError> {
    let tokens = lexer::lex(source)?;
    let mut stream = TokenStream::new(source, tokens);
    decl::parse_program(&mut stream)
}

/// Parse a single expression from source text.
///
/// The whole input must be consumed.
pub fn parse_expression(source: &str) -> Result<ast::Expr, ParseError> {
    let tokens = lexer::lex(source)?;
    let mut stream = TokenStream::new(source, tokens);
    let expr = expr::parse_expr(&mut stream)?;
    if !stream.at_end() {
        return Err(ParseError::expected(
            "end of input",
            stream.peek().cloned(),
            stream.position(),
        ));
    }
    Ok(expr)
}
