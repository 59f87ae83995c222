//! tally DSL front-end
//!
//! Lexes and parses tally source text into an immutable AST, and provides
//! the shared tree walker the compiler's analysis passes are built on.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod unparse;
pub mod walk;

pub use lexer::{LexError, LexErrorKind, Position, Token, lex};
pub use parser::{ParseError, ParseErrorKind, parse_expression, parse_program};
pub use unparse::unparse;
pub use walk::{ExprVisitor, walk_expr};
