//! Compile-time errors.
//!
//! Compilation is single-shot: any error rejects the program in full.
//! Runtime failures are carried as values (`Value::Error`) and never
//! surface through this type.

use thiserror::Error;

/// Compile result type
pub type Result<T> = std::result::Result<T, CompileError>;

/// Errors rejecting a program at compile time
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("parse error: {0}")]
    Parse(#[from] tally_dsl::ParseError),

    #[error("unknown name `{name}`")]
    UnknownName { name: String },

    #[error("duplicate name `{name}` in {scope}")]
    DuplicateName { name: String, scope: String },

    #[error("dependency cycle: {}", .formulas.join(" -> "))]
    Cycle { formulas: Vec<String> },
}
