//! S-expression values and an incremental reader for SMT solver replies.
//!
//! SMT solvers answer over a line-oriented text pipe. Replies are
//! S-expressions that may span several lines (models, quoted atoms), be
//! interleaved with `;` comments, or be malformed when the solver is confused.
//! This crate provides the [`SExpr`] value type, a canonical printer, and
//! [`SExprReader`], a restartable reader that is fed lines and yields one
//! top-level S-expression at a time.

mod reader;
mod sexpr;

pub use reader::{parse_sexprs, ErrorHandler, ReadOutcome, SExprReader};
pub use sexpr::SExpr;

use thiserror::Error;

/// Errors produced when parsing complete S-expression text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SexpError {
    /// The input was not a well-formed S-expression.
    #[error("malformed S-expression: {0}")]
    Parse(String),
}
