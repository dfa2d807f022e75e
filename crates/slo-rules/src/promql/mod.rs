//! A small PromQL front end for rule templates.
//!
//! Rule expressions are never built by string concatenation. Each formula is
//! a fixed template such as
//!
//! ```text
//! sum by (grouping) (rate(errorMetric{matchers="errors"}[1s]))
//! ```
//!
//! which is parsed once, cloned, and rewritten by a [`Replacer`]: the selector
//! names, the placeholder matchers, ranges and grouping are substituted
//! before the tree is printed back.

mod ast;
mod lexer;
mod parser;
mod replace;
mod template;

use thiserror::Error;

pub use ast::{AggregateExpr, BinaryExpr, BinaryOp, Call, Expr, MatrixSelector, VectorSelector};
pub use parser::{parse_expr, parse_selector};
pub use replace::Replacer;
pub use template::Template;

/// A parse failure with the byte offset it was detected at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at position {position}")]
pub struct ParseError {
    /// Byte offset into the input.
    pub position: usize,
    /// What went wrong.
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}
