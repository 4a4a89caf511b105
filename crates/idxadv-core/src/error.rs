//! Errors raised while parsing, binding or planning a statement.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("unsupported statement: {0}")]
    Unsupported(String),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("ambiguous column: {0}")]
    AmbiguousColumn(String),
}
