//! Advisor error taxonomy.
//!
//! Advisor errors never surface to query results: the planner hook logs them
//! and returns the live-schema plan unchanged. They are observable in logs
//! and as missing records in the output streams.

use idxadv_core::error::PlanError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("session variable rejected: {0}")]
    SessionVar(String),

    #[error("planning failed: {0}")]
    PlanFailure(#[from] PlanError),

    #[error("table {0} missing from shadow schema")]
    SchemaMismatch(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("advisor session pool is empty")]
    PoolExhausted,

    #[error("advisor session already registered for key {0}")]
    AlreadyRegistered(String),
}
