//! # idxadv-advisor: Virtual-Index Advisor
//!
//! Recommends secondary indexes for a SELECT workload by using the query
//! optimizer as the cost oracle. For every statement it fabricates virtual
//! indexes -- present in a shadow catalog view, backed by no storage --
//! re-plans the statement against them, and credits the cost reduction to
//! whichever virtual indexes the optimizer chose. Benefits accumulate
//! across the workload; the ranked result is the recommendation.
//!
//! ## Module Overview
//!
//! - **`extract`**: walks a physical plan into a `QueryExprInfo`.
//! - **`candidate`**: classifies columns into per-table role sets and
//!   enumerates candidate index column-lists.
//! - **`shadow`**: layers virtual indexes over a deep-copied `InfoSchema`.
//! - **`session`**: the per-connection accumulator, registry and pool.
//! - **`hook`**: the planning driver installed as the engine's plan hook.
//! - **`report`**: the per-query output streams and the ranked result file.
//! - **`workload`**: background ingestion of `<n>.sql` files over a bounded
//!   queue.
//! - **`error`**: the advisor error taxonomy.

pub mod candidate;
pub mod error;
pub mod extract;
pub mod hook;
pub mod report;
pub mod session;
pub mod shadow;
pub mod workload;
