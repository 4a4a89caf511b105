//! # idxadv-core: Planner Collaborators for the Index Advisor
//!
//! This crate carries the engine surfaces the index advisor consumes: the
//! catalog metadata tree, statistics, the cost model, logical and physical
//! plan trees, the SQL front end, the cost-based planner and the session
//! facade with the advisor's plan hook.
//!
//! ## Module Overview
//!
//! - **`ident`**: case-insensitive, case-preserving identifiers.
//! - **`schema`**: `InfoSchema` / database / table / column / index metadata.
//! - **`expr`**: scalar values, column references, named scalar functions.
//! - **`stats`**: statistics, selectivity heuristics, JSON fixture loading.
//! - **`cost`**: the `Cost` type, `CostModel` trait and default model.
//! - **`catalog`**: the `Catalog` trait and in-memory implementation.
//! - **`plan`**: logical and physical plan trees.
//! - **`builder`**: sqlparser lowering into logical plans.
//! - **`planner`**: access-path enumeration and cost-based physical planning.
//! - **`engine`**: per-session statement execution and the plan hook.
//! - **`error`**: parse/bind/plan errors.

pub mod builder;
pub mod catalog;
pub mod cost;
pub mod engine;
pub mod error;
pub mod expr;
pub mod ident;
pub mod plan;
pub mod planner;
pub mod schema;
pub mod stats;
