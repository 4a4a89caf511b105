//! # Cost Model
//!
//! Cost is a single comparable value; the planner keeps whichever alternative
//! is *strictly* cheaper, so equal-cost alternatives resolve to the first one
//! enumerated and plans are deterministic.
//!
//! The default model charges three dimensions collapsed into one total:
//! CPU (rows touched), memory (hash tables, sort buffers) and IO (bytes read).
//! Index scans pay a fixed seek on top of their bytes; an index double read
//! pays for the fetched rows at full row width through the table-side child
//! of the lookup operator.
//!
//! The `CostModel` trait keeps the model pluggable; `compute_cost` receives
//! the operator, per-operator input quantities and the children's accumulated
//! costs, and returns the accumulated cost of the subtree.

use crate::plan::PhysOp;
use serde::{Deserialize, Serialize};

/// The estimated expense of a (sub)plan. Lower is better; `f64::MAX` means
/// infeasible.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cost {
    pub total: f64,
}

impl Cost {
    pub fn zero() -> Self {
        Self { total: 0.0 }
    }

    pub fn new(total: f64) -> Self {
        Self { total }
    }
}

/// Epsilon equality to absorb floating-point noise in comparisons.
impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        (self.total - other.total).abs() < f64::EPSILON
    }
}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.total.partial_cmp(&other.total)
    }
}

/// Input quantities for one operator input: a row count and, where the
/// operator is IO-bound, the bytes those rows occupy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostInput {
    pub rows: f64,
    pub bytes: f64,
}

impl CostInput {
    pub fn rows(rows: f64) -> Self {
        Self { rows, bytes: 0.0 }
    }

    pub fn new(rows: f64, bytes: f64) -> Self {
        Self { rows, bytes }
    }
}

/// Trait for pluggable cost models.
pub trait CostModel: Send + Sync {
    /// Accumulated cost of a subtree rooted at `op`.
    ///
    /// Input conventions per operator:
    /// - scans: `inputs[0]` = matched rows and their bytes
    /// - selection / projection / aggregates / sort: `inputs[0]` = input rows
    ///   (`inputs[1].rows` = group count for hash aggregation)
    /// - hash join: `inputs[0]` = build rows, `inputs[1]` = probe rows
    /// - merge join: `inputs[0..2]` = left / right rows
    /// - index nested-loop join and apply: `inputs[0]` = outer rows;
    ///   `children[1]` is the *per-probe* inner cost, multiplied here
    fn compute_cost(&self, op: &PhysOp, inputs: &[CostInput], children: &[Cost]) -> Cost;
}

/// Default single-node cost model.
pub struct DefaultCostModel {
    pub cpu_weight: f64,
    pub mem_weight: f64,
    pub io_weight: f64,
    /// Fixed cost of positioning an index scan.
    pub seek_cost: f64,
    /// Per-entry overhead of a hash table, in bytes.
    pub hash_entry_bytes: f64,
    /// Per-row overhead of a sort buffer, in bytes.
    pub sort_row_bytes: f64,
}

impl Default for DefaultCostModel {
    fn default() -> Self {
        Self {
            cpu_weight: 1.0,
            mem_weight: 1.0,
            io_weight: 1.0,
            seek_cost: 20.0,
            hash_entry_bytes: 16.0,
            sort_row_bytes: 8.0,
        }
    }
}

impl DefaultCostModel {
    fn input(inputs: &[CostInput], i: usize) -> CostInput {
        inputs.get(i).copied().unwrap_or_default()
    }
}

impl CostModel for DefaultCostModel {
    fn compute_cost(&self, op: &PhysOp, inputs: &[CostInput], children: &[Cost]) -> Cost {
        let children_total: f64 = children.iter().map(|c| c.total).sum();
        let first = Self::input(inputs, 0);

        let local = match op {
            // Scans read their matched bytes. Table scans are sequential;
            // index scans pay a positioning seek on top.
            PhysOp::TableScan { .. } => self.io_weight * first.bytes,
            PhysOp::IndexScan { .. } => self.io_weight * first.bytes + self.seek_cost,

            // Readers only ship rows upward.
            PhysOp::TableReader { .. } | PhysOp::IndexReader { .. } => 0.0,

            // The double read's table fetch is costed by the table-side child;
            // the lookup itself pays CPU to match handles.
            PhysOp::IndexLookUp { .. } => self.cpu_weight * first.rows,

            PhysOp::Selection { .. } => self.cpu_weight * first.rows,
            PhysOp::Projection { .. } => self.cpu_weight * first.rows,

            PhysOp::HashAgg { .. } => {
                let groups = Self::input(inputs, 1).rows;
                self.cpu_weight * first.rows + self.mem_weight * groups * self.hash_entry_bytes
            }
            PhysOp::StreamAgg { .. } => self.cpu_weight * first.rows,

            PhysOp::Sort { .. } => {
                let n = first.rows.max(1.0);
                self.cpu_weight * n * n.log2().max(1.0)
                    + self.mem_weight * n * self.sort_row_bytes
            }
            PhysOp::TopN { limit, .. } => {
                let n = first.rows.max(1.0);
                let k = (*limit as f64).max(1.0);
                self.cpu_weight * n * (k + 1.0).log2().max(1.0)
                    + self.mem_weight * k * self.sort_row_bytes
            }
            PhysOp::Limit { .. } => 0.0,

            PhysOp::HashJoin { .. } => {
                let build = first.rows;
                let probe = Self::input(inputs, 1).rows;
                self.cpu_weight * build
                    + self.mem_weight * build * self.hash_entry_bytes
                    + self.cpu_weight * probe
            }
            PhysOp::MergeJoin { .. } => {
                let l = first.rows;
                let r = Self::input(inputs, 1).rows;
                self.cpu_weight * (l + r)
            }
            // Outer cost once, inner per-probe cost multiplied by outer rows.
            PhysOp::IndexJoin { .. } | PhysOp::Apply { .. } => {
                let outer = children.first().map(|c| c.total).unwrap_or(0.0);
                let per_probe = children.get(1).map(|c| c.total).unwrap_or(0.0);
                return Cost::new(outer + first.rows * per_probe + self.cpu_weight * first.rows);
            }

            PhysOp::UnionAll => 0.0,
        };

        Cost::new(children_total + local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PhysOp, ScanSource};

    #[test]
    fn test_index_scan_beats_table_scan_when_narrower() {
        let model = DefaultCostModel::default();
        let table = model.compute_cost(
            &PhysOp::TableScan {
                source: ScanSource::new("test", "t"),
                access: vec![],
                clustered: false,
            },
            &[CostInput::new(32.0, 32.0 * 64.0)],
            &[],
        );
        let index = model.compute_cost(
            &PhysOp::IndexScan {
                source: ScanSource::new("test", "t"),
                index: crate::schema::IndexInfo::new(
                    "v",
                    vec![crate::schema::IndexColumn::new("e")],
                ),
                access: vec![],
                desc: false,
            },
            &[CostInput::new(32.0, 32.0 * 16.0)],
            &[],
        );
        assert!(index.total < table.total);
    }

    #[test]
    fn test_stream_agg_cheaper_than_hash_agg() {
        let model = DefaultCostModel::default();
        let hash = model.compute_cost(
            &PhysOp::HashAgg {
                aggs: vec![],
                group_by: vec![],
            },
            &[CostInput::rows(32.0), CostInput::rows(4.0)],
            &[],
        );
        let stream = model.compute_cost(
            &PhysOp::StreamAgg {
                aggs: vec![],
                group_by: vec![],
            },
            &[CostInput::rows(32.0)],
            &[],
        );
        assert!(stream.total < hash.total);
    }
}
