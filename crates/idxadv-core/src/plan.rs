//! # Plan Trees
//!
//! Logical plans describe *what* a statement computes; physical plans describe
//! *how*, down to the access path of every table. Both are plain trees with a
//! `children()` accessor so that consumers (the advisor's extractor, the
//! chosen-index walk) can recurse without knowing every operator.
//!
//! Physical scans sit beneath reader operators the way a distributed engine
//! structures them: `TableReader` wraps a table-side scan, `IndexReader` wraps
//! an index-side scan, and `IndexLookUp` wraps an index-side scan plus the
//! table-side fetch that resolves row handles (the double read).

use crate::cost::Cost;
use crate::expr::{AggExpr, ByItem, ColumnRef, Expr};
use crate::ident::Ident;
use crate::schema::{ColumnInfo, IndexInfo};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// A base-table access in a logical plan: the table, its binding alias, the
/// pruned column list actually referenced by the statement, and the
/// single-table conditions pushed down to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub db: Ident,
    pub table: Ident,
    pub alias: Option<Ident>,
    pub columns: Vec<ColumnInfo>,
    pub pushed_conditions: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    /// Left rows with at least one match on the right; produces left columns.
    Semi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalPlan {
    Projection {
        exprs: Vec<Expr>,
        child: Box<LogicalPlan>,
    },
    Selection {
        conditions: Vec<Expr>,
        child: Box<LogicalPlan>,
    },
    Aggregation {
        aggs: Vec<AggExpr>,
        group_by: Vec<Expr>,
        child: Box<LogicalPlan>,
    },
    Sort {
        items: Vec<ByItem>,
        child: Box<LogicalPlan>,
    },
    TopN {
        items: Vec<ByItem>,
        limit: u64,
        child: Box<LogicalPlan>,
    },
    Limit {
        limit: u64,
        child: Box<LogicalPlan>,
    },
    Join {
        kind: JoinKind,
        equal: Vec<(ColumnRef, ColumnRef)>,
        other: Vec<Expr>,
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
    },
    /// Correlated subplan: the inner side is re-evaluated per outer row.
    Apply {
        conditions: Vec<Expr>,
        outer: Box<LogicalPlan>,
        inner: Box<LogicalPlan>,
    },
    UnionAll {
        children: Vec<LogicalPlan>,
    },
    Scan(DataSource),
}

impl LogicalPlan {
    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Projection { child, .. }
            | LogicalPlan::Selection { child, .. }
            | LogicalPlan::Aggregation { child, .. }
            | LogicalPlan::Sort { child, .. }
            | LogicalPlan::TopN { child, .. }
            | LogicalPlan::Limit { child, .. } => vec![child],
            LogicalPlan::Join { left, right, .. } => vec![left, right],
            LogicalPlan::Apply { outer, inner, .. } => vec![outer, inner],
            LogicalPlan::UnionAll { children } => children.iter().collect(),
            LogicalPlan::Scan(_) => vec![],
        }
    }
}

/// Identity of the table behind a physical scan or reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSource {
    pub db: Ident,
    pub table: Ident,
    pub alias: Option<Ident>,
    /// Number of columns the scan produces (after pruning).
    pub col_count: usize,
}

impl ScanSource {
    pub fn new(db: &str, table: &str) -> Self {
        Self {
            db: Ident::new(db),
            table: Ident::new(table),
            alias: None,
            col_count: 0,
        }
    }

    pub fn from_data_source(ds: &DataSource) -> Self {
        Self {
            db: ds.db.clone(),
            table: ds.table.clone(),
            alias: ds.alias.clone(),
            col_count: ds.columns.len(),
        }
    }
}

/// Physical operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PhysOp {
    /// Full or range-pruned base table scan. `clustered` marks a scan pruned
    /// through the primary index (point/range access at row width).
    TableScan {
        source: ScanSource,
        access: Vec<Expr>,
        clustered: bool,
    },
    /// Scan over one index, real or virtual. `access` holds the conditions
    /// consumed by the index range; `desc` marks a reverse scan.
    IndexScan {
        source: ScanSource,
        index: IndexInfo,
        access: Vec<Expr>,
        desc: bool,
    },
    TableReader {
        source: ScanSource,
    },
    IndexReader {
        source: ScanSource,
    },
    /// Index-side child first, table-side fetch child second.
    IndexLookUp {
        source: ScanSource,
    },
    Selection {
        conditions: Vec<Expr>,
    },
    Projection {
        exprs: Vec<Expr>,
    },
    HashAgg {
        aggs: Vec<AggExpr>,
        group_by: Vec<Expr>,
    },
    StreamAgg {
        aggs: Vec<AggExpr>,
        group_by: Vec<Expr>,
    },
    Sort {
        items: Vec<ByItem>,
    },
    TopN {
        items: Vec<ByItem>,
        limit: u64,
    },
    Limit {
        limit: u64,
    },
    HashJoin {
        kind: JoinKind,
        equal: Vec<(ColumnRef, ColumnRef)>,
        other: Vec<Expr>,
    },
    MergeJoin {
        kind: JoinKind,
        equal: Vec<(ColumnRef, ColumnRef)>,
        other: Vec<Expr>,
    },
    /// Nested-loop join probing an index on the inner side. Outer child
    /// first; the second child is one probe's worth of inner access.
    IndexJoin {
        kind: JoinKind,
        equal: Vec<(ColumnRef, ColumnRef)>,
        other: Vec<Expr>,
    },
    Apply {
        conditions: Vec<Expr>,
    },
    UnionAll,
}

impl PhysOp {
    pub fn name(&self) -> &'static str {
        match self {
            PhysOp::TableScan { .. } => "TableScan",
            PhysOp::IndexScan { .. } => "IndexScan",
            PhysOp::TableReader { .. } => "TableReader",
            PhysOp::IndexReader { .. } => "IndexReader",
            PhysOp::IndexLookUp { .. } => "IndexLookUp",
            PhysOp::Selection { .. } => "Selection",
            PhysOp::Projection { .. } => "Projection",
            PhysOp::HashAgg { .. } => "HashAgg",
            PhysOp::StreamAgg { .. } => "StreamAgg",
            PhysOp::Sort { .. } => "Sort",
            PhysOp::TopN { .. } => "TopN",
            PhysOp::Limit { .. } => "Limit",
            PhysOp::HashJoin { .. } => "HashJoin",
            PhysOp::MergeJoin { .. } => "MergeJoin",
            PhysOp::IndexJoin { .. } => "IndexJoin",
            PhysOp::Apply { .. } => "Apply",
            PhysOp::UnionAll => "UnionAll",
        }
    }
}

/// A physical plan node with its accumulated cost and output row estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalPlan {
    pub op: PhysOp,
    pub children: Vec<PhysicalPlan>,
    pub cost: Cost,
    pub rows: f64,
}

impl PhysicalPlan {
    /// Render the tree with two-space indentation, for logs and tests.
    pub fn display(&self, indent: usize) -> String {
        let mut out = String::new();
        self.display_into(indent, &mut out);
        out
    }

    fn display_into(&self, indent: usize, out: &mut String) {
        let pad = "  ".repeat(indent);
        let detail = match &self.op {
            PhysOp::TableScan { source, .. } => format!(" table:{}", source.table),
            PhysOp::IndexScan { source, index, .. } => {
                format!(" table:{} index:{}", source.table, index)
            }
            _ => String::new(),
        };
        let _ = writeln!(
            out,
            "{pad}{}{detail} rows:{:.1} cost:{:.1}",
            self.op.name(),
            self.rows,
            self.cost.total
        );
        for child in &self.children {
            child.display_into(indent + 1, out);
        }
    }

    /// Post-order walk over every node.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a PhysicalPlan)) {
        for child in &self.children {
            child.walk(f);
        }
        f(self);
    }
}
