//! # Query-Expression Extraction
//!
//! Walks a physical plan and collects the raw material for candidate-index
//! generation: scalar predicates, per-operator column groupings, projection
//! expressions and the data sources the statement touches.
//!
//! The walk is plan-derived rather than AST-derived: join decomposition and
//! subquery flattening follow whatever the optimizer produced. Multi-child
//! operators merge the infos of everything collected beneath them into one
//! `QueryExprInfo` for the subtree, then add their own contributions, so the
//! composition over the tree is bottom-up joins all the way to the root.
//!
//! Operators the walker does not recognize contribute nothing of their own
//! and are transparently recursed.

use idxadv_core::expr::{ColumnRef, Expr, FuncName, ScalarFunc};
use idxadv_core::ident::Ident;
use idxadv_core::plan::{PhysOp, PhysicalPlan};

/// One base table touched by the statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceInfo {
    pub table: Ident,
    pub alias: Option<Ident>,
    pub col_count: usize,
}

/// The extracted view of one statement.
#[derive(Debug, Clone, Default)]
pub struct QueryExprInfo {
    /// Leaf scalar predicates, flattened through AND/OR.
    pub scalar_funcs: Vec<ScalarFunc>,
    /// Order-sensitive column groups: one inner sequence per aggregate
    /// argument, GROUP BY list, sort-key list or join-key side.
    pub column_groups: Vec<Vec<ColumnRef>>,
    /// Projection (output) expressions.
    pub proj_exprs: Vec<Expr>,
    /// Data sources, one per reader.
    pub data_sources: Vec<DataSourceInfo>,
}

impl QueryExprInfo {
    pub fn from_plan(plan: &PhysicalPlan) -> Self {
        let mut info = collect(plan);
        info.scalar_funcs = flatten_predicates(info.scalar_funcs);
        info
    }

    fn merge(&mut self, other: QueryExprInfo) {
        self.scalar_funcs.extend(other.scalar_funcs);
        self.column_groups.extend(other.column_groups);
        self.proj_exprs.extend(other.proj_exprs);
        self.data_sources.extend(other.data_sources);
    }
}

fn collect(plan: &PhysicalPlan) -> QueryExprInfo {
    // Join everything collected beneath this operator, then contribute.
    let mut info = QueryExprInfo::default();
    for child in &plan.children {
        info.merge(collect(child));
    }

    match &plan.op {
        PhysOp::Selection { conditions } => {
            for cond in conditions {
                if let Expr::Func(f) = cond {
                    info.scalar_funcs.push(f.clone());
                }
            }
        }
        PhysOp::Projection { exprs } => {
            info.proj_exprs.extend(exprs.iter().cloned());
        }
        PhysOp::HashAgg { aggs, group_by } | PhysOp::StreamAgg { aggs, group_by } => {
            for agg in aggs {
                match &agg.arg {
                    Some(Expr::Column(c)) => info.column_groups.push(vec![c.clone()]),
                    // An arithmetic argument contributes its referenced
                    // columns as one group.
                    Some(Expr::Func(f)) if f.name.is_arithmetic() => {
                        let cols: Vec<ColumnRef> = Expr::Func(f.clone())
                            .columns()
                            .into_iter()
                            .cloned()
                            .collect();
                        if !cols.is_empty() {
                            info.column_groups.push(cols);
                        }
                    }
                    _ => {}
                }
            }
            let group_cols: Vec<ColumnRef> = group_by
                .iter()
                .filter_map(|e| e.as_column().cloned())
                .collect();
            if !group_cols.is_empty() {
                info.column_groups.push(group_cols);
            }
        }
        PhysOp::Sort { items } | PhysOp::TopN { items, .. } => {
            let cols: Vec<ColumnRef> = items
                .iter()
                .filter_map(|i| i.expr.as_column().cloned())
                .collect();
            if !cols.is_empty() {
                info.column_groups.push(cols);
            }
        }
        PhysOp::HashJoin { equal, other, .. }
        | PhysOp::MergeJoin { equal, other, .. }
        | PhysOp::IndexJoin { equal, other, .. } => {
            // Each side of an equality key is its own single-column group.
            for (l, r) in equal {
                info.column_groups.push(vec![l.clone()]);
                info.column_groups.push(vec![r.clone()]);
            }
            for cond in other {
                if let Expr::Func(f) = cond {
                    info.scalar_funcs.push(f.clone());
                }
            }
        }
        // Conditions consumed by an index or primary range still classify.
        PhysOp::TableScan { access, .. } | PhysOp::IndexScan { access, .. } => {
            for cond in access {
                if let Expr::Func(f) = cond {
                    info.scalar_funcs.push(f.clone());
                }
            }
        }
        PhysOp::TableReader { source }
        | PhysOp::IndexReader { source }
        | PhysOp::IndexLookUp { source } => {
            info.data_sources.push(DataSourceInfo {
                table: source.table.clone(),
                alias: source.alias.clone(),
                col_count: source.col_count,
            });
        }
        // Apply and UnionAll are the union of their children; Limit adds
        // nothing.
        PhysOp::Apply { .. } | PhysOp::UnionAll | PhysOp::Limit { .. } => {}
    }

    info
}

/// Flatten predicates through AND/OR; leaves are kept verbatim.
fn flatten_predicates(funcs: Vec<ScalarFunc>) -> Vec<ScalarFunc> {
    let mut out = Vec::new();
    for f in funcs {
        flatten_into(f, &mut out);
    }
    out
}

fn flatten_into(f: ScalarFunc, out: &mut Vec<ScalarFunc>) {
    match f.name {
        FuncName::And | FuncName::Or => {
            for arg in f.args {
                if let Expr::Func(inner) = arg {
                    flatten_into(inner, out);
                }
            }
        }
        _ => out.push(f),
    }
}
