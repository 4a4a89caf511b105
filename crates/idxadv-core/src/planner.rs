//! # Physical Planner
//!
//! Turns a logical plan into a costed physical plan against a given
//! `InfoSchema` snapshot. The snapshot is a parameter rather than read from
//! the catalog so the same statement can be planned twice: once against the
//! live schema and once against a shadow schema carrying virtual indexes.
//! Statistics always come from the catalog, so an index that exists only in
//! the shadow is costed with the statistics its columns already have.
//!
//! ## Access paths
//!
//! For every `DataSource` the planner enumerates, in order: the base table
//! path (clustered when the primary key prefix is constrained), then each
//! public index in the table's index list. Index conditions on a leading
//! prefix of the index become access conditions; leftover conditions stay in
//! a `Selection` above the reader. A non-covering index pays the double read
//! through the table-side child of an `IndexLookUp`.
//!
//! ## Required order
//!
//! A parent may require an output ordering (merge join inputs, stream
//! aggregation, sort elimination). A `DataSource` satisfies it with an index
//! whose column prefix matches the ordering; otherwise the parent costs a
//! sort enforcer on the unordered alternative and keeps the cheaper plan.
//!
//! A later alternative replaces the incumbent only when it is *strictly*
//! cheaper, so plans are deterministic for a fixed snapshot and workload.

use crate::catalog::Catalog;
use crate::cost::{Cost, CostInput, CostModel};
use crate::error::PlanError;
use crate::expr::{ByItem, ColumnRef, Expr, FuncName, ScalarFunc};
use crate::plan::{
    DataSource, JoinKind, LogicalPlan, PhysOp, PhysicalPlan, ScanSource,
};
use crate::schema::{IndexInfo, IndexState, InfoSchema, TableInfo};
use crate::stats::{self, Statistics};
use std::sync::Arc;
use tracing::debug;

/// One element of a required output ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub col: ColumnRef,
    pub desc: bool,
}

pub struct Planner {
    catalog: Arc<dyn Catalog>,
    cost_model: Arc<dyn CostModel>,
}

impl Planner {
    pub fn new(catalog: Arc<dyn Catalog>, cost_model: Arc<dyn CostModel>) -> Self {
        Self {
            catalog,
            cost_model,
        }
    }

    /// Optimize a logical plan against a schema snapshot.
    pub fn optimize(
        &self,
        plan: &LogicalPlan,
        db: &str,
        schema: &InfoSchema,
    ) -> Result<PhysicalPlan, PlanError> {
        let ctx = PlanCtx {
            planner: self,
            db,
            schema,
        };
        let physical = ctx
            .plan_node(plan, None)?
            .ok_or_else(|| PlanError::Unsupported("no feasible physical plan".into()))?;
        debug!(cost = physical.cost.total, "optimized statement");
        Ok(physical)
    }
}

struct PlanCtx<'a> {
    planner: &'a Planner,
    db: &'a str,
    schema: &'a InfoSchema,
}

impl<'a> PlanCtx<'a> {
    fn cost(&self, op: &PhysOp, inputs: &[CostInput], children: &[Cost]) -> Cost {
        self.planner.cost_model.compute_cost(op, inputs, children)
    }

    fn table_stats(&self, table: &str) -> Statistics {
        self.planner
            .catalog
            .table_stats(self.db, table)
            .unwrap_or_else(|| Statistics::new(1000.0))
    }

    /// NDV of a column through its origin table's statistics.
    fn column_ndv(&self, col: &ColumnRef) -> f64 {
        if !col.has_origin() {
            return 1.0;
        }
        self.table_stats(&col.table.lowered).ndv(&col.name.lowered)
    }

    fn row_width(&self, table: &TableInfo, stats: &Statistics) -> f64 {
        table
            .columns
            .iter()
            .map(|c| stats.col_size(&c.name.lowered))
            .sum()
    }

    fn index_width(&self, index: &IndexInfo, stats: &Statistics) -> f64 {
        // Declared columns plus the row handle.
        index
            .columns
            .iter()
            .map(|c| stats.col_size(&c.name.lowered))
            .sum::<f64>()
            + stats::DEFAULT_COL_SIZE
    }

    fn plan_node(
        &self,
        plan: &LogicalPlan,
        required: Option<&[OrderItem]>,
    ) -> Result<Option<PhysicalPlan>, PlanError> {
        match plan {
            LogicalPlan::Scan(ds) => self.plan_scan(ds, required),
            LogicalPlan::Selection { conditions, child } => {
                let Some(child_plan) = self.plan_node(child, required)? else {
                    return Ok(None);
                };
                Ok(Some(self.wrap_selection(child_plan, conditions.clone())))
            }
            LogicalPlan::Projection { exprs, child } => {
                let Some(child_plan) = self.plan_node(child, required)? else {
                    return Ok(None);
                };
                let rows = child_plan.rows;
                let cost = self.cost(
                    &PhysOp::Projection { exprs: vec![] },
                    &[CostInput::rows(rows)],
                    &[child_plan.cost],
                );
                Ok(Some(PhysicalPlan {
                    op: PhysOp::Projection {
                        exprs: exprs.clone(),
                    },
                    children: vec![child_plan],
                    cost,
                    rows,
                }))
            }
            LogicalPlan::Aggregation {
                aggs,
                group_by,
                child,
            } => self.plan_aggregation(aggs, group_by, child, required),
            LogicalPlan::Sort { items, child } => {
                if required.is_some() {
                    return Ok(None);
                }
                self.plan_sort(items, child)
            }
            LogicalPlan::TopN {
                items,
                limit,
                child,
            } => {
                if required.is_some() {
                    return Ok(None);
                }
                self.plan_topn(items, *limit, child)
            }
            LogicalPlan::Limit { limit, child } => {
                let Some(child_plan) = self.plan_node(child, required)? else {
                    return Ok(None);
                };
                let rows = child_plan.rows.min(*limit as f64);
                let cost = self.cost(
                    &PhysOp::Limit { limit: *limit },
                    &[CostInput::rows(rows)],
                    &[child_plan.cost],
                );
                Ok(Some(PhysicalPlan {
                    op: PhysOp::Limit { limit: *limit },
                    children: vec![child_plan],
                    cost,
                    rows,
                }))
            }
            LogicalPlan::Join {
                kind,
                equal,
                other,
                left,
                right,
            } => {
                if required.is_some() {
                    return Ok(None);
                }
                self.plan_join(*kind, equal, other, left, right)
            }
            LogicalPlan::Apply {
                conditions,
                outer,
                inner,
            } => {
                if required.is_some() {
                    return Ok(None);
                }
                let Some(outer_plan) = self.plan_node(outer, None)? else {
                    return Ok(None);
                };
                let Some(inner_plan) = self.plan_node(inner, None)? else {
                    return Ok(None);
                };
                let rows = (outer_plan.rows * 0.8).max(1.0);
                let op = PhysOp::Apply {
                    conditions: conditions.clone(),
                };
                let cost = self.cost(
                    &op,
                    &[CostInput::rows(outer_plan.rows)],
                    &[outer_plan.cost, inner_plan.cost],
                );
                Ok(Some(PhysicalPlan {
                    op,
                    children: vec![outer_plan, inner_plan],
                    cost,
                    rows,
                }))
            }
            LogicalPlan::UnionAll { children } => {
                if required.is_some() {
                    return Ok(None);
                }
                let mut plans = Vec::new();
                for child in children {
                    let Some(p) = self.plan_node(child, None)? else {
                        return Ok(None);
                    };
                    plans.push(p);
                }
                let rows = plans.iter().map(|p| p.rows).sum();
                let costs: Vec<Cost> = plans.iter().map(|p| p.cost).collect();
                let cost = self.cost(&PhysOp::UnionAll, &[CostInput::rows(rows)], &costs);
                Ok(Some(PhysicalPlan {
                    op: PhysOp::UnionAll,
                    children: plans,
                    cost,
                    rows,
                }))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Scans
    // -----------------------------------------------------------------------

    fn plan_scan(
        &self,
        ds: &DataSource,
        required: Option<&[OrderItem]>,
    ) -> Result<Option<PhysicalPlan>, PlanError> {
        let table = self
            .schema
            .table_by_name(&ds.db.lowered, &ds.table.lowered)
            .ok_or_else(|| PlanError::UnknownTable(ds.table.original.clone()))?;
        let stats = self.table_stats(&ds.table.lowered);
        let row_width = self.row_width(table, &stats);
        let source = ScanSource::from_data_source(ds);
        let needed: Vec<&str> = ds.columns.iter().map(|c| c.name.lowered.as_str()).collect();

        let mut best: Option<PhysicalPlan> = None;

        if required.is_none() {
            let path = self.table_path(ds, table, &stats, row_width, &source);
            keep_cheapest(&mut best, path);
        }

        for index in &table.indexes {
            if index.primary || index.state != IndexState::Public {
                continue;
            }
            let (desc, order_ok) = match required {
                Some(items) => match index_order(index, items, &ds.table.lowered) {
                    Some(desc) => (desc, true),
                    None => (false, false),
                },
                None => (false, true),
            };
            if !order_ok {
                continue;
            }
            let path = self.index_path(
                index,
                &stats,
                row_width,
                &source,
                &needed,
                &ds.pushed_conditions,
                desc,
            );
            keep_cheapest(&mut best, path);
        }

        Ok(best)
    }

    /// Base table access: clustered when the primary key prefix is
    /// constrained, full scan otherwise.
    fn table_path(
        &self,
        ds: &DataSource,
        table: &TableInfo,
        stats: &Statistics,
        row_width: f64,
        source: &ScanSource,
    ) -> PhysicalPlan {
        let (access, remaining, selectivity) = match table.primary_index() {
            Some(pk) => split_index_access(&ds.pushed_conditions, pk, stats),
            None => (Vec::new(), ds.pushed_conditions.clone(), 1.0),
        };
        let clustered = !access.is_empty();
        let matched = (stats.row_count * selectivity).max(1.0);
        let scan_rows = if clustered { matched } else { stats.row_count };

        let scan_op = PhysOp::TableScan {
            source: source.clone(),
            access,
            clustered,
        };
        let scan_cost = self.cost(
            &scan_op,
            &[CostInput::new(scan_rows, scan_rows * row_width)],
            &[],
        );
        let scan = PhysicalPlan {
            op: scan_op,
            children: vec![],
            cost: scan_cost,
            rows: matched,
        };

        let reader_op = PhysOp::TableReader {
            source: source.clone(),
        };
        let reader_cost = self.cost(&reader_op, &[], &[scan.cost]);
        let reader = PhysicalPlan {
            op: reader_op,
            children: vec![scan],
            cost: reader_cost,
            rows: matched,
        };

        if remaining.is_empty() {
            reader
        } else {
            self.wrap_selection(reader, remaining)
        }
    }

    /// Access through one index: covering scans read the index alone, the
    /// rest pay the double read through an `IndexLookUp`.
    #[allow(clippy::too_many_arguments)]
    fn index_path(
        &self,
        index: &IndexInfo,
        stats: &Statistics,
        row_width: f64,
        source: &ScanSource,
        needed: &[&str],
        conditions: &[Expr],
        desc: bool,
    ) -> PhysicalPlan {
        let (access, remaining, selectivity) = split_index_access(conditions, index, stats);
        let matched = (stats.row_count * selectivity).max(1.0);
        let idx_width = self.index_width(index, stats);
        let covering = {
            let names = index.column_names();
            needed.iter().all(|n| names.contains(n))
        };

        let scan_op = PhysOp::IndexScan {
            source: source.clone(),
            index: index.clone(),
            access,
            desc,
        };
        let scan_cost = self.cost(
            &scan_op,
            &[CostInput::new(matched, matched * idx_width)],
            &[],
        );
        let scan = PhysicalPlan {
            op: scan_op,
            children: vec![],
            cost: scan_cost,
            rows: matched,
        };

        let reader = if covering {
            let op = PhysOp::IndexReader {
                source: source.clone(),
            };
            let cost = self.cost(&op, &[], &[scan.cost]);
            PhysicalPlan {
                op,
                children: vec![scan],
                cost,
                rows: matched,
            }
        } else {
            // Table-side fetch of the matched handles.
            let fetch_op = PhysOp::TableScan {
                source: source.clone(),
                access: vec![],
                clustered: true,
            };
            let fetch_cost = self.cost(
                &fetch_op,
                &[CostInput::new(matched, matched * row_width)],
                &[],
            );
            let fetch = PhysicalPlan {
                op: fetch_op,
                children: vec![],
                cost: fetch_cost,
                rows: matched,
            };
            let op = PhysOp::IndexLookUp {
                source: source.clone(),
            };
            let cost = self.cost(&op, &[CostInput::rows(matched)], &[scan.cost, fetch.cost]);
            PhysicalPlan {
                op,
                children: vec![scan, fetch],
                cost,
                rows: matched,
            }
        };

        if remaining.is_empty() {
            reader
        } else {
            self.wrap_selection(reader, remaining)
        }
    }

    fn wrap_selection(&self, child: PhysicalPlan, conditions: Vec<Expr>) -> PhysicalPlan {
        let stats = scan_stats_of(&child)
            .map(|t| self.table_stats(t))
            .unwrap_or_else(|| Statistics::new(child.rows));
        let selectivity: f64 = conditions
            .iter()
            .map(|c| condition_selectivity(c, &stats))
            .product();
        let rows = (child.rows * selectivity).max(1.0);
        let op = PhysOp::Selection { conditions };
        let cost = self.cost(&op, &[CostInput::rows(child.rows)], &[child.cost]);
        PhysicalPlan {
            op,
            children: vec![child],
            cost,
            rows,
        }
    }

    // -----------------------------------------------------------------------
    // Aggregation
    // -----------------------------------------------------------------------

    fn plan_aggregation(
        &self,
        aggs: &[crate::expr::AggExpr],
        group_by: &[Expr],
        child: &LogicalPlan,
        required: Option<&[OrderItem]>,
    ) -> Result<Option<PhysicalPlan>, PlanError> {
        if required.is_some() {
            return Ok(None);
        }

        let group_cols: Option<Vec<ColumnRef>> = group_by
            .iter()
            .map(|e| e.as_column().cloned())
            .collect();
        let groups = match &group_cols {
            Some(cols) if !cols.is_empty() => {
                let mut g = 1.0_f64;
                for c in cols {
                    g *= self.column_ndv(c);
                }
                g
            }
            _ => 1.0,
        };

        // Hash aggregation over the cheapest unordered child.
        let mut best: Option<PhysicalPlan> = None;
        if let Some(child_plan) = self.plan_node(child, None)? {
            let rows = groups.min(child_plan.rows).max(1.0);
            let op = PhysOp::HashAgg {
                aggs: aggs.to_vec(),
                group_by: group_by.to_vec(),
            };
            let cost = self.cost(
                &op,
                &[CostInput::rows(child_plan.rows), CostInput::rows(rows)],
                &[child_plan.cost],
            );
            keep_cheapest(
                &mut best,
                PhysicalPlan {
                    op,
                    children: vec![child_plan],
                    cost,
                    rows,
                },
            );
        }

        // Stream aggregation when the child can produce group order.
        if let Some(cols) = &group_cols {
            if !cols.is_empty() {
                let items: Vec<OrderItem> = cols
                    .iter()
                    .map(|c| OrderItem {
                        col: c.clone(),
                        desc: false,
                    })
                    .collect();
                if let Some(child_plan) = self.plan_node(child, Some(items.as_slice()))? {
                    let rows = groups.min(child_plan.rows).max(1.0);
                    let op = PhysOp::StreamAgg {
                        aggs: aggs.to_vec(),
                        group_by: group_by.to_vec(),
                    };
                    let cost = self.cost(
                        &op,
                        &[CostInput::rows(child_plan.rows)],
                        &[child_plan.cost],
                    );
                    keep_cheapest(
                        &mut best,
                        PhysicalPlan {
                            op,
                            children: vec![child_plan],
                            cost,
                            rows,
                        },
                    );
                }
            }
        }

        Ok(best)
    }

    // -----------------------------------------------------------------------
    // Sort / TopN
    // -----------------------------------------------------------------------

    fn order_items(items: &[ByItem]) -> Option<Vec<OrderItem>> {
        items
            .iter()
            .map(|i| {
                i.expr.as_column().map(|c| OrderItem {
                    col: c.clone(),
                    desc: i.desc,
                })
            })
            .collect()
    }

    fn plan_sort(
        &self,
        items: &[ByItem],
        child: &LogicalPlan,
    ) -> Result<Option<PhysicalPlan>, PlanError> {
        // Enforcer: sort the cheapest unordered child.
        let mut best: Option<PhysicalPlan> = None;
        if let Some(child_plan) = self.plan_node(child, None)? {
            let rows = child_plan.rows;
            let op = PhysOp::Sort {
                items: items.to_vec(),
            };
            let cost = self.cost(&op, &[CostInput::rows(rows)], &[child_plan.cost]);
            keep_cheapest(
                &mut best,
                PhysicalPlan {
                    op,
                    children: vec![child_plan],
                    cost,
                    rows,
                },
            );
        }

        // Order elimination: a child that already produces the order.
        if let Some(order) = Self::order_items(items) {
            if let Some(child_plan) = self.plan_node(child, Some(order.as_slice()))? {
                keep_cheapest(&mut best, child_plan);
            }
        }
        Ok(best)
    }

    fn plan_topn(
        &self,
        items: &[ByItem],
        limit: u64,
        child: &LogicalPlan,
    ) -> Result<Option<PhysicalPlan>, PlanError> {
        let mut best: Option<PhysicalPlan> = None;
        if let Some(child_plan) = self.plan_node(child, None)? {
            let rows = child_plan.rows.min(limit as f64);
            let op = PhysOp::TopN {
                items: items.to_vec(),
                limit,
            };
            let cost = self.cost(
                &op,
                &[CostInput::rows(child_plan.rows)],
                &[child_plan.cost],
            );
            keep_cheapest(
                &mut best,
                PhysicalPlan {
                    op,
                    children: vec![child_plan],
                    cost,
                    rows,
                },
            );
        }

        // An ordered child turns top-n into a plain limit.
        if let Some(order) = Self::order_items(items) {
            if let Some(child_plan) = self.plan_node(child, Some(order.as_slice()))? {
                let rows = child_plan.rows.min(limit as f64);
                let op = PhysOp::Limit { limit };
                let cost = self.cost(&op, &[CostInput::rows(rows)], &[child_plan.cost]);
                keep_cheapest(
                    &mut best,
                    PhysicalPlan {
                        op,
                        children: vec![child_plan],
                        cost,
                        rows,
                    },
                );
            }
        }
        Ok(best)
    }

    // -----------------------------------------------------------------------
    // Joins
    // -----------------------------------------------------------------------

    fn plan_join(
        &self,
        kind: JoinKind,
        equal: &[(ColumnRef, ColumnRef)],
        other: &[Expr],
        left: &LogicalPlan,
        right: &LogicalPlan,
    ) -> Result<Option<PhysicalPlan>, PlanError> {
        let mut best: Option<PhysicalPlan> = None;

        let out_rows = |l: f64, r: f64| -> f64 {
            let mut selectivity = 1.0_f64;
            for (lc, rc) in equal {
                selectivity /= self.column_ndv(lc).max(self.column_ndv(rc)).max(1.0);
            }
            for _ in other {
                selectivity *= stats::DEFAULT_SELECTIVITY;
            }
            match kind {
                JoinKind::Inner => (l * r * selectivity).max(1.0),
                JoinKind::Semi => (l * 0.8).max(1.0),
            }
        };

        // Hash join, building on the smaller side.
        let left_plan = self.plan_node(left, None)?;
        let right_plan = self.plan_node(right, None)?;
        if let (Some(l), Some(r)) = (&left_plan, &right_plan) {
            let (build, probe) = match kind {
                // A semi join always builds the hash set on the inner side.
                JoinKind::Semi => (r.rows, l.rows),
                JoinKind::Inner => {
                    if l.rows <= r.rows {
                        (l.rows, r.rows)
                    } else {
                        (r.rows, l.rows)
                    }
                }
            };
            let op = PhysOp::HashJoin {
                kind,
                equal: equal.to_vec(),
                other: other.to_vec(),
            };
            let cost = self.cost(
                &op,
                &[CostInput::rows(build), CostInput::rows(probe)],
                &[l.cost, r.cost],
            );
            keep_cheapest(
                &mut best,
                PhysicalPlan {
                    op,
                    children: vec![l.clone(), r.clone()],
                    cost,
                    rows: out_rows(l.rows, r.rows),
                },
            );
        }

        // Index nested-loop join, probing an index on either side's scan.
        for (probe_left, outer_plan) in [
            (true, right_plan.as_ref()),
            (false, left_plan.as_ref()),
        ] {
            // A semi join keeps left-side rows, so the probe runs against the
            // left side driven by the inner (right) side.
            if kind == JoinKind::Semi && !probe_left {
                continue;
            }
            let probe_side = if probe_left { left } else { right };
            let LogicalPlan::Scan(probe_ds) = probe_side else {
                continue;
            };
            let Some(outer_plan) = outer_plan else {
                continue;
            };
            let (outer_key, probe_key) = match equal.first() {
                Some((lc, rc)) => {
                    if probe_left {
                        (rc, lc)
                    } else {
                        (lc, rc)
                    }
                }
                None => continue,
            };
            if let Some(plan) = self.index_join_path(
                kind,
                equal,
                other,
                outer_plan,
                probe_ds,
                outer_key,
                probe_key,
            )? {
                keep_cheapest(&mut best, plan);
            }
        }

        Ok(best)
    }

    /// Probe `probe_ds` through an index whose leading column is the join
    /// key. The second child of the produced node is one probe's worth of
    /// inner access; the cost model multiplies it by the outer row count.
    #[allow(clippy::too_many_arguments)]
    fn index_join_path(
        &self,
        kind: JoinKind,
        equal: &[(ColumnRef, ColumnRef)],
        other: &[Expr],
        outer_plan: &PhysicalPlan,
        probe_ds: &DataSource,
        outer_key: &ColumnRef,
        probe_key: &ColumnRef,
    ) -> Result<Option<PhysicalPlan>, PlanError> {
        let table = self
            .schema
            .table_by_name(&probe_ds.db.lowered, &probe_ds.table.lowered)
            .ok_or_else(|| PlanError::UnknownTable(probe_ds.table.original.clone()))?;
        let stats = self.table_stats(&probe_ds.table.lowered);
        let row_width = self.row_width(table, &stats);
        let source = ScanSource::from_data_source(probe_ds);
        let needed: Vec<&str> = probe_ds
            .columns
            .iter()
            .map(|c| c.name.lowered.as_str())
            .collect();

        let probe_access = Expr::Func(ScalarFunc {
            name: FuncName::Eq,
            args: vec![
                Expr::Column(probe_key.clone()),
                Expr::Column(outer_key.clone()),
            ],
        });
        let per_probe_matched =
            (stats.row_count / stats.ndv(&probe_key.name.lowered)).max(1.0);

        let mut best_probe: Option<PhysicalPlan> = None;
        for index in &table.indexes {
            if index.primary || index.state != IndexState::Public {
                continue;
            }
            if index.columns.first().map(|c| c.name.lowered.as_str())
                != Some(probe_key.name.lowered.as_str())
            {
                continue;
            }
            let idx_width = self.index_width(index, &stats);
            let covering = {
                let names = index.column_names();
                needed.iter().all(|n| names.contains(n))
            };
            let scan_op = PhysOp::IndexScan {
                source: source.clone(),
                index: index.clone(),
                access: vec![probe_access.clone()],
                desc: false,
            };
            let scan_cost = self.cost(
                &scan_op,
                &[CostInput::new(per_probe_matched, per_probe_matched * idx_width)],
                &[],
            );
            let scan = PhysicalPlan {
                op: scan_op,
                children: vec![],
                cost: scan_cost,
                rows: per_probe_matched,
            };
            let reader = if covering {
                let op = PhysOp::IndexReader {
                    source: source.clone(),
                };
                let cost = self.cost(&op, &[], &[scan.cost]);
                PhysicalPlan {
                    op,
                    children: vec![scan],
                    cost,
                    rows: per_probe_matched,
                }
            } else {
                let fetch_op = PhysOp::TableScan {
                    source: source.clone(),
                    access: vec![],
                    clustered: true,
                };
                let fetch_cost = self.cost(
                    &fetch_op,
                    &[CostInput::new(per_probe_matched, per_probe_matched * row_width)],
                    &[],
                );
                let fetch = PhysicalPlan {
                    op: fetch_op,
                    children: vec![],
                    cost: fetch_cost,
                    rows: per_probe_matched,
                };
                let op = PhysOp::IndexLookUp {
                    source: source.clone(),
                };
                let cost = self.cost(
                    &op,
                    &[CostInput::rows(per_probe_matched)],
                    &[scan.cost, fetch.cost],
                );
                PhysicalPlan {
                    op,
                    children: vec![scan, fetch],
                    cost,
                    rows: per_probe_matched,
                }
            };
            let probe = if probe_ds.pushed_conditions.is_empty() {
                reader
            } else {
                self.wrap_selection(reader, probe_ds.pushed_conditions.clone())
            };
            keep_cheapest(&mut best_probe, probe);
        }

        let Some(probe) = best_probe else {
            return Ok(None);
        };
        let op = PhysOp::IndexJoin {
            kind,
            equal: equal.to_vec(),
            other: other.to_vec(),
        };
        let cost = self.cost(
            &op,
            &[CostInput::rows(outer_plan.rows)],
            &[outer_plan.cost, probe.cost],
        );
        let rows = (outer_plan.rows * probe.rows).max(1.0);
        Ok(Some(PhysicalPlan {
            op,
            children: vec![outer_plan.clone(), probe],
            cost,
            rows,
        }))
    }
}

/// Keep `candidate` only when it is strictly cheaper than the incumbent.
fn keep_cheapest(best: &mut Option<PhysicalPlan>, candidate: PhysicalPlan) {
    match best {
        Some(current) if candidate.cost.total < current.cost.total => *best = Some(candidate),
        Some(_) => {}
        None => *best = Some(candidate),
    }
}

/// Does the index provide the required order? Returns the scan direction, or
/// `None` when the order cannot be provided. The required columns must be a
/// prefix of the index columns with a uniform direction.
fn index_order(index: &IndexInfo, items: &[OrderItem], table: &str) -> Option<bool> {
    if items.is_empty() {
        return Some(false);
    }
    if items.len() > index.columns.len() {
        return None;
    }
    for (item, col) in items.iter().zip(index.columns.iter()) {
        if item.col.table.lowered != table || item.col.name.lowered != col.name.lowered {
            return None;
        }
    }
    let desc = items[0].desc;
    if items.iter().any(|i| i.desc != desc) {
        return None;
    }
    Some(desc)
}

/// Split pushed-down conditions into index access conditions and the rest.
/// Equality/IN conditions bind leading index columns; one range condition may
/// bind the next column. Returns the combined selectivity of the access
/// conditions.
fn split_index_access(
    conditions: &[Expr],
    index: &IndexInfo,
    stats: &Statistics,
) -> (Vec<Expr>, Vec<Expr>, f64) {
    let mut remaining: Vec<Expr> = conditions.to_vec();
    let mut access = Vec::new();
    let mut selectivity = 1.0_f64;

    for index_col in &index.columns {
        let col = index_col.name.lowered.as_str();
        // Equality or IN on this column extends the prefix.
        if let Some(pos) = remaining
            .iter()
            .position(|c| matches_column_func(c, col, &[FuncName::Eq, FuncName::In]))
        {
            let cond = remaining.remove(pos);
            selectivity *= condition_selectivity(&cond, stats);
            access.push(cond);
            continue;
        }
        // A single range condition ends the prefix.
        if let Some(pos) = remaining.iter().position(|c| {
            matches_column_func(
                c,
                col,
                &[FuncName::Gt, FuncName::Lt, FuncName::Ge, FuncName::Le],
            )
        }) {
            let cond = remaining.remove(pos);
            selectivity *= condition_selectivity(&cond, stats);
            access.push(cond);
        }
        break;
    }

    (access, remaining, selectivity)
}

/// Is `cond` a predicate of one of the given kinds over exactly this column
/// (with all other arguments constant)?
fn matches_column_func(cond: &Expr, col: &str, kinds: &[FuncName]) -> bool {
    let Expr::Func(f) = cond else {
        return false;
    };
    if !kinds.contains(&f.name) {
        return false;
    }
    let mut column_args = 0;
    let mut matched = false;
    for arg in &f.args {
        match arg {
            Expr::Column(c) => {
                column_args += 1;
                if c.name.lowered == col {
                    matched = true;
                }
            }
            Expr::Literal(_) => {}
            Expr::Func(_) => return false,
        }
    }
    matched && column_args == 1
}

/// Selectivity of one predicate against the owning table's statistics.
fn condition_selectivity(cond: &Expr, stats: &Statistics) -> f64 {
    let Expr::Func(f) = cond else {
        return stats::DEFAULT_SELECTIVITY;
    };
    let col = f.args.iter().find_map(|a| a.as_column());
    match f.name {
        FuncName::Eq => match col {
            Some(c) => stats::equality_selectivity(stats, &c.name.lowered),
            None => stats::DEFAULT_SELECTIVITY,
        },
        FuncName::In => match col {
            Some(c) => stats::in_list_selectivity(stats, &c.name.lowered, f.args.len() - 1),
            None => stats::DEFAULT_SELECTIVITY,
        },
        FuncName::Gt | FuncName::Lt | FuncName::Ge | FuncName::Le => stats::RANGE_SELECTIVITY,
        FuncName::Ne => match col {
            Some(c) => 1.0 - stats::equality_selectivity(stats, &c.name.lowered),
            None => stats::DEFAULT_SELECTIVITY,
        },
        FuncName::And => f
            .args
            .iter()
            .map(|a| condition_selectivity(a, stats))
            .product(),
        FuncName::Or => {
            let product: f64 = f
                .args
                .iter()
                .map(|a| 1.0 - condition_selectivity(a, stats))
                .product();
            1.0 - product
        }
        _ => stats::DEFAULT_SELECTIVITY,
    }
}

/// The table behind a reader subtree, for selectivity estimation.
fn scan_stats_of(plan: &PhysicalPlan) -> Option<&str> {
    match &plan.op {
        PhysOp::TableReader { source }
        | PhysOp::IndexReader { source }
        | PhysOp::IndexLookUp { source } => Some(source.table.lowered.as_str()),
        _ => plan.children.first().and_then(scan_stats_of),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_logical_plan;
    use crate::catalog::MemCatalog;
    use crate::cost::DefaultCostModel;
    use crate::schema::TableInfo;
    use crate::stats::ColumnStatistics;

    fn fixture() -> (Arc<MemCatalog>, Arc<InfoSchema>) {
        let catalog = Arc::new(MemCatalog::new());
        catalog.add_table(
            "test",
            TableInfo::new("t", &["a", "b", "c", "d", "e", "ts"]).with_primary_key("a"),
            Statistics::new(32.0)
                .with_column("a", ColumnStatistics::new(32.0))
                .with_column("b", ColumnStatistics::new(8.0))
                .with_column("c", ColumnStatistics::new(16.0).with_avg_size(24.0))
                .with_column("d", ColumnStatistics::new(32.0))
                .with_column("e", ColumnStatistics::new(4.0))
                .with_column("ts", ColumnStatistics::new(32.0)),
        );
        catalog.add_table(
            "test",
            TableInfo::new("t1", &["a", "b", "c", "d"]),
            Statistics::new(15.0)
                .with_column("a", ColumnStatistics::new(15.0))
                .with_column("b", ColumnStatistics::new(15.0))
                .with_column("c", ColumnStatistics::new(15.0))
                .with_column("d", ColumnStatistics::new(15.0)),
        );
        let schema = catalog.schema();
        (catalog, schema)
    }

    fn planner(catalog: Arc<MemCatalog>) -> Planner {
        Planner::new(catalog, Arc::new(DefaultCostModel::default()))
    }

    fn optimize(sql: &str) -> PhysicalPlan {
        let (catalog, schema) = fixture();
        let logical = build_logical_plan(sql, "test", &schema).unwrap();
        planner(catalog).optimize(&logical, "test", &schema).unwrap()
    }

    fn collect_ops(plan: &PhysicalPlan) -> Vec<&'static str> {
        let mut ops = Vec::new();
        plan.walk(&mut |n| ops.push(n.op.name()));
        ops
    }

    #[test]
    fn test_point_lookup_uses_clustered_scan() {
        let plan = optimize("select * from t where a = 1");
        let ops = collect_ops(&plan);
        assert!(ops.contains(&"TableScan"));
        let mut clustered = false;
        plan.walk(&mut |n| {
            if let PhysOp::TableScan { clustered: c, access, .. } = &n.op {
                clustered |= *c && !access.is_empty();
            }
        });
        assert!(clustered, "primary key equality should prune the scan:\n{}", plan.display(0));
    }

    #[test]
    fn test_group_by_without_index_uses_hash_agg() {
        let plan = optimize("select count(*) from t group by e");
        let ops = collect_ops(&plan);
        assert!(ops.contains(&"HashAgg"), "ops: {ops:?}");
        assert!(!ops.contains(&"IndexScan"));
    }

    #[test]
    fn test_group_by_uses_stream_agg_over_index() {
        let (catalog, _) = fixture();
        // A real index on e makes the ordered path available.
        let mut schema = (*catalog.schema()).clone();
        schema
            .table_by_name_mut("test", "t")
            .unwrap()
            .indexes
            .push(IndexInfo::new(
                "i_e",
                vec![crate::schema::IndexColumn::new("e")],
            ));
        let logical =
            build_logical_plan("select count(*) from t group by e", "test", &schema).unwrap();
        let plan = planner(catalog).optimize(&logical, "test", &schema).unwrap();
        let ops = collect_ops(&plan);
        assert!(ops.contains(&"StreamAgg"), "ops: {ops:?}\n{}", plan.display(0));
        assert!(ops.contains(&"IndexScan"));
    }

    #[test]
    fn test_covering_index_avoids_double_read() {
        let (catalog, _) = fixture();
        let mut schema = (*catalog.schema()).clone();
        schema
            .table_by_name_mut("test", "t1")
            .unwrap()
            .indexes
            .push(IndexInfo::new(
                "i_cab",
                vec![
                    crate::schema::IndexColumn::new("c"),
                    crate::schema::IndexColumn::new("a"),
                    crate::schema::IndexColumn::new("b"),
                ],
            ));
        let logical = build_logical_plan(
            "select a, b from t1 where c in (1,3)",
            "test",
            &schema,
        )
        .unwrap();
        let plan = planner(catalog).optimize(&logical, "test", &schema).unwrap();
        let ops = collect_ops(&plan);
        assert!(ops.contains(&"IndexReader"), "ops: {ops:?}\n{}", plan.display(0));
        assert!(!ops.contains(&"IndexLookUp"));
        assert!(!ops.contains(&"TableScan"));
    }

    #[test]
    fn test_non_covering_index_pays_double_read() {
        let (catalog, _) = fixture();
        let mut schema = (*catalog.schema()).clone();
        schema
            .table_by_name_mut("test", "t1")
            .unwrap()
            .indexes
            .push(IndexInfo::new(
                "i_c",
                vec![crate::schema::IndexColumn::new("c")],
            ));
        let logical = build_logical_plan(
            "select a, b from t1 where c in (1,3)",
            "test",
            &schema,
        )
        .unwrap();
        let plan = planner(catalog).optimize(&logical, "test", &schema).unwrap();
        let ops = collect_ops(&plan);
        assert!(ops.contains(&"IndexLookUp"), "ops: {ops:?}\n{}", plan.display(0));
    }

    #[test]
    fn test_desc_order_satisfied_by_reverse_index_scan() {
        let (catalog, _) = fixture();
        let mut schema = (*catalog.schema()).clone();
        schema
            .table_by_name_mut("test", "t1")
            .unwrap()
            .indexes
            .push(IndexInfo::new(
                "i_ba",
                vec![
                    crate::schema::IndexColumn::new("b"),
                    crate::schema::IndexColumn::new("a"),
                ],
            ));
        let logical =
            build_logical_plan("select a from t1 order by b desc", "test", &schema).unwrap();
        let plan = planner(catalog).optimize(&logical, "test", &schema).unwrap();
        let mut saw_desc_scan = false;
        plan.walk(&mut |n| {
            if let PhysOp::IndexScan { desc, .. } = &n.op {
                saw_desc_scan |= *desc;
            }
        });
        assert!(saw_desc_scan, "{}", plan.display(0));
        assert!(!collect_ops(&plan).contains(&"Sort"));
    }

    #[test]
    fn test_invisible_index_is_not_considered() {
        let (catalog, _) = fixture();
        let mut schema = (*catalog.schema()).clone();
        let mut index = IndexInfo::new("i_c", vec![crate::schema::IndexColumn::new("c")]);
        index.state = IndexState::Invisible;
        schema
            .table_by_name_mut("test", "t1")
            .unwrap()
            .indexes
            .push(index);
        let logical = build_logical_plan(
            "select a, b from t1 where c in (1,3)",
            "test",
            &schema,
        )
        .unwrap();
        let plan = planner(catalog).optimize(&logical, "test", &schema).unwrap();
        assert!(!collect_ops(&plan).contains(&"IndexScan"));
    }

    #[test]
    fn test_plan_cost_is_deterministic() {
        let a = optimize("select * from t where b in (select c from t1 where c > 0)");
        let b = optimize("select * from t where b in (select c from t1 where c > 0)");
        assert_eq!(a.cost.total, b.cost.total);
        assert_eq!(a.display(0), b.display(0));
    }
}
