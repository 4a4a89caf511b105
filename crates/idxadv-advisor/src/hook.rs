//! # Planning Driver
//!
//! The plan hook installed into the engine. For every advisor-enabled
//! SELECT it:
//!
//! 1. optimizes the statement against the live schema (this plan is what the
//!    caller executes, whatever the advisor does),
//! 2. extracts the query-expression info from the physical plan and derives
//!    candidate virtual indexes per table,
//! 3. builds the shadow schema and re-plans the statement against it,
//! 4. walks the re-planned tree for the virtual indexes the optimizer chose,
//! 5. hands costs and chosen indexes to the session accumulator.
//!
//! Advisor failures are logged and swallowed: the statement's cost signals
//! are simply not recorded and the live plan is returned unchanged.

use crate::candidate::{build_table_info_sets, gen_virtual_index_cols};
use crate::error::AdvisorError;
use crate::extract::QueryExprInfo;
use crate::session::{AdvisorRegistry, VirtualIndex};
use crate::shadow::virtual_schema;
use idxadv_core::builder::build_logical_plan;
use idxadv_core::engine::{Engine, HookContext};
use idxadv_core::error::PlanError;
use idxadv_core::ident::Ident;
use idxadv_core::plan::{PhysOp, PhysicalPlan};
use idxadv_core::schema::InfoSchema;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Install the advisor hook on an engine. The registry is captured by the
/// hook closure; no process-global state is involved.
pub fn install(engine: &mut Engine, registry: Arc<AdvisorRegistry>) {
    engine.set_plan_hook(Arc::new(move |ctx: &HookContext<'_>| {
        advise_statement(&registry, ctx)
    }));
}

/// The hook body: plan for the caller, then evaluate virtual indexes on the
/// side. Always returns the live-schema plan.
pub fn advise_statement(
    registry: &AdvisorRegistry,
    ctx: &HookContext<'_>,
) -> Result<PhysicalPlan, PlanError> {
    let physical = ctx.planner.optimize(ctx.logical, ctx.db, ctx.schema)?;
    if let Err(err) = evaluate_virtual_indexes(registry, ctx, &physical) {
        warn!(conn_id = ctx.conn_id, error = %err, "skipping statement in index advisor");
    }
    Ok(physical)
}

fn evaluate_virtual_indexes(
    registry: &AdvisorRegistry,
    ctx: &HookContext<'_>,
    physical: &PhysicalPlan,
) -> Result<(), AdvisorError> {
    let session = registry.get_or_register(&ctx.conn_id.to_string())?;

    let info = QueryExprInfo::from_plan(physical);
    let sets = build_table_info_sets(&info);

    let mut candidates: BTreeMap<String, Vec<Vec<Ident>>> = BTreeMap::new();
    for (table_name, table_sets) in &sets {
        let table = ctx
            .schema
            .table_by_name(ctx.db, table_name)
            .ok_or_else(|| AdvisorError::SchemaMismatch(table_name.clone()))?;
        let lists = gen_virtual_index_cols(table, table_sets);
        if !lists.is_empty() {
            candidates.insert(table_name.clone(), lists);
        }
    }

    let original_cost = physical.cost.total;
    if candidates.is_empty() {
        // Nothing to propose; the virtual plan is the live plan.
        return session
            .lock()
            .expect("session lock poisoned")
            .record_plan_outcome(original_cost, original_cost, &[]);
    }

    let shadow = virtual_schema(ctx.schema, ctx.db, &candidates)?;
    let shadow_logical = build_logical_plan(ctx.sql, ctx.db, &shadow)?;
    let shadow_physical = ctx.planner.optimize(&shadow_logical, ctx.db, &shadow)?;

    let chosen = find_virtual_indexes(&shadow_physical, ctx.schema, ctx.db);
    info!(
        conn_id = ctx.conn_id,
        original_cost,
        virtual_cost = shadow_physical.cost.total,
        chosen = chosen.len(),
        "evaluated virtual indexes"
    );

    let result = session
        .lock()
        .expect("session lock poisoned")
        .record_plan_outcome(original_cost, shadow_physical.cost.total, &chosen);
    result
}

/// Collect the virtual indexes used by index scans in a physical plan.
///
/// The walk is post-order over every node; table scans are ignored. A chosen
/// index that exists on the live schema -- by name, or structurally by
/// column sequence -- is a real index and is silently dropped.
pub fn find_virtual_indexes(
    plan: &PhysicalPlan,
    live: &InfoSchema,
    db: &str,
) -> Vec<VirtualIndex> {
    let mut chosen: Vec<VirtualIndex> = Vec::new();
    plan.walk(&mut |node| {
        let PhysOp::IndexScan { source, index, .. } = &node.op else {
            return;
        };
        if let Some(table) = live.table_by_name(db, &source.table.lowered) {
            let names = index.column_names();
            let is_real = table
                .indexes
                .iter()
                .any(|real| real.name == index.name || real.same_columns(&names));
            if is_real {
                return;
            }
        }
        let candidate = VirtualIndex {
            table: source.table.clone(),
            index: index.clone(),
        };
        // The same index can appear twice in one tree (e.g. as a join
        // probe); it is attributed once per statement.
        if !chosen
            .iter()
            .any(|c| c.table == candidate.table && c.column_names() == candidate.column_names())
        {
            chosen.push(candidate);
        }
    });
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use idxadv_core::cost::Cost;
    use idxadv_core::plan::ScanSource;
    use idxadv_core::schema::{IndexColumn, IndexInfo, TableInfo};

    fn index_scan(table: &str, index_name: &str, cols: &[&str]) -> PhysicalPlan {
        PhysicalPlan {
            op: PhysOp::IndexScan {
                source: ScanSource::new("test", table),
                index: IndexInfo::new(
                    index_name,
                    cols.iter().map(|c| IndexColumn::new(*c)).collect(),
                ),
                access: vec![],
                desc: false,
            },
            children: vec![],
            cost: Cost::zero(),
            rows: 1.0,
        }
    }

    fn live_schema() -> InfoSchema {
        let mut is = InfoSchema::new(1);
        is.add_table(
            "test",
            TableInfo::new("t", &["a", "b", "e"])
                .with_primary_key("a")
                .with_index("i_b", &["b"]),
        );
        is
    }

    #[test]
    fn test_virtual_index_is_collected() {
        let live = live_schema();
        let plan = index_scan("t", "vIndex0", &["e"]);
        let chosen = find_virtual_indexes(&plan, &live, "test");
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].table.lowered, "t");
        assert_eq!(chosen[0].column_names(), vec!["e"]);
    }

    #[test]
    fn test_real_index_is_dropped() {
        let live = live_schema();
        // Chosen by name.
        let by_name = index_scan("t", "i_b", &["b"]);
        assert!(find_virtual_indexes(&by_name, &live, "test").is_empty());
        // Structurally equal to a real index under a virtual name.
        let structural = index_scan("t", "vIndex3", &["b"]);
        assert!(find_virtual_indexes(&structural, &live, "test").is_empty());
    }

    #[test]
    fn test_duplicate_chosen_index_attributed_once() {
        let live = live_schema();
        let plan = PhysicalPlan {
            op: PhysOp::UnionAll,
            children: vec![
                index_scan("t", "vIndex0", &["e"]),
                index_scan("t", "vIndex0", &["e"]),
            ],
            cost: Cost::zero(),
            rows: 2.0,
        };
        assert_eq!(find_virtual_indexes(&plan, &live, "test").len(), 1);
    }
}
