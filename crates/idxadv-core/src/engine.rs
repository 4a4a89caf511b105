//! # Engine Session Facade
//!
//! A thin statement-execution surface binding sessions to the planner. It is
//! the integration point the advisor hooks into: when a session has
//! `tidb_enable_index_advisor` set and a hook is registered, every SELECT is
//! routed through the hook *after* the logical plan is built and *before*
//! optimization. The hook performs its own planning and returns the physical
//! plan for the live schema, so user-observable execution is unchanged by
//! advisor failures.

use crate::builder::build_logical_plan;
use crate::catalog::Catalog;
use crate::cost::CostModel;
use crate::error::PlanError;
use crate::plan::{LogicalPlan, PhysicalPlan};
use crate::planner::Planner;
use crate::schema::InfoSchema;
use std::sync::Arc;
use tracing::warn;

/// The session variable that routes SELECTs through the advisor hook.
pub const ENABLE_INDEX_ADVISOR: &str = "tidb_enable_index_advisor";

/// Per-connection session state.
pub struct EngineSession {
    pub conn_id: u64,
    pub current_db: String,
    pub enable_index_advisor: bool,
}

/// Everything a plan hook receives for one statement.
pub struct HookContext<'a> {
    pub conn_id: u64,
    pub db: &'a str,
    pub sql: &'a str,
    pub logical: &'a LogicalPlan,
    pub schema: &'a Arc<InfoSchema>,
    pub planner: &'a Planner,
}

pub type PlanHook = dyn Fn(&HookContext<'_>) -> Result<PhysicalPlan, PlanError> + Send + Sync;

/// Result of executing one statement.
pub enum StatementOutcome {
    Planned(PhysicalPlan),
    SetVariable { name: String, value: i64 },
}

pub struct Engine {
    catalog: Arc<dyn Catalog>,
    planner: Planner,
    hook: Option<Arc<PlanHook>>,
}

impl Engine {
    pub fn new(catalog: Arc<dyn Catalog>, cost_model: Arc<dyn CostModel>) -> Self {
        let planner = Planner::new(catalog.clone(), cost_model);
        Self {
            catalog,
            planner,
            hook: None,
        }
    }

    /// Register the plan hook invoked for advisor-enabled SELECTs.
    pub fn set_plan_hook(&mut self, hook: Arc<PlanHook>) {
        self.hook = Some(hook);
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn new_session(&self, conn_id: u64, db: impl Into<String>) -> EngineSession {
        EngineSession {
            conn_id,
            current_db: db.into(),
            enable_index_advisor: false,
        }
    }

    /// Execute one statement on a session: either a session-variable SET or a
    /// SELECT planned against the current schema snapshot.
    pub fn execute(
        &self,
        session: &mut EngineSession,
        sql: &str,
    ) -> Result<StatementOutcome, PlanError> {
        if let Some((name, value)) = parse_set_variable(sql) {
            if name != ENABLE_INDEX_ADVISOR {
                return Err(PlanError::Unsupported(format!("unknown variable {name}")));
            }
            session.enable_index_advisor = value != 0;
            return Ok(StatementOutcome::SetVariable { name, value });
        }

        let schema = self.catalog.schema();
        let logical = build_logical_plan(sql, &session.current_db, &schema)?;

        if session.enable_index_advisor {
            if let Some(hook) = &self.hook {
                let ctx = HookContext {
                    conn_id: session.conn_id,
                    db: &session.current_db,
                    sql,
                    logical: &logical,
                    schema: &schema,
                    planner: &self.planner,
                };
                return hook(&ctx).map(StatementOutcome::Planned);
            }
            warn!(conn_id = session.conn_id, "index advisor enabled but no hook registered");
        }

        self.planner
            .optimize(&logical, &session.current_db, &schema)
            .map(StatementOutcome::Planned)
    }
}

/// Parse `SET <name> = <value>` with an integer value. Returns `None` for
/// anything that is not a SET statement.
fn parse_set_variable(sql: &str) -> Option<(String, i64)> {
    let trimmed = sql.trim().trim_end_matches(';');
    let rest = trimmed
        .get(..4)
        .filter(|p| p.eq_ignore_ascii_case("set "))
        .map(|_| &trimmed[4..])?;
    let (name, value) = rest.split_once('=')?;
    let value = value.trim().parse::<i64>().ok()?;
    Some((name.trim().to_lowercase(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemCatalog;
    use crate::cost::DefaultCostModel;
    use crate::schema::TableInfo;
    use crate::stats::Statistics;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine() -> Engine {
        let catalog = Arc::new(MemCatalog::new());
        catalog.add_table(
            "test",
            TableInfo::new("t", &["a", "b"]),
            Statistics::new(10.0),
        );
        Engine::new(catalog, Arc::new(DefaultCostModel::default()))
    }

    #[test]
    fn test_parse_set_variable() {
        assert_eq!(
            parse_set_variable("SET tidb_enable_index_advisor = 1"),
            Some(("tidb_enable_index_advisor".to_string(), 1))
        );
        assert_eq!(
            parse_set_variable("set tidb_enable_index_advisor=0;"),
            Some(("tidb_enable_index_advisor".to_string(), 0))
        );
        assert_eq!(parse_set_variable("select 1"), None);
    }

    #[test]
    fn test_set_variable_toggles_session() {
        let engine = engine();
        let mut session = engine.new_session(1, "test");
        assert!(!session.enable_index_advisor);
        engine
            .execute(&mut session, "set tidb_enable_index_advisor = 1")
            .unwrap();
        assert!(session.enable_index_advisor);
    }

    #[test]
    fn test_hook_fires_only_when_enabled() {
        let mut engine = engine();
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        engine.set_plan_hook(Arc::new(|ctx: &HookContext<'_>| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            ctx.planner.optimize(ctx.logical, ctx.db, ctx.schema)
        }));

        let mut session = engine.new_session(7, "test");
        engine.execute(&mut session, "select a from t").unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);

        engine
            .execute(&mut session, "set tidb_enable_index_advisor = 1")
            .unwrap();
        engine.execute(&mut session, "select a from t").unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }
}
