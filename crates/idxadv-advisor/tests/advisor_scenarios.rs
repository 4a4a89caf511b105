//! End-to-end advisor scenarios.
//!
//! Each test drives SELECT workloads through an engine with the advisor hook
//! installed, against `t(a int pk, b, c, d, e, ts)` with a statistics
//! snapshot loaded from testdata and `t1(a, b, c, d)` with analyze-style
//! statistics over 15 rows. Assertions cover the recommended candidate sets,
//! the benefit-driven parts of the ranking, the output streams, and the
//! universal properties: determinism, idempotence under duplication, the
//! existence filter, positive benefit and shadow isolation.

use idxadv_advisor::error::AdvisorError;
use idxadv_advisor::hook;
use idxadv_advisor::report::ReportSink;
use idxadv_advisor::session::{AdvisorRegistry, AdvisorSession, CandidateIdx};
use idxadv_core::catalog::{Catalog, MemCatalog};
use idxadv_core::cost::DefaultCostModel;
use idxadv_core::engine::{Engine, EngineSession};
use idxadv_core::schema::TableInfo;
use idxadv_core::stats::{ColumnStatistics, Statistics};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CONN_ID: u64 = 7;

const Q_GROUP_BY_E: &str = "select count(*) from t group by e";
const Q_IN_FILTER: &str = "select a, b from t1 where c in (1,3)";
const Q_GROUP_BY_CD: &str = "select c, d, count(*) from t1 group by c, d";
const Q_SEMI_JOIN: &str = "select * from t where b in (select c from t1 where c>0)";
const Q_ORDER_DESC: &str = "select a from t1 order by b desc";
const Q_JOIN: &str = "select t.a from t join t1 on t.b = t1.b";

struct Harness {
    engine: Engine,
    registry: Arc<AdvisorRegistry>,
    session: EngineSession,
    _out: tempfile::TempDir,
    out_dir: PathBuf,
}

fn testdata(file: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/testdata")
        .join(file)
}

/// A harness whose session variable was never set: the advisor session
/// stays unready.
fn harness_without_ready() -> Harness {
    let out = tempfile::tempdir().unwrap();
    let out_dir = out.path().to_path_buf();

    let catalog = Arc::new(MemCatalog::new());
    catalog.add_table(
        "test",
        TableInfo::new("t", &["a", "b", "c", "d", "e", "ts"]).with_primary_key("a"),
        Statistics::new(1.0),
    );
    catalog
        .load_stats_file("test", &testdata("t_stats.json"))
        .unwrap();
    catalog.add_table(
        "test",
        TableInfo::new("t1", &["a", "b", "c", "d"]),
        Statistics::new(15.0)
            .with_column("a", ColumnStatistics::new(15.0))
            .with_column("b", ColumnStatistics::new(15.0))
            .with_column("c", ColumnStatistics::new(15.0))
            .with_column("d", ColumnStatistics::new(15.0)),
    );

    let registry = Arc::new(AdvisorRegistry::new());
    registry.prepare(AdvisorSession::new(ReportSink::new(&out_dir).unwrap()));

    let mut engine = Engine::new(catalog, Arc::new(DefaultCostModel::default()));
    hook::install(&mut engine, registry.clone());

    let session = engine.new_session(CONN_ID, "test");
    Harness {
        engine,
        registry,
        session,
        _out: out,
        out_dir,
    }
}

fn harness() -> Harness {
    let mut h = harness_without_ready();
    h.engine
        .execute(&mut h.session, "set tidb_enable_index_advisor = 1")
        .unwrap();
    h.registry.mark_ready(&CONN_ID.to_string()).unwrap();
    h
}

impl Harness {
    fn run(&mut self, statements: &[&str]) {
        for sql in statements {
            self.engine.execute(&mut self.session, sql).unwrap();
        }
    }

    fn recommend(&self) -> String {
        self.registry
            .session(&CONN_ID.to_string())
            .map(|s| s.lock().unwrap().recommend_string())
            .unwrap_or_default()
    }

    fn snapshot(&self) -> Vec<CandidateIdx> {
        self.registry
            .session(&CONN_ID.to_string())
            .map(|s| s.lock().unwrap().snapshot())
            .unwrap_or_default()
    }

    fn candidate_set(&self) -> Vec<String> {
        let mut set: Vec<String> = self
            .snapshot()
            .iter()
            .map(|c| {
                format!(
                    "{}: ({})",
                    c.index.table.lowered,
                    c.index
                        .index
                        .columns
                        .iter()
                        .map(|col| col.name.lowered.clone())
                        .collect::<Vec<_>>()
                        .join(" ")
                )
            })
            .collect();
        set.sort();
        set
    }

    fn benefit_of(&self, table: &str, cols: &[&str]) -> f64 {
        self.snapshot()
            .iter()
            .find(|c| {
                c.index.table.lowered == table && c.index.index.column_names() == cols
            })
            .map(|c| c.benefit)
            .unwrap_or_else(|| panic!("no candidate {table}: {cols:?}"))
    }

    fn finalize(&self) {
        self.registry.finalize_all().unwrap();
    }
}

#[test]
fn test_group_by_recommends_group_column() {
    let mut h = harness();
    h.run(&[Q_GROUP_BY_E]);
    assert_eq!(h.recommend(), "t: (e)");
}

#[test]
fn test_covering_filter_is_added_and_ranked_below() {
    let mut h = harness();
    h.run(&[Q_GROUP_BY_E, Q_IN_FILTER]);
    assert_eq!(h.recommend(), "t: (e),t1: (c a b)");
}

#[test]
fn test_subquery_and_second_group_by_extend_the_set() {
    let mut h = harness();
    h.run(&[Q_GROUP_BY_E, Q_IN_FILTER, Q_GROUP_BY_CD, Q_SEMI_JOIN]);

    assert_eq!(
        h.candidate_set(),
        vec![
            "t: (b)".to_string(),
            "t: (e)".to_string(),
            "t1: (c a b)".to_string(),
            "t1: (c d)".to_string(),
            "t1: (c)".to_string(),
        ]
    );

    let ranked = h.snapshot();
    assert_eq!(ranked[0].index.table.lowered, "t");
    assert_eq!(ranked[0].index.column_names(), vec!["e"]);

    // Both indexes chosen by the semi-join statement share its benefit.
    assert_eq!(h.benefit_of("t", &["b"]), h.benefit_of("t1", &["c"]));
    // The covering filter saves more than the two-column group by.
    assert!(h.benefit_of("t1", &["c", "a", "b"]) > h.benefit_of("t1", &["c", "d"]));
    // Every reported candidate carries positive benefit.
    assert!(ranked.iter().all(|c| c.benefit > 0.0));
}

#[test]
fn test_order_by_and_join_extend_the_set() {
    let mut h = harness();
    h.run(&[
        Q_GROUP_BY_E,
        Q_IN_FILTER,
        Q_GROUP_BY_CD,
        Q_SEMI_JOIN,
        Q_ORDER_DESC,
        Q_JOIN,
    ]);

    assert_eq!(
        h.candidate_set(),
        vec![
            "t: (a b)".to_string(),
            "t: (b)".to_string(),
            "t: (e)".to_string(),
            "t1: (b a)".to_string(),
            "t1: (b)".to_string(),
            "t1: (c a b)".to_string(),
            "t1: (c d)".to_string(),
            "t1: (c)".to_string(),
        ]
    );

    // The group-by recommendation keeps the top rank.
    let ranked = h.snapshot();
    assert_eq!(ranked[0].index.column_names(), vec!["e"]);
    assert_eq!(ranked[0].index.table.lowered, "t");

    // Both sides of the join statement share its benefit.
    assert_eq!(h.benefit_of("t", &["a", "b"]), h.benefit_of("t1", &["b"]));
    assert!(ranked.iter().all(|c| c.benefit > 0.0));
}

#[test]
fn test_primary_key_lookup_yields_no_candidates() {
    let mut h = harness();
    h.run(&["select * from t where a = 1"]);
    assert_eq!(h.recommend(), "");
    h.finalize();
    let result =
        std::fs::read_to_string(h.out_dir.join(format!("{CONN_ID}_RESULT"))).unwrap();
    assert_eq!(result, "");
}

#[test]
fn test_no_candidate_matches_an_existing_index() {
    let mut h = harness();
    h.run(&[
        Q_GROUP_BY_E,
        Q_IN_FILTER,
        Q_GROUP_BY_CD,
        Q_SEMI_JOIN,
        Q_ORDER_DESC,
        Q_JOIN,
        "select * from t where a = 1",
    ]);
    let live = h.engine.catalog().schema();
    for candidate in h.snapshot() {
        let table = live
            .table_by_name("test", &candidate.index.table.lowered)
            .unwrap();
        let names = candidate.index.index.column_names();
        assert!(
            !table.indexes.iter().any(|idx| idx.same_columns(&names)),
            "candidate {names:?} equals a real index"
        );
    }
}

#[test]
fn test_duplicate_statement_doubles_benefit() {
    let mut single = harness();
    single.run(&[Q_GROUP_BY_E]);
    let once = single.benefit_of("t", &["e"]);

    let mut twice = harness();
    twice.run(&[Q_GROUP_BY_E, Q_GROUP_BY_E]);
    let doubled = twice.benefit_of("t", &["e"]);

    assert!(once > 0.0);
    assert_eq!(doubled, once * 2.0);
    assert_eq!(single.recommend(), twice.recommend());
}

#[test]
fn test_ranked_result_is_deterministic_across_runs() {
    let workload = [Q_GROUP_BY_E, Q_IN_FILTER, Q_GROUP_BY_CD, Q_SEMI_JOIN];

    let mut first = harness();
    first.run(&workload);
    first.finalize();
    let first_result =
        std::fs::read_to_string(first.out_dir.join(format!("{CONN_ID}_RESULT"))).unwrap();

    let mut second = harness();
    second.run(&workload);
    second.finalize();
    let second_result =
        std::fs::read_to_string(second.out_dir.join(format!("{CONN_ID}_RESULT"))).unwrap();

    assert!(!first_result.is_empty());
    assert_eq!(first_result, second_result);
}

#[test]
fn test_live_schema_is_isolated_from_the_workload() {
    let mut h = harness();
    let before = format!("{:?}", h.engine.catalog().schema());
    h.run(&[Q_GROUP_BY_E, Q_IN_FILTER, Q_SEMI_JOIN, Q_JOIN]);
    let after = format!("{:?}", h.engine.catalog().schema());
    assert_eq!(before, after);
}

#[test]
fn test_per_query_streams_are_appended() {
    let mut h = harness();
    h.run(&[Q_GROUP_BY_E, Q_IN_FILTER]);

    let ocost =
        std::fs::read_to_string(h.out_dir.join(format!("{CONN_ID}_OCOST"))).unwrap();
    let ovcost =
        std::fs::read_to_string(h.out_dir.join(format!("{CONN_ID}_OVCOST"))).unwrap();
    let oindex =
        std::fs::read_to_string(h.out_dir.join(format!("{CONN_ID}_OINDEX"))).unwrap();
    let origin =
        std::fs::read_to_string(h.out_dir.join(format!("{CONN_ID}_ORIGIN"))).unwrap();

    assert_eq!(ocost.lines().count(), 2);
    assert_eq!(ovcost.lines().count(), 2);
    assert_eq!(oindex.lines().count(), 2);
    assert_eq!(origin.lines().count(), 2);

    // Fixed-width query counter prefix, then the cost.
    let first = ocost.lines().next().unwrap();
    assert!(first.starts_with("1         "));
    // The chosen index stream carries the group column of statement one.
    assert!(oindex.lines().next().unwrap().contains("{(e) }"));
    // The summary stream repeats both costs with four-space separators.
    assert!(origin.lines().next().unwrap().contains("    "));
}

#[test]
fn test_workload_without_ready_session_is_an_error() {
    let workload_dir = tempfile::tempdir().unwrap();
    std::fs::write(workload_dir.path().join("1.sql"), Q_GROUP_BY_E).unwrap();

    let mut h = harness_without_ready();
    let err = idxadv_advisor::workload::run_workload(
        &h.engine,
        &mut h.session,
        workload_dir.path().to_path_buf(),
        &h.registry,
    )
    .unwrap_err();
    assert!(matches!(err, AdvisorError::SessionVar(_)), "got {err}");

    // Nothing was driven, so no per-query records exist.
    assert!(!h.out_dir.join(format!("{CONN_ID}_OCOST")).exists());
}

#[test]
fn test_workload_directory_drives_and_finalizes() {
    let workload_dir = tempfile::tempdir().unwrap();
    std::fs::write(workload_dir.path().join("1.sql"), Q_GROUP_BY_E).unwrap();
    std::fs::write(
        workload_dir.path().join("2.sql"),
        format!("{Q_IN_FILTER}\n"),
    )
    .unwrap();
    // An unparsable statement is skipped without recording.
    std::fs::write(workload_dir.path().join("3.sql"), "select from nowhere").unwrap();

    let mut h = harness();
    let count = idxadv_advisor::workload::run_workload(
        &h.engine,
        &mut h.session,
        workload_dir.path().to_path_buf(),
        &h.registry,
    )
    .unwrap();
    assert_eq!(count, 3);

    // The queue closed, the session finalized, the ranked result is there.
    let result =
        std::fs::read_to_string(h.out_dir.join(format!("{CONN_ID}_RESULT"))).unwrap();
    assert!(result.starts_with("t: (e)    "));
    // Only the two valid statements produced per-query records.
    let ocost =
        std::fs::read_to_string(h.out_dir.join(format!("{CONN_ID}_OCOST"))).unwrap();
    assert_eq!(ocost.lines().count(), 2);
}

#[test]
fn test_finalize_rewrites_ranked_result() {
    let mut h = harness();
    h.run(&[Q_GROUP_BY_E, Q_IN_FILTER]);
    h.finalize();
    let result =
        std::fs::read_to_string(h.out_dir.join(format!("{CONN_ID}_RESULT"))).unwrap();
    let lines: Vec<&str> = result.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("t: (e)    "));
    assert!(lines[1].starts_with("t1: (c,a,b)    "));
}
