//! # Catalog
//!
//! The catalog hands the planner two things: the current `InfoSchema`
//! snapshot and per-table statistics. It is behind a trait object so tests
//! and embedders can provide their own backing; `MemCatalog` is the in-memory
//! implementation used throughout.
//!
//! Statistics are keyed independently of the schema snapshot. That split is
//! what lets the advisor re-plan against a *shadow* schema while reusing the
//! very same statistics handles, so a virtual index is costed with the
//! statistics a real one would see.

use crate::schema::{InfoSchema, TableInfo};
use crate::stats::{load_stats_json, Statistics};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Catalog provides schema and statistics information.
pub trait Catalog: Send + Sync {
    fn schema(&self) -> Arc<InfoSchema>;
    fn table_stats(&self, db: &str, table: &str) -> Option<Statistics>;
}

/// In-memory catalog. Tables and statistics are keyed by `db.table`
/// (lowered); the schema snapshot is rebuilt on mutation.
pub struct MemCatalog {
    inner: RwLock<MemCatalogInner>,
}

struct MemCatalogInner {
    schema: Arc<InfoSchema>,
    stats: HashMap<String, Statistics>,
}

impl MemCatalog {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemCatalogInner {
                schema: Arc::new(InfoSchema::new(1)),
                stats: HashMap::new(),
            }),
        }
    }

    fn key(db: &str, table: &str) -> String {
        format!("{}.{}", db.to_lowercase(), table.to_lowercase())
    }

    pub fn add_table(&self, db: &str, table: TableInfo, stats: Statistics) {
        let mut inner = self.inner.write().expect("catalog lock poisoned");
        let key = Self::key(db, &table.name.lowered);
        let mut schema = (*inner.schema).clone();
        schema.add_table(db, table);
        inner.schema = Arc::new(schema);
        inner.stats.insert(key, stats);
    }

    /// Replace the statistics of an existing table (ANALYZE equivalent).
    pub fn set_stats(&self, db: &str, table: &str, stats: Statistics) {
        let mut inner = self.inner.write().expect("catalog lock poisoned");
        inner.stats.insert(Self::key(db, table), stats);
    }

    /// Load a statistics snapshot for one table from a JSON file.
    pub fn load_stats_file(&self, db: &str, path: &Path) -> std::io::Result<()> {
        let (table, stats) = load_stats_json(path)?;
        self.set_stats(db, &table, stats);
        Ok(())
    }
}

impl Default for MemCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog for MemCatalog {
    fn schema(&self) -> Arc<InfoSchema> {
        self.inner.read().expect("catalog lock poisoned").schema.clone()
    }

    fn table_stats(&self, db: &str, table: &str) -> Option<Statistics> {
        self.inner
            .read()
            .expect("catalog lock poisoned")
            .stats
            .get(&Self::key(db, table))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::ColumnStatistics;

    #[test]
    fn test_add_table_and_stats_lookup() {
        let catalog = MemCatalog::new();
        catalog.add_table(
            "test",
            TableInfo::new("T1", &["a", "b"]),
            Statistics::new(15.0).with_column("a", ColumnStatistics::new(15.0)),
        );
        assert!(catalog.schema().table_by_name("test", "t1").is_some());
        let stats = catalog.table_stats("TEST", "t1").unwrap();
        assert_eq!(stats.row_count, 15.0);
    }
}
