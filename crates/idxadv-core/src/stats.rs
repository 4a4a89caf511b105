//! # Statistics for Cost-Based Planning
//!
//! Table and column statistics drive every cost decision the planner makes,
//! including whether a virtual index beats the access paths that already
//! exist. Virtual indexes carry no statistics of their own: an index path's
//! selectivity and row width are inferred from the statistics of the columns
//! it covers, so a synthetic index is costed with exactly the information a
//! real one would have.
//!
//! ## Selectivity heuristics
//!
//! - **Equality** (`col = value`): `1 / NDV`, assuming uniform distribution.
//! - **IN list** (`col IN (v1..vk)`): `k / NDV`, capped at 1.
//! - **Range** (`>`, `<`, `>=`, `<=`): fixed 1/3.
//! - **AND**: product of member selectivities (independence assumption).
//! - **OR**: inclusion-exclusion over member selectivities.
//! - **Unknown**: 0.1.
//!
//! ## Fixture loading
//!
//! Statistics snapshots can be loaded from JSON files; workloads are evaluated
//! against a fixed snapshot so that runs are reproducible.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Default selectivity when nothing better is known.
pub const DEFAULT_SELECTIVITY: f64 = 0.1;

/// Selectivity of a range predicate.
pub const RANGE_SELECTIVITY: f64 = 1.0 / 3.0;

/// Row width assumed for a column without statistics, in bytes.
pub const DEFAULT_COL_SIZE: f64 = 8.0;

/// Statistics for a relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub row_count: f64,
    pub column_stats: HashMap<String, ColumnStatistics>,
}

impl Statistics {
    pub fn new(row_count: f64) -> Self {
        Self {
            row_count,
            column_stats: HashMap::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, stats: ColumnStatistics) -> Self {
        self.column_stats.insert(name.into().to_lowercase(), stats);
        self
    }

    pub fn column(&self, lowered: &str) -> Option<&ColumnStatistics> {
        self.column_stats.get(lowered)
    }

    /// NDV of a column, defaulting to the row count (all-distinct) when the
    /// column has no statistics.
    pub fn ndv(&self, lowered: &str) -> f64 {
        self.column(lowered)
            .map(|c| c.distinct_count)
            .unwrap_or(self.row_count)
            .max(1.0)
    }

    /// Average value size of a column in bytes.
    pub fn col_size(&self, lowered: &str) -> f64 {
        self.column(lowered)
            .map(|c| c.avg_size)
            .unwrap_or(DEFAULT_COL_SIZE)
    }
}

/// Per-column statistics, typically gathered by ANALYZE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Number of distinct values. Equality selectivity is `1 / NDV`.
    pub distinct_count: f64,
    /// Fraction of rows that are NULL, in [0, 1].
    pub null_fraction: f64,
    /// Average size of a value in bytes.
    pub avg_size: f64,
    /// Optional equi-depth histogram for range estimation.
    pub histogram: Option<Histogram>,
}

impl ColumnStatistics {
    pub fn new(distinct_count: f64) -> Self {
        Self {
            distinct_count,
            null_fraction: 0.0,
            avg_size: DEFAULT_COL_SIZE,
            histogram: None,
        }
    }

    pub fn with_avg_size(mut self, avg_size: f64) -> Self {
        self.avg_size = avg_size;
        self
    }
}

/// Equi-depth histogram. Each bucket holds roughly the same number of rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Histogram {
    pub buckets: Vec<HistogramBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub lower: f64,
    pub upper: f64,
    pub count: f64,
    pub distinct: f64,
}

/// Selectivity of `col = const`.
pub fn equality_selectivity(stats: &Statistics, col: &str) -> f64 {
    match stats.column(col) {
        Some(cs) => 1.0 / cs.distinct_count.max(1.0),
        None => DEFAULT_SELECTIVITY,
    }
}

/// Selectivity of `col IN (v1..vk)`.
pub fn in_list_selectivity(stats: &Statistics, col: &str, k: usize) -> f64 {
    (k as f64 * equality_selectivity(stats, col)).min(1.0)
}

/// On-disk form of a statistics snapshot for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStatsFile {
    pub table: String,
    pub row_count: f64,
    #[serde(default)]
    pub columns: HashMap<String, ColumnStatsEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStatsEntry {
    pub distinct_count: f64,
    #[serde(default)]
    pub null_fraction: f64,
    #[serde(default = "default_avg_size")]
    pub avg_size: f64,
}

fn default_avg_size() -> f64 {
    DEFAULT_COL_SIZE
}

/// Load a statistics snapshot from a JSON file, returning the table name it
/// applies to and the decoded statistics.
pub fn load_stats_json(path: &Path) -> std::io::Result<(String, Statistics)> {
    let bytes = std::fs::read(path)?;
    let file: TableStatsFile = serde_json::from_slice(&bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut stats = Statistics::new(file.row_count);
    for (name, entry) in file.columns {
        stats.column_stats.insert(
            name.to_lowercase(),
            ColumnStatistics {
                distinct_count: entry.distinct_count,
                null_fraction: entry.null_fraction,
                avg_size: entry.avg_size,
                histogram: None,
            },
        );
    }
    Ok((file.table, stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Statistics {
        Statistics::new(100.0)
            .with_column("a", ColumnStatistics::new(100.0))
            .with_column("b", ColumnStatistics::new(10.0))
    }

    #[test]
    fn test_equality_selectivity_uses_ndv() {
        let s = sample();
        assert_eq!(equality_selectivity(&s, "a"), 0.01);
        assert_eq!(equality_selectivity(&s, "b"), 0.1);
        assert_eq!(equality_selectivity(&s, "missing"), DEFAULT_SELECTIVITY);
    }

    #[test]
    fn test_in_list_selectivity_caps_at_one() {
        let s = sample();
        assert_eq!(in_list_selectivity(&s, "b", 3), 0.3);
        assert_eq!(in_list_selectivity(&s, "b", 100), 1.0);
    }

    #[test]
    fn test_load_stats_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        std::fs::write(
            &path,
            r#"{
                "table": "t",
                "row_count": 32,
                "columns": {
                    "E": { "distinct_count": 4 },
                    "c": { "distinct_count": 16, "avg_size": 24 }
                }
            }"#,
        )
        .unwrap();
        let (table, stats) = load_stats_json(&path).unwrap();
        assert_eq!(table, "t");
        assert_eq!(stats.row_count, 32.0);
        assert_eq!(stats.ndv("e"), 4.0);
        assert_eq!(stats.col_size("c"), 24.0);
    }
}
