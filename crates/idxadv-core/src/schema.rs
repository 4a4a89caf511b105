//! # Schema Metadata
//!
//! This module defines the catalog metadata tree the planner reads: databases,
//! tables, columns and indexes. An `InfoSchema` is an immutable snapshot of the
//! whole tree at a schema version. The advisor layers *virtual* indexes over a
//! deep copy of this snapshot, so every type here is `Clone` and the clone is
//! cheap (names and small vectors only).
//!
//! ## Primary keys
//!
//! An integer primary key is modeled as an index entry with `primary = true`.
//! Its access path is clustered: matching rows are read at full row width with
//! no double read. Secondary indexes store their declared columns plus the row
//! handle, which is what the cost model charges for.

use crate::ident::Ident;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel for "no prefix length" on an index column.
pub const NO_PREFIX: i64 = -1;

/// One column of an index, with an optional prefix length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexColumn {
    pub name: Ident,
    /// Prefix length in bytes, or `NO_PREFIX` when the whole value is indexed.
    pub prefix_len: i64,
}

impl IndexColumn {
    pub fn new(name: impl Into<Ident>) -> Self {
        Self {
            name: name.into(),
            prefix_len: NO_PREFIX,
        }
    }
}

/// Visibility state of an index. Only `Public` indexes are considered by the
/// planner; the advisor marks its virtual indexes `Public` so the optimizer
/// treats them exactly like real ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    Public,
    Invisible,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: Ident,
    pub columns: Vec<IndexColumn>,
    pub primary: bool,
    pub state: IndexState,
}

impl IndexInfo {
    pub fn new(name: impl Into<Ident>, columns: Vec<IndexColumn>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary: false,
            state: IndexState::Public,
        }
    }

    /// Lowered column names in index order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.lowered.as_str()).collect()
    }

    /// Positional equality of column-name sequences.
    pub fn same_columns(&self, names: &[&str]) -> bool {
        self.column_names() == names
    }
}

impl fmt::Display for IndexInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<&str> = self.columns.iter().map(|c| c.name.original.as_str()).collect();
        write!(f, "{}({})", self.name, cols.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: Ident,
    /// Position of the column in the table definition.
    pub offset: usize,
}

impl ColumnInfo {
    pub fn new(name: impl Into<Ident>, offset: usize) -> Self {
        Self {
            name: name.into(),
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: Ident,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
}

impl TableInfo {
    pub fn new(name: impl Into<Ident>, column_names: &[&str]) -> Self {
        let columns = column_names
            .iter()
            .enumerate()
            .map(|(i, c)| ColumnInfo::new(*c, i))
            .collect();
        Self {
            name: name.into(),
            columns,
            indexes: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, column: &str) -> Self {
        let mut idx = IndexInfo::new("PRIMARY", vec![IndexColumn::new(column)]);
        idx.primary = true;
        self.indexes.push(idx);
        self
    }

    pub fn with_index(mut self, name: &str, columns: &[&str]) -> Self {
        let cols = columns.iter().map(|c| IndexColumn::new(*c)).collect();
        self.indexes.push(IndexInfo::new(name, cols));
        self
    }

    pub fn column_by_name(&self, lowered: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name.lowered == lowered)
    }

    pub fn primary_index(&self) -> Option<&IndexInfo> {
        self.indexes.iter().find(|i| i.primary)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbInfo {
    pub name: Ident,
    pub tables: Vec<TableInfo>,
}

/// An immutable snapshot of the full catalog tree.
///
/// The version number identifies the snapshot; downstream caches key on it.
/// The advisor's shadow schema preserves the version of the snapshot it was
/// built from, so virtuality alone never invalidates those caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoSchema {
    pub version: i64,
    pub dbs: Vec<DbInfo>,
}

impl InfoSchema {
    pub fn new(version: i64) -> Self {
        Self {
            version,
            dbs: Vec::new(),
        }
    }

    pub fn add_table(&mut self, db: &str, table: TableInfo) {
        let db_lowered = db.to_lowercase();
        match self.dbs.iter_mut().find(|d| d.name.lowered == db_lowered) {
            Some(d) => d.tables.push(table),
            None => self.dbs.push(DbInfo {
                name: Ident::new(db),
                tables: vec![table],
            }),
        }
    }

    pub fn db_by_name(&self, db: &str) -> Option<&DbInfo> {
        let lowered = db.to_lowercase();
        self.dbs.iter().find(|d| d.name.lowered == lowered)
    }

    pub fn table_by_name(&self, db: &str, table: &str) -> Option<&TableInfo> {
        let lowered = table.to_lowercase();
        self.db_by_name(db)?
            .tables
            .iter()
            .find(|t| t.name.lowered == lowered)
    }

    pub fn table_by_name_mut(&mut self, db: &str, table: &str) -> Option<&mut TableInfo> {
        let db_lowered = db.to_lowercase();
        let lowered = table.to_lowercase();
        self.dbs
            .iter_mut()
            .find(|d| d.name.lowered == db_lowered)?
            .tables
            .iter_mut()
            .find(|t| t.name.lowered == lowered)
    }
}
