//! # Shadow Schema
//!
//! Builds the schema view the optimizer re-plans against: a deep copy of the
//! live `InfoSchema` in which each referenced table's index list is extended
//! by its virtual indexes. Everything else -- column order, statistics
//! handles, the schema version -- is carried over verbatim, so downstream
//! caching keyed on the version is not invalidated by mere virtuality.
//!
//! Virtual indexes are named `vIndex{i}`, unique within their table, and
//! marked public so the optimizer treats them exactly like real indexes.

use crate::error::AdvisorError;
use idxadv_core::ident::Ident;
use idxadv_core::schema::{IndexColumn, IndexInfo, IndexState, InfoSchema};
use std::collections::BTreeMap;
use tracing::debug;

/// Layer virtual indexes over a deep copy of `schema`. `table_candidates`
/// maps lowered table names to candidate column-lists. A candidate whose
/// column sequence equals an index already on the table is skipped.
pub fn virtual_schema(
    schema: &InfoSchema,
    db: &str,
    table_candidates: &BTreeMap<String, Vec<Vec<Ident>>>,
) -> Result<InfoSchema, AdvisorError> {
    let mut shadow = schema.clone();

    for (table_name, col_lists) in table_candidates {
        let table = shadow
            .table_by_name_mut(db, table_name)
            .ok_or_else(|| AdvisorError::SchemaMismatch(table_name.clone()))?;

        let mut next_id = 0usize;
        for cols in col_lists {
            let names: Vec<&str> = cols.iter().map(|c| c.lowered.as_str()).collect();
            if table.indexes.iter().any(|idx| idx.same_columns(&names)) {
                continue;
            }
            let index = IndexInfo {
                name: Ident::new(format!("vIndex{next_id}")),
                columns: cols.iter().map(|c| IndexColumn::new(c.clone())).collect(),
                primary: false,
                state: IndexState::Public,
            };
            table.indexes.push(index);
            next_id += 1;
        }
        debug!(
            table = %table_name,
            virtual_indexes = next_id,
            "extended shadow table"
        );
    }

    Ok(shadow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use idxadv_core::schema::TableInfo;

    fn candidates(lists: &[&[&str]]) -> Vec<Vec<Ident>> {
        lists
            .iter()
            .map(|l| l.iter().map(|c| Ident::new(*c)).collect())
            .collect()
    }

    fn schema_with_t() -> InfoSchema {
        let mut is = InfoSchema::new(42);
        is.add_table(
            "test",
            TableInfo::new("t", &["a", "b", "c"]).with_primary_key("a"),
        );
        is
    }

    #[test]
    fn test_virtual_indexes_are_appended_and_named() {
        let live = schema_with_t();
        let mut map = BTreeMap::new();
        map.insert("t".to_string(), candidates(&[&["b"], &["b", "c"]]));

        let shadow = virtual_schema(&live, "test", &map).unwrap();
        let table = shadow.table_by_name("test", "t").unwrap();
        // primary + two virtuals
        assert_eq!(table.indexes.len(), 3);
        assert_eq!(table.indexes[1].name.original, "vIndex0");
        assert_eq!(table.indexes[2].name.original, "vIndex1");
        assert_eq!(table.indexes[2].column_names(), vec!["b", "c"]);
        assert_eq!(table.indexes[1].state, IndexState::Public);
    }

    #[test]
    fn test_live_schema_is_untouched() {
        let live = schema_with_t();
        let before = format!("{live:?}");
        let mut map = BTreeMap::new();
        map.insert("t".to_string(), candidates(&[&["b"]]));

        let _shadow = virtual_schema(&live, "test", &map).unwrap();
        assert_eq!(format!("{live:?}"), before);
    }

    #[test]
    fn test_version_is_preserved() {
        let live = schema_with_t();
        let mut map = BTreeMap::new();
        map.insert("t".to_string(), candidates(&[&["b"]]));
        let shadow = virtual_schema(&live, "test", &map).unwrap();
        assert_eq!(shadow.version, live.version);
    }

    #[test]
    fn test_existing_column_sequence_is_skipped() {
        let live = schema_with_t();
        let mut map = BTreeMap::new();
        map.insert("t".to_string(), candidates(&[&["a"], &["b"]]));
        let shadow = virtual_schema(&live, "test", &map).unwrap();
        let table = shadow.table_by_name("test", "t").unwrap();
        // (a) equals the primary key's columns and is skipped.
        assert_eq!(table.indexes.len(), 2);
        assert_eq!(table.indexes[1].column_names(), vec!["b"]);
    }

    #[test]
    fn test_missing_table_is_a_schema_mismatch() {
        let live = schema_with_t();
        let mut map = BTreeMap::new();
        map.insert("missing".to_string(), candidates(&[&["x"]]));
        let err = virtual_schema(&live, "test", &map).unwrap_err();
        assert!(matches!(err, AdvisorError::SchemaMismatch(_)));
    }
}
