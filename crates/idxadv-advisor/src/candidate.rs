//! # Candidate-Column Classification and Virtual-Index Enumeration
//!
//! From a `QueryExprInfo`, every referenced column is classified by the role
//! it plays in the statement, per owning table:
//!
//! - `eq`: equality and IN predicates
//! - `rg`: range predicates (`>`, `<`, `!=`, `>=`, `<=`)
//! - `o`:  order-sensitive groups (GROUP BY, sort keys, join keys), one
//!   inner sequence per clause, order preserved
//! - `refs`: projection references
//!
//! The enumeration then produces candidate index column-lists: every single
//! column, every ordered pair, and two composite templates per order group
//! (equality-first and order-first). The explosion is intentional: the
//! optimizer, not the generator, decides which candidates are useful.

use crate::extract::QueryExprInfo;
use idxadv_core::expr::{Expr, FuncName};
use idxadv_core::ident::Ident;
use idxadv_core::schema::TableInfo;
use std::collections::BTreeMap;

/// Per-table column-role sets feeding composite enumeration.
#[derive(Debug, Clone, Default)]
pub struct TableInfoSets {
    pub eq: Vec<Ident>,
    pub o: Vec<Vec<Ident>>,
    pub rg: Vec<Ident>,
    pub refs: Vec<Ident>,
}

impl TableInfoSets {
    pub fn is_empty(&self) -> bool {
        self.eq.is_empty() && self.o.is_empty() && self.rg.is_empty() && self.refs.is_empty()
    }
}

/// Classify a statement's extracted columns into per-table role sets, keyed
/// by lowered table name. Columns without an origin table are ignored.
pub fn build_table_info_sets(info: &QueryExprInfo) -> BTreeMap<String, TableInfoSets> {
    let mut map: BTreeMap<String, TableInfoSets> = BTreeMap::new();
    for ds in &info.data_sources {
        map.entry(ds.table.lowered.clone()).or_default();
    }

    // eq / rg from the flattened scalar predicates.
    for func in &info.scalar_funcs {
        let is_eq = matches!(func.name, FuncName::Eq | FuncName::In);
        let is_rg = matches!(
            func.name,
            FuncName::Gt | FuncName::Lt | FuncName::Ne | FuncName::Ge | FuncName::Le
        );
        if !is_eq && !is_rg {
            continue;
        }
        for arg in &func.args {
            let Expr::Column(col) = arg else { continue };
            if !col.has_origin() {
                continue;
            }
            if let Some(sets) = map.get_mut(&col.table.lowered) {
                let target = if is_eq { &mut sets.eq } else { &mut sets.rg };
                push_unique(target, col.name.clone());
            }
        }
    }

    // o from the column groups, split by owning table with order preserved.
    for group in &info.column_groups {
        let mut per_table: BTreeMap<String, Vec<Ident>> = BTreeMap::new();
        for col in group {
            if !col.has_origin() {
                continue;
            }
            let cols = per_table.entry(col.table.lowered.clone()).or_default();
            push_unique(cols, col.name.clone());
        }
        for (table, cols) in per_table {
            if let Some(sets) = map.get_mut(&table) {
                sets.o.push(cols);
            }
        }
    }
    for sets in map.values_mut() {
        sets.o = remove_repeated_column_set(std::mem::take(&mut sets.o));
    }

    // refs from projection expressions that are plain columns.
    for expr in &info.proj_exprs {
        let Expr::Column(col) = expr else { continue };
        if !col.has_origin() {
            continue;
        }
        if let Some(sets) = map.get_mut(&col.table.lowered) {
            push_unique(&mut sets.refs, col.name.clone());
        }
    }

    map
}

/// Enumerate candidate index column-lists for one table.
///
/// Produces, in order: singletons over every table column, all ordered
/// pairs, then composite lists from the two templates. Composites shorter
/// than three columns are dropped (pairs already cover them), duplicates are
/// removed positionally, and any list whose column-name sequence equals an
/// existing real index's, position for position, is filtered out. A
/// candidate that is merely a prefix of a real index is kept: the
/// optimizer, not the generator, decides whether it is useful.
pub fn gen_virtual_index_cols(table: &TableInfo, sets: &TableInfoSets) -> Vec<Vec<Ident>> {
    if sets.is_empty() {
        return Vec::new();
    }

    let mut result: Vec<Vec<Ident>> = Vec::new();

    // Singletons.
    for col in &table.columns {
        result.push(vec![col.name.clone()]);
    }

    // Ordered pairs; order matters, so (a,b) and (b,a) are both produced.
    for i in &table.columns {
        for j in &table.columns {
            if i.name != j.name {
                result.push(vec![i.name.clone(), j.name.clone()]);
            }
        }
    }

    // Composites: equality-first and order-first, one iteration per order
    // group (or one collapsed iteration when there are none).
    let mut composites: Vec<Vec<Ident>> = Vec::new();
    let order_groups: Vec<&[Ident]> = if sets.o.is_empty() {
        vec![&[]]
    } else {
        sets.o.iter().map(|g| g.as_slice()).collect()
    };
    for o_cols in &order_groups {
        let mut cols = Vec::new();
        append_dedup(&mut cols, &sets.eq);
        append_dedup(&mut cols, o_cols);
        append_dedup(&mut cols, &sets.rg);
        append_dedup(&mut cols, &sets.refs);
        if cols.len() > 2 {
            composites.push(cols);
        }
    }
    for o_cols in &order_groups {
        let mut cols = Vec::new();
        append_dedup(&mut cols, o_cols);
        append_dedup(&mut cols, &sets.eq);
        append_dedup(&mut cols, &sets.rg);
        append_dedup(&mut cols, &sets.refs);
        if cols.len() > 2 {
            composites.push(cols);
        }
    }
    result.extend(remove_repeated_column_set(composites));

    // Existence filter: drop candidates already realized by a real index.
    result.retain(|cols| {
        let names: Vec<&str> = cols.iter().map(|c| c.lowered.as_str()).collect();
        !table.indexes.iter().any(|idx| idx.same_columns(&names))
    });

    result
}

fn push_unique(list: &mut Vec<Ident>, item: Ident) {
    if !list.contains(&item) {
        list.push(item);
    }
}

fn append_dedup(cols: &mut Vec<Ident>, ready: &[Ident]) {
    for c in ready {
        push_unique(cols, c.clone());
    }
}

/// Remove positionally-equal column lists, keeping first occurrences.
fn remove_repeated_column_set(sets: Vec<Vec<Ident>>) -> Vec<Vec<Ident>> {
    let mut out: Vec<Vec<Ident>> = Vec::new();
    for s in sets {
        if !out.contains(&s) {
            out.push(s);
        }
    }
    out
}
