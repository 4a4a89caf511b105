//! # Case-Insensitive Identifiers
//!
//! SQL identifiers in a MySQL-compatible engine compare case-insensitively but
//! display with the lettering the user (or the schema definition) supplied.
//! `Ident` stores both forms: the original spelling for display and the lowered
//! spelling for comparison, hashing and map keys. Everything that names a
//! database object -- databases, tables, columns, indexes -- uses this type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A case-preserving, case-insensitively compared identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ident {
    /// The spelling as written by the user or the schema definition.
    pub original: String,
    /// The lowercase spelling used for every comparison.
    pub lowered: String,
}

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        let original = name.into();
        let lowered = original.to_lowercase();
        Self { original, lowered }
    }

    /// The empty identifier, used for columns with no origin table
    /// (e.g. aggregate outputs).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.lowered.is_empty()
    }
}

impl PartialEq for Ident {
    fn eq(&self, other: &Self) -> bool {
        self.lowered == other.lowered
    }
}

impl Eq for Ident {}

impl Hash for Ident {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lowered.hash(state);
    }
}

/// `Display` prints the original lettering; comparisons stay lowered.
impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

impl From<&str> for Ident {
    fn from(s: &str) -> Self {
        Ident::new(s)
    }
}
