//! # Scalar Expressions
//!
//! The expression layer of the plan representation: column references, literal
//! values and named scalar functions. Predicates are scalar functions whose
//! name carries their meaning (`eq`, `in`, `gt`, ...); the advisor classifies
//! predicates solely by that name, so the function-name enum is the contract
//! between the planner and the advisor.
//!
//! Conjunctions and disjunctions are scalar functions too (`and` / `or`) and
//! are flattened on demand rather than stored as flat lists, mirroring how the
//! predicates arrive from the SQL front end.

use crate::ident::Ident;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Constant values appearing in queries (e.g. `WHERE x = 42`).
///
/// `OrderedFloat` wraps `f64` so that scalar values are `Eq`/`Hash` and can be
/// deduplicated or used as map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(OrderedFloat<f64>),
    Utf8(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => write!(f, "{v}"),
            ScalarValue::Utf8(v) => write!(f, "'{v}'"),
        }
    }
}

/// A column reference carrying its origin table.
///
/// `table` is the *real* table name (not the alias), which is what the advisor
/// groups candidate columns by. A column with an empty origin table (aggregate
/// outputs, synthetic projections) is ignored by the advisor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: Ident,
    pub name: Ident,
}

impl ColumnRef {
    pub fn new(table: impl Into<Ident>, name: impl Into<Ident>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
        }
    }

    /// A column with no origin table.
    pub fn anonymous(name: impl Into<Ident>) -> Self {
        Self {
            table: Ident::empty(),
            name: name.into(),
        }
    }

    pub fn has_origin(&self) -> bool {
        !self.table.is_empty()
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.table.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.table, self.name)
        }
    }
}

/// Scalar function names. The lowered name is the classification key used by
/// the advisor, so the set here is the set of predicates the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuncName {
    Eq,
    In,
    Gt,
    Lt,
    Ne,
    Ge,
    Le,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Mul,
    Div,
    IsNull,
    Like,
}

impl FuncName {
    pub fn as_str(&self) -> &'static str {
        match self {
            FuncName::Eq => "eq",
            FuncName::In => "in",
            FuncName::Gt => "gt",
            FuncName::Lt => "lt",
            FuncName::Ne => "ne",
            FuncName::Ge => "ge",
            FuncName::Le => "le",
            FuncName::And => "and",
            FuncName::Or => "or",
            FuncName::Not => "not",
            FuncName::Plus => "plus",
            FuncName::Minus => "minus",
            FuncName::Mul => "mul",
            FuncName::Div => "div",
            FuncName::IsNull => "isnull",
            FuncName::Like => "like",
        }
    }

    /// The arithmetic functions whose column arguments the advisor decomposes.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            FuncName::Plus | FuncName::Minus | FuncName::Mul | FuncName::Div
        )
    }
}

/// A named scalar function application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScalarFunc {
    pub name: FuncName,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Column(ColumnRef),
    Literal(ScalarValue),
    Func(ScalarFunc),
}

impl Expr {
    pub fn func(name: FuncName, args: Vec<Expr>) -> Self {
        Expr::Func(ScalarFunc { name, args })
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Expr::func(FuncName::Eq, vec![left, right])
    }

    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Expr::Column(c) => Some(c),
            _ => None,
        }
    }

    /// All column references in this expression, depth first.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Expr::Column(c) => out.push(c),
            Expr::Literal(_) => {}
            Expr::Func(f) => {
                for a in &f.args {
                    a.collect_columns(out);
                }
            }
        }
    }

}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{c}"),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Func(func) => {
                let args: Vec<String> = func.args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", func.name.as_str(), args.join(", "))
            }
        }
    }
}

/// Aggregate function kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// An aggregate application; `arg` is `None` for `count(*)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggExpr {
    pub func: AggFunc,
    pub arg: Option<Expr>,
}

/// One ORDER BY / sort item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByItem {
    pub expr: Expr,
    pub desc: bool,
}
