//! # Logical Plan Builder
//!
//! Lowers a parsed SELECT into the engine's logical plan tree against an
//! `InfoSchema` snapshot. The builder performs the normalizations the planner
//! and the advisor rely on:
//!
//! - columns resolve case-insensitively and carry their *origin table* name
//!   (aliases are resolved away),
//! - referenced columns are pruned into each `DataSource`,
//! - WHERE is decomposed through AND; single-table conjuncts are pushed into
//!   their `DataSource`, cross-table conjuncts stay in a `Selection`,
//! - uncorrelated `IN (SELECT ...)` becomes a semi join, correlated subqueries
//!   become `Apply`,
//! - `ORDER BY` with `LIMIT` becomes `TopN`,
//! - a projection that is the identity over its child's output is elided.

use crate::error::PlanError;
use crate::expr::{AggExpr, AggFunc, ByItem, ColumnRef, Expr, FuncName, ScalarValue};
use crate::ident::Ident;
use crate::plan::{DataSource, JoinKind, LogicalPlan};
use crate::schema::{InfoSchema, TableInfo};
use ordered_float::OrderedFloat;
use sqlparser::ast;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use std::collections::BTreeSet;

/// Build the logical plan of a single SELECT statement.
pub fn build_logical_plan(
    sql: &str,
    db: &str,
    schema: &InfoSchema,
) -> Result<LogicalPlan, PlanError> {
    let statements = Parser::parse_sql(&MySqlDialect {}, sql)
        .map_err(|e| PlanError::Parse(e.to_string()))?;
    if statements.len() != 1 {
        return Err(PlanError::Unsupported(format!(
            "expected one statement, got {}",
            statements.len()
        )));
    }
    match &statements[0] {
        ast::Statement::Query(query) => {
            let builder = Builder { db, schema };
            builder.build_query(query, None)
        }
        other => Err(PlanError::Unsupported(format!("{other}"))),
    }
}

/// One table bound in the FROM clause.
struct Binding<'a> {
    /// Alias if given, table name otherwise (lowered for lookup).
    bound: Ident,
    alias: Option<Ident>,
    table: &'a TableInfo,
}

struct Scope<'a, 'b> {
    bindings: &'b [Binding<'a>],
    outer: Option<&'b Scope<'a, 'b>>,
}

/// A resolved column together with the binding it came from. `binding` is
/// `None` when the column resolved in an enclosing (outer) scope.
struct Resolved {
    column: ColumnRef,
    binding: Option<usize>,
}

impl<'a, 'b> Scope<'a, 'b> {
    fn resolve(&self, qualifier: Option<&str>, name: &str) -> Result<Resolved, PlanError> {
        let lowered = name.to_lowercase();
        match qualifier {
            Some(q) => {
                let q = q.to_lowercase();
                for (i, b) in self.bindings.iter().enumerate() {
                    if b.bound.lowered == q {
                        let col = b.table.column_by_name(&lowered).ok_or_else(|| {
                            PlanError::UnknownColumn(format!("{q}.{name}"))
                        })?;
                        return Ok(Resolved {
                            column: ColumnRef::new(b.table.name.clone(), col.name.clone()),
                            binding: Some(i),
                        });
                    }
                }
                if let Some(outer) = self.outer {
                    let mut r = outer.resolve(qualifier, name)?;
                    r.binding = None;
                    return Ok(r);
                }
                Err(PlanError::UnknownTable(q))
            }
            None => {
                let mut found: Option<Resolved> = None;
                for (i, b) in self.bindings.iter().enumerate() {
                    if let Some(col) = b.table.column_by_name(&lowered) {
                        if found.is_some() {
                            return Err(PlanError::AmbiguousColumn(name.to_string()));
                        }
                        found = Some(Resolved {
                            column: ColumnRef::new(b.table.name.clone(), col.name.clone()),
                            binding: Some(i),
                        });
                    }
                }
                if let Some(r) = found {
                    return Ok(r);
                }
                if let Some(outer) = self.outer {
                    let mut r = outer.resolve(qualifier, name)?;
                    r.binding = None;
                    return Ok(r);
                }
                Err(PlanError::UnknownColumn(name.to_string()))
            }
        }
    }
}

struct Builder<'a> {
    db: &'a str,
    schema: &'a InfoSchema,
}

/// Result of converting one sqlparser expression: the engine expression plus
/// which bindings (and whether any outer column) it touches.
struct Converted {
    expr: Expr,
    bindings: BTreeSet<usize>,
    correlated: bool,
}

impl<'a> Builder<'a> {
    fn build_query(
        &self,
        query: &ast::Query,
        outer: Option<&Scope<'a, '_>>,
    ) -> Result<LogicalPlan, PlanError> {
        let limit = match &query.limit {
            Some(ast::Expr::Value(ast::Value::Number(n, _))) => Some(
                n.parse::<u64>()
                    .map_err(|_| PlanError::Unsupported("non-integer LIMIT".into()))?,
            ),
            Some(other) => {
                return Err(PlanError::Unsupported(format!("LIMIT {other}")));
            }
            None => None,
        };

        match query.body.as_ref() {
            ast::SetExpr::Select(select) => {
                self.build_select(select, &query.order_by, limit, outer)
            }
            ast::SetExpr::SetOperation {
                op: ast::SetOperator::Union,
                set_quantifier: ast::SetQuantifier::All,
                left,
                right,
            } => {
                let left = self.build_set_expr(left, outer)?;
                let right = self.build_set_expr(right, outer)?;
                Ok(LogicalPlan::UnionAll {
                    children: vec![left, right],
                })
            }
            other => Err(PlanError::Unsupported(format!("{other}"))),
        }
    }

    fn build_set_expr(
        &self,
        body: &ast::SetExpr,
        outer: Option<&Scope<'a, '_>>,
    ) -> Result<LogicalPlan, PlanError> {
        match body {
            ast::SetExpr::Select(select) => self.build_select(select, &[], None, outer),
            ast::SetExpr::Query(query) => self.build_query(query, outer),
            other => Err(PlanError::Unsupported(format!("{other}"))),
        }
    }

    fn build_select(
        &self,
        select: &ast::Select,
        order_by: &[ast::OrderByExpr],
        limit: Option<u64>,
        outer: Option<&Scope<'a, '_>>,
    ) -> Result<LogicalPlan, PlanError> {
        if select.having.is_some() {
            return Err(PlanError::Unsupported("HAVING".into()));
        }
        if select.from.len() != 1 {
            return Err(PlanError::Unsupported(
                "exactly one FROM item is supported".into(),
            ));
        }

        // Bind tables: the base relation plus any JOINed relations.
        let from = &select.from[0];
        let mut bindings = Vec::new();
        bindings.push(self.bind_table(&from.relation)?);
        let mut join_constraints = Vec::new();
        for join in &from.joins {
            bindings.push(self.bind_table(&join.relation)?);
            let on = match &join.join_operator {
                ast::JoinOperator::Inner(ast::JoinConstraint::On(e)) => e,
                other => {
                    return Err(PlanError::Unsupported(format!("join {other:?}")));
                }
            };
            join_constraints.push(on);
        }
        let scope = Scope {
            bindings: &bindings,
            outer,
        };

        // Column pruning: every column the statement references, per binding.
        let mut referenced: Vec<BTreeSet<String>> = vec![BTreeSet::new(); bindings.len()];
        let mut wildcard: Vec<bool> = vec![false; bindings.len()];
        self.collect_projection_refs(select, &scope, &mut referenced, &mut wildcard)?;
        for on in &join_constraints {
            self.collect_expr_refs(on, &scope, &mut referenced)?;
        }
        if let Some(selection) = &select.selection {
            self.collect_expr_refs(selection, &scope, &mut referenced)?;
        }
        if let ast::GroupByExpr::Expressions(exprs) = &select.group_by {
            for e in exprs {
                self.collect_expr_refs(e, &scope, &mut referenced)?;
            }
        }
        for item in order_by {
            self.collect_expr_refs(&item.expr, &scope, &mut referenced)?;
        }

        // One DataSource per binding, with the pruned column list.
        let mut sources: Vec<DataSource> = bindings
            .iter()
            .zip(referenced.iter().zip(wildcard.iter()))
            .map(|(b, (refs, wild))| {
                let columns = b
                    .table
                    .columns
                    .iter()
                    .filter(|c| *wild || refs.contains(&c.name.lowered))
                    .cloned()
                    .collect();
                DataSource {
                    db: Ident::new(self.db),
                    table: b.table.name.clone(),
                    alias: b.alias.clone(),
                    columns,
                    pushed_conditions: Vec::new(),
                }
            })
            .collect();

        // WHERE: decompose through AND; route each conjunct.
        let mut cross_conditions = Vec::new();
        let mut subqueries = Vec::new();
        if let Some(selection) = &select.selection {
            for conjunct in split_conjuncts(selection) {
                if let ast::Expr::InSubquery {
                    expr,
                    subquery,
                    negated: false,
                } = conjunct
                {
                    subqueries.push((expr.as_ref(), subquery.as_ref()));
                    continue;
                }
                let converted = self.convert_expr(conjunct, &scope)?;
                match single_binding(&converted) {
                    Some(i) => sources[i].pushed_conditions.push(converted.expr),
                    None => cross_conditions.push(converted.expr),
                }
            }
        }

        // Join tree in FROM order.
        let mut plan = LogicalPlan::Scan(sources[0].clone());
        for (i, on) in join_constraints.iter().enumerate() {
            let right = LogicalPlan::Scan(sources[i + 1].clone());
            let (equal, other) = self.split_join_condition(on, &scope, i + 1)?;
            plan = LogicalPlan::Join {
                kind: JoinKind::Inner,
                equal,
                other,
                left: Box::new(plan),
                right: Box::new(right),
            };
        }

        // IN subqueries: semi join when uncorrelated, Apply when correlated.
        for (lhs, subquery) in subqueries {
            let lhs = self.convert_expr(lhs, &scope)?;
            let lhs_col = match lhs.expr.as_column() {
                Some(c) => c.clone(),
                None => {
                    return Err(PlanError::Unsupported(
                        "IN subquery over a non-column expression".into(),
                    ));
                }
            };
            let inner = self.build_query(subquery, Some(&scope))?;
            let inner_col = first_output_column(&inner).ok_or_else(|| {
                PlanError::Unsupported("IN subquery without a column output".into())
            })?;
            let correlated = plan_is_correlated(&inner);
            if correlated {
                plan = LogicalPlan::Apply {
                    conditions: vec![Expr::eq(
                        Expr::Column(lhs_col),
                        Expr::Column(inner_col),
                    )],
                    outer: Box::new(plan),
                    inner: Box::new(inner),
                };
            } else {
                plan = LogicalPlan::Join {
                    kind: JoinKind::Semi,
                    equal: vec![(lhs_col, inner_col)],
                    other: vec![],
                    left: Box::new(plan),
                    right: Box::new(inner),
                };
            }
        }

        if !cross_conditions.is_empty() {
            plan = LogicalPlan::Selection {
                conditions: cross_conditions,
                child: Box::new(plan),
            };
        }

        // Aggregation.
        let (proj_exprs, aggs) = self.convert_projection(select, &scope)?;
        let group_by = match &select.group_by {
            ast::GroupByExpr::Expressions(exprs) => exprs
                .iter()
                .map(|e| self.convert_expr(e, &scope).map(|c| c.expr))
                .collect::<Result<Vec<_>, _>>()?,
            ast::GroupByExpr::All => {
                return Err(PlanError::Unsupported("GROUP BY ALL".into()));
            }
        };
        if !aggs.is_empty() || !group_by.is_empty() {
            plan = LogicalPlan::Aggregation {
                aggs,
                group_by,
                child: Box::new(plan),
            };
        }

        // ORDER BY / LIMIT.
        if !order_by.is_empty() {
            let items = order_by
                .iter()
                .map(|item| {
                    self.convert_expr(&item.expr, &scope).map(|c| ByItem {
                        expr: c.expr,
                        desc: !item.asc.unwrap_or(true),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            plan = match limit {
                Some(limit) => LogicalPlan::TopN {
                    items,
                    limit,
                    child: Box::new(plan),
                },
                None => LogicalPlan::Sort {
                    items,
                    child: Box::new(plan),
                },
            };
        } else if let Some(limit) = limit {
            plan = LogicalPlan::Limit {
                limit,
                child: Box::new(plan),
            };
        }

        // Final projection, elided when it is the identity over the child.
        if !is_identity_projection(&proj_exprs, &plan) {
            plan = LogicalPlan::Projection {
                exprs: proj_exprs,
                child: Box::new(plan),
            };
        }
        Ok(plan)
    }

    fn bind_table(&self, factor: &ast::TableFactor) -> Result<Binding<'a>, PlanError> {
        match factor {
            ast::TableFactor::Table { name, alias, .. } => {
                let table_name = object_name_tail(name);
                let table = self
                    .schema
                    .table_by_name(self.db, &table_name)
                    .ok_or_else(|| PlanError::UnknownTable(table_name.clone()))?;
                let alias = alias.as_ref().map(|a| Ident::new(a.name.value.clone()));
                let bound = alias.clone().unwrap_or_else(|| table.name.clone());
                Ok(Binding {
                    bound,
                    alias,
                    table,
                })
            }
            other => Err(PlanError::Unsupported(format!("table factor {other}"))),
        }
    }

    /// Record which columns of which bindings an expression references.
    /// Outer-scope references are ignored here: they prune nothing locally.
    fn collect_expr_refs(
        &self,
        expr: &ast::Expr,
        scope: &Scope<'a, '_>,
        referenced: &mut [BTreeSet<String>],
    ) -> Result<(), PlanError> {
        match expr {
            ast::Expr::Identifier(ident) => {
                if let Ok(Resolved {
                    column,
                    binding: Some(i),
                }) = scope.resolve(None, &ident.value)
                {
                    referenced[i].insert(column.name.lowered);
                }
                Ok(())
            }
            ast::Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
                let q = &parts[parts.len() - 2].value;
                let c = &parts[parts.len() - 1].value;
                if let Ok(Resolved {
                    column,
                    binding: Some(i),
                }) = scope.resolve(Some(q), c)
                {
                    referenced[i].insert(column.name.lowered);
                }
                Ok(())
            }
            ast::Expr::BinaryOp { left, right, .. } => {
                self.collect_expr_refs(left, scope, referenced)?;
                self.collect_expr_refs(right, scope, referenced)
            }
            ast::Expr::UnaryOp { expr, .. } | ast::Expr::Nested(expr) => {
                self.collect_expr_refs(expr, scope, referenced)
            }
            ast::Expr::InList { expr, list, .. } => {
                self.collect_expr_refs(expr, scope, referenced)?;
                for e in list {
                    self.collect_expr_refs(e, scope, referenced)?;
                }
                Ok(())
            }
            ast::Expr::InSubquery { expr, .. } => {
                // The subquery prunes its own scope when it is built.
                self.collect_expr_refs(expr, scope, referenced)
            }
            ast::Expr::IsNull(expr) | ast::Expr::IsNotNull(expr) => {
                self.collect_expr_refs(expr, scope, referenced)
            }
            ast::Expr::Function(func) => {
                for arg in function_arg_exprs(func) {
                    self.collect_expr_refs(arg, scope, referenced)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn collect_projection_refs(
        &self,
        select: &ast::Select,
        scope: &Scope<'a, '_>,
        referenced: &mut [BTreeSet<String>],
        wildcard: &mut [bool],
    ) -> Result<(), PlanError> {
        for item in &select.projection {
            match item {
                ast::SelectItem::UnnamedExpr(e) | ast::SelectItem::ExprWithAlias { expr: e, .. } => {
                    self.collect_expr_refs(e, scope, referenced)?;
                }
                ast::SelectItem::Wildcard(_) => {
                    for w in wildcard.iter_mut() {
                        *w = true;
                    }
                }
                ast::SelectItem::QualifiedWildcard(name, _) => {
                    let q = object_name_tail(name).to_lowercase();
                    for (i, b) in scope.bindings.iter().enumerate() {
                        if b.bound.lowered == q {
                            wildcard[i] = true;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Convert the projection into output expressions plus any aggregates.
    /// Aggregate outputs project as anonymous columns (no origin table).
    fn convert_projection(
        &self,
        select: &ast::Select,
        scope: &Scope<'a, '_>,
    ) -> Result<(Vec<Expr>, Vec<AggExpr>), PlanError> {
        let mut exprs = Vec::new();
        let mut aggs = Vec::new();
        for item in &select.projection {
            match item {
                ast::SelectItem::UnnamedExpr(e) | ast::SelectItem::ExprWithAlias { expr: e, .. } => {
                    if let Some((func, arg)) = self.as_aggregate(e, scope)? {
                        exprs.push(Expr::Column(ColumnRef::anonymous(format!("{e}").as_str())));
                        aggs.push(AggExpr { func, arg });
                    } else {
                        exprs.push(self.convert_expr(e, scope)?.expr);
                    }
                }
                ast::SelectItem::Wildcard(_) => {
                    for b in scope.bindings.iter() {
                        for col in &b.table.columns {
                            exprs.push(Expr::Column(ColumnRef::new(
                                b.table.name.clone(),
                                col.name.clone(),
                            )));
                        }
                    }
                }
                ast::SelectItem::QualifiedWildcard(name, _) => {
                    let q = object_name_tail(name).to_lowercase();
                    for b in scope.bindings.iter() {
                        if b.bound.lowered == q {
                            for col in &b.table.columns {
                                exprs.push(Expr::Column(ColumnRef::new(
                                    b.table.name.clone(),
                                    col.name.clone(),
                                )));
                            }
                        }
                    }
                }
            }
        }
        Ok((exprs, aggs))
    }

    fn as_aggregate(
        &self,
        expr: &ast::Expr,
        scope: &Scope<'a, '_>,
    ) -> Result<Option<(AggFunc, Option<Expr>)>, PlanError> {
        let ast::Expr::Function(func) = expr else {
            return Ok(None);
        };
        let name = object_name_tail(&func.name).to_lowercase();
        let agg = match name.as_str() {
            "count" => AggFunc::Count,
            "sum" => AggFunc::Sum,
            "avg" => AggFunc::Avg,
            "min" => AggFunc::Min,
            "max" => AggFunc::Max,
            _ => return Ok(None),
        };
        let args = function_arg_exprs(func);
        let arg = match args.first() {
            Some(e) => Some(self.convert_expr(e, scope)?.expr),
            None => None,
        };
        Ok(Some((agg, arg)))
    }

    fn split_join_condition(
        &self,
        on: &ast::Expr,
        scope: &Scope<'a, '_>,
        right_binding: usize,
    ) -> Result<(Vec<(ColumnRef, ColumnRef)>, Vec<Expr>), PlanError> {
        let mut equal = Vec::new();
        let mut other = Vec::new();
        for conjunct in split_conjuncts(on) {
            let converted = self.convert_expr(conjunct, scope)?;
            if let ast::Expr::BinaryOp {
                left,
                op: ast::BinaryOperator::Eq,
                right,
            } = conjunct
            {
                let l = self.convert_expr(left, scope)?;
                let r = self.convert_expr(right, scope)?;
                if let (Some(lc), Some(rc)) = (l.expr.as_column(), r.expr.as_column()) {
                    let l_on_right = l.bindings.contains(&right_binding);
                    let r_on_right = r.bindings.contains(&right_binding);
                    if l_on_right != r_on_right {
                        // Left-side key first.
                        let pair = if r_on_right {
                            (lc.clone(), rc.clone())
                        } else {
                            (rc.clone(), lc.clone())
                        };
                        equal.push(pair);
                        continue;
                    }
                }
            }
            other.push(converted.expr);
        }
        Ok((equal, other))
    }

    fn convert_expr(
        &self,
        expr: &ast::Expr,
        scope: &Scope<'a, '_>,
    ) -> Result<Converted, PlanError> {
        let mut bindings = BTreeSet::new();
        let mut correlated = false;
        let converted = self.convert_inner(expr, scope, &mut bindings, &mut correlated)?;
        Ok(Converted {
            expr: converted,
            bindings,
            correlated,
        })
    }

    fn convert_inner(
        &self,
        expr: &ast::Expr,
        scope: &Scope<'a, '_>,
        bindings: &mut BTreeSet<usize>,
        correlated: &mut bool,
    ) -> Result<Expr, PlanError> {
        match expr {
            ast::Expr::Identifier(ident) => {
                let r = scope.resolve(None, &ident.value)?;
                match r.binding {
                    Some(i) => {
                        bindings.insert(i);
                    }
                    None => *correlated = true,
                }
                Ok(Expr::Column(r.column))
            }
            ast::Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
                let q = &parts[parts.len() - 2].value;
                let c = &parts[parts.len() - 1].value;
                let r = scope.resolve(Some(q), c)?;
                match r.binding {
                    Some(i) => {
                        bindings.insert(i);
                    }
                    None => *correlated = true,
                }
                Ok(Expr::Column(r.column))
            }
            ast::Expr::Value(v) => Ok(Expr::Literal(convert_value(v)?)),
            ast::Expr::Nested(e) => self.convert_inner(e, scope, bindings, correlated),
            ast::Expr::BinaryOp { left, op, right } => {
                let name = match op {
                    ast::BinaryOperator::Eq => FuncName::Eq,
                    ast::BinaryOperator::NotEq => FuncName::Ne,
                    ast::BinaryOperator::Gt => FuncName::Gt,
                    ast::BinaryOperator::Lt => FuncName::Lt,
                    ast::BinaryOperator::GtEq => FuncName::Ge,
                    ast::BinaryOperator::LtEq => FuncName::Le,
                    ast::BinaryOperator::And => FuncName::And,
                    ast::BinaryOperator::Or => FuncName::Or,
                    ast::BinaryOperator::Plus => FuncName::Plus,
                    ast::BinaryOperator::Minus => FuncName::Minus,
                    ast::BinaryOperator::Multiply => FuncName::Mul,
                    ast::BinaryOperator::Divide => FuncName::Div,
                    other => {
                        return Err(PlanError::Unsupported(format!("operator {other}")));
                    }
                };
                let l = self.convert_inner(left, scope, bindings, correlated)?;
                let r = self.convert_inner(right, scope, bindings, correlated)?;
                Ok(Expr::func(name, vec![l, r]))
            }
            ast::Expr::UnaryOp {
                op: ast::UnaryOperator::Not,
                expr,
            } => {
                let inner = self.convert_inner(expr, scope, bindings, correlated)?;
                Ok(Expr::func(FuncName::Not, vec![inner]))
            }
            ast::Expr::InList {
                expr,
                list,
                negated: false,
            } => {
                let mut args = vec![self.convert_inner(expr, scope, bindings, correlated)?];
                for e in list {
                    args.push(self.convert_inner(e, scope, bindings, correlated)?);
                }
                Ok(Expr::func(FuncName::In, args))
            }
            ast::Expr::IsNull(e) => {
                let inner = self.convert_inner(e, scope, bindings, correlated)?;
                Ok(Expr::func(FuncName::IsNull, vec![inner]))
            }
            ast::Expr::Like {
                negated: false,
                expr,
                pattern,
                ..
            } => {
                let l = self.convert_inner(expr, scope, bindings, correlated)?;
                let r = self.convert_inner(pattern, scope, bindings, correlated)?;
                Ok(Expr::func(FuncName::Like, vec![l, r]))
            }
            other => Err(PlanError::Unsupported(format!("expression {other}"))),
        }
    }
}

fn convert_value(value: &ast::Value) -> Result<ScalarValue, PlanError> {
    match value {
        ast::Value::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(ScalarValue::Int64(i))
            } else {
                n.parse::<f64>()
                    .map(|f| ScalarValue::Float64(OrderedFloat(f)))
                    .map_err(|_| PlanError::Unsupported(format!("number {n}")))
            }
        }
        ast::Value::SingleQuotedString(s) | ast::Value::DoubleQuotedString(s) => {
            Ok(ScalarValue::Utf8(s.clone()))
        }
        ast::Value::Boolean(b) => Ok(ScalarValue::Bool(*b)),
        ast::Value::Null => Ok(ScalarValue::Null),
        other => Err(PlanError::Unsupported(format!("literal {other}"))),
    }
}

/// Flatten a WHERE/ON expression through top-level ANDs.
fn split_conjuncts(expr: &ast::Expr) -> Vec<&ast::Expr> {
    match expr {
        ast::Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            let mut out = split_conjuncts(left);
            out.extend(split_conjuncts(right));
            out
        }
        ast::Expr::Nested(e) => split_conjuncts(e),
        other => vec![other],
    }
}

fn single_binding(converted: &Converted) -> Option<usize> {
    if converted.correlated || converted.bindings.len() != 1 {
        return None;
    }
    converted.bindings.iter().next().copied()
}

fn function_arg_exprs(func: &ast::Function) -> Vec<&ast::Expr> {
    let ast::FunctionArguments::List(list) = &func.args else {
        return vec![];
    };
    list.args
        .iter()
        .filter_map(|arg| match arg {
            ast::FunctionArg::Unnamed(ast::FunctionArgExpr::Expr(e)) => Some(e),
            ast::FunctionArg::Named {
                arg: ast::FunctionArgExpr::Expr(e),
                ..
            } => Some(e),
            _ => None,
        })
        .collect()
}

fn object_name_tail(name: &ast::ObjectName) -> String {
    name.0
        .last()
        .map(|i| i.value.clone())
        .unwrap_or_default()
}

/// Output columns of a plan, when they are statically known column lists.
fn output_columns(plan: &LogicalPlan) -> Option<Vec<ColumnRef>> {
    match plan {
        LogicalPlan::Scan(ds) => Some(
            ds.columns
                .iter()
                .map(|c| ColumnRef::new(ds.table.clone(), c.name.clone()))
                .collect(),
        ),
        LogicalPlan::Selection { child, .. } | LogicalPlan::Limit { child, .. } => {
            output_columns(child)
        }
        LogicalPlan::Sort { child, .. } | LogicalPlan::TopN { child, .. } => output_columns(child),
        LogicalPlan::Join {
            kind: JoinKind::Inner,
            left,
            right,
            ..
        } => {
            let mut cols = output_columns(left)?;
            cols.extend(output_columns(right)?);
            Some(cols)
        }
        LogicalPlan::Join {
            kind: JoinKind::Semi,
            left,
            ..
        } => output_columns(left),
        LogicalPlan::Apply { outer, .. } => output_columns(outer),
        LogicalPlan::Projection { exprs, .. } => exprs
            .iter()
            .map(|e| e.as_column().cloned())
            .collect::<Option<Vec<_>>>(),
        _ => None,
    }
}

/// The first output column of a built subplan, used as the semi-join key.
fn first_output_column(plan: &LogicalPlan) -> Option<ColumnRef> {
    output_columns(plan).and_then(|cols| cols.into_iter().next())
}

/// True when the projection reproduces the child's output columns exactly.
fn is_identity_projection(exprs: &[Expr], child: &LogicalPlan) -> bool {
    let Some(child_cols) = output_columns(child) else {
        return false;
    };
    if exprs.len() != child_cols.len() {
        return false;
    }
    exprs
        .iter()
        .zip(child_cols.iter())
        .all(|(e, c)| e.as_column() == Some(c))
}

fn plan_is_correlated(plan: &LogicalPlan) -> bool {
    // A subplan is correlated when any pushed or free condition references a
    // table that is not bound inside the subplan itself.
    fn bound_tables(plan: &LogicalPlan, out: &mut BTreeSet<String>) {
        if let LogicalPlan::Scan(ds) = plan {
            out.insert(ds.table.lowered.clone());
        }
        for child in plan.children() {
            bound_tables(child, out);
        }
    }
    fn check(plan: &LogicalPlan, bound: &BTreeSet<String>) -> bool {
        let conditions: Vec<&Expr> = match plan {
            LogicalPlan::Scan(ds) => ds.pushed_conditions.iter().collect(),
            LogicalPlan::Selection { conditions, .. } => conditions.iter().collect(),
            _ => vec![],
        };
        for cond in conditions {
            for col in cond.columns() {
                if col.has_origin() && !bound.contains(&col.table.lowered) {
                    return true;
                }
            }
        }
        plan.children().iter().any(|c| check(c, bound))
    }
    let mut bound = BTreeSet::new();
    bound_tables(plan, &mut bound);
    check(plan, &bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableInfo;

    fn test_schema() -> InfoSchema {
        let mut is = InfoSchema::new(1);
        is.add_table(
            "test",
            TableInfo::new("t", &["a", "b", "c", "d", "e", "ts"]).with_primary_key("a"),
        );
        is.add_table("test", TableInfo::new("t1", &["a", "b", "c", "d"]));
        is
    }

    #[test]
    fn test_simple_filter_is_pushed_to_source() {
        let is = test_schema();
        let plan = build_logical_plan("select a, b from t1 where c in (1,3)", "test", &is).unwrap();
        let LogicalPlan::Projection { exprs, child } = plan else {
            panic!("expected projection on top");
        };
        assert_eq!(exprs.len(), 2);
        let LogicalPlan::Scan(ds) = *child else {
            panic!("expected scan under projection");
        };
        assert_eq!(ds.pushed_conditions.len(), 1);
        // a, b, c referenced -> pruned to three columns
        assert_eq!(ds.columns.len(), 3);
    }

    #[test]
    fn test_group_by_builds_aggregation() {
        let is = test_schema();
        let plan = build_logical_plan("select count(*) from t group by e", "test", &is).unwrap();
        let LogicalPlan::Projection { child, .. } = plan else {
            panic!("expected projection");
        };
        let LogicalPlan::Aggregation { aggs, group_by, .. } = *child else {
            panic!("expected aggregation");
        };
        assert_eq!(aggs.len(), 1);
        assert_eq!(group_by.len(), 1);
    }

    #[test]
    fn test_uncorrelated_in_subquery_is_semi_join() {
        let is = test_schema();
        let plan = build_logical_plan(
            "select * from t where b in (select c from t1 where c > 0)",
            "test",
            &is,
        )
        .unwrap();
        // select * over a semi join is the identity projection and is elided.
        let LogicalPlan::Join { kind, equal, .. } = plan else {
            panic!("expected semi join at top, got {plan:?}");
        };
        assert_eq!(kind, JoinKind::Semi);
        assert_eq!(equal.len(), 1);
        assert_eq!(equal[0].0.name.lowered, "b");
        assert_eq!(equal[0].1.name.lowered, "c");
    }

    #[test]
    fn test_correlated_subquery_becomes_apply() {
        let is = test_schema();
        let plan = build_logical_plan(
            "select * from t where b in (select c from t1 where c > t.e)",
            "test",
            &is,
        )
        .unwrap();
        assert!(matches!(plan, LogicalPlan::Apply { .. }), "got {plan:?}");
    }

    #[test]
    fn test_order_by_limit_is_topn() {
        let is = test_schema();
        let plan =
            build_logical_plan("select a from t1 order by b desc limit 10", "test", &is).unwrap();
        let LogicalPlan::Projection { child, .. } = plan else {
            panic!("expected projection");
        };
        let LogicalPlan::TopN { items, limit, .. } = *child else {
            panic!("expected topn");
        };
        assert_eq!(limit, 10);
        assert!(items[0].desc);
    }

    #[test]
    fn test_join_equal_keys_resolve_aliases() {
        let is = test_schema();
        let plan = build_logical_plan(
            "select t.a from t join t1 on t.b = t1.b",
            "test",
            &is,
        )
        .unwrap();
        let LogicalPlan::Projection { child, .. } = plan else {
            panic!("expected projection");
        };
        let LogicalPlan::Join { kind, equal, .. } = *child else {
            panic!("expected join");
        };
        assert_eq!(kind, JoinKind::Inner);
        assert_eq!(equal.len(), 1);
        assert_eq!(equal[0].0.table.lowered, "t");
        assert_eq!(equal[0].1.table.lowered, "t1");
    }
}
