//! Function-call collection and the system-function permission catalog.
//!
//! The walker descends through a statement's expression trees and records
//! the name of every function call it meets. It deliberately does not enter
//! subquery bodies; those surface as their own statement nodes when the
//! batch is analyzed. Unlisted functions default to `read`.

use pgconsole_core::Permission;
use sqlparser::ast::{
    Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr, JoinConstraint,
    JoinOperator, LimitClause, OrderByKind, Query, Select, SelectItem, SetExpr, Statement,
    TableWithJoins,
};

/// Permission demanded by a system function. Only the session-control
/// functions are dangerous enough to require `admin`.
pub fn function_permission(name: &str) -> Permission {
    match name {
        "pg_cancel_backend" | "pg_terminate_backend" => Permission::Admin,
        _ => Permission::Read,
    }
}

/// Collect the (normalized, lowercase) names of every function called in the
/// statement's expression trees.
pub fn collect_function_names(stmt: &Statement) -> Vec<String> {
    let mut names = Vec::new();
    walk_statement(stmt, &mut names);
    names
}

fn walk_statement(stmt: &Statement, names: &mut Vec<String>) {
    match stmt {
        Statement::Query(query) => walk_query(query, names),
        Statement::Insert(insert) => {
            if let Some(source) = &insert.source {
                walk_query(source, names);
            }
            if let Some(returning) = &insert.returning {
                walk_select_items(returning, names);
            }
        }
        Statement::Update(update) => {
            for assignment in &update.assignments {
                walk_expr(&assignment.value, names);
            }
            if let Some(selection) = &update.selection {
                walk_expr(selection, names);
            }
            if let Some(returning) = &update.returning {
                walk_select_items(returning, names);
            }
        }
        Statement::Delete(delete) => {
            if let Some(selection) = &delete.selection {
                walk_expr(selection, names);
            }
            if let Some(returning) = &delete.returning {
                walk_select_items(returning, names);
            }
        }
        Statement::Call(function) => walk_function(function, names),
        _ => {}
    }
}

fn walk_query(query: &Query, names: &mut Vec<String>) {
    walk_set_expr(&query.body, names);

    if let Some(order_by) = &query.order_by {
        if let OrderByKind::Expressions(exprs) = &order_by.kind {
            for item in exprs {
                walk_expr(&item.expr, names);
            }
        }
    }

    if let Some(limit_clause) = &query.limit_clause {
        match limit_clause {
            LimitClause::LimitOffset {
                limit,
                offset,
                limit_by,
            } => {
                if let Some(limit) = limit {
                    walk_expr(limit, names);
                }
                if let Some(offset) = offset {
                    walk_expr(&offset.value, names);
                }
                for expr in limit_by {
                    walk_expr(expr, names);
                }
            }
            LimitClause::OffsetCommaLimit { offset, limit } => {
                walk_expr(offset, names);
                walk_expr(limit, names);
            }
        }
    }
}

fn walk_set_expr(body: &SetExpr, names: &mut Vec<String>) {
    match body {
        SetExpr::Select(select) => walk_select(select, names),
        SetExpr::Query(query) => walk_query(query, names),
        SetExpr::SetOperation { left, right, .. } => {
            walk_set_expr(left, names);
            walk_set_expr(right, names);
        }
        SetExpr::Values(values) => {
            for row in &values.rows {
                for expr in row {
                    walk_expr(expr, names);
                }
            }
        }
        _ => {}
    }
}

fn walk_select(select: &Select, names: &mut Vec<String>) {
    walk_select_items(&select.projection, names);
    for table in &select.from {
        walk_join_conditions(table, names);
    }
    if let Some(selection) = &select.selection {
        walk_expr(selection, names);
    }
    if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
        for expr in exprs {
            walk_expr(expr, names);
        }
    }
    if let Some(having) = &select.having {
        walk_expr(having, names);
    }
}

/// Walk the ON condition of every join in a FROM entry. The joined
/// relations themselves are not descended into (derived tables stay under
/// the subquery exclusion).
fn walk_join_conditions(table: &TableWithJoins, names: &mut Vec<String>) {
    for join in &table.joins {
        let constraint = match &join.join_operator {
            JoinOperator::Join(c)
            | JoinOperator::Inner(c)
            | JoinOperator::Left(c)
            | JoinOperator::LeftOuter(c)
            | JoinOperator::Right(c)
            | JoinOperator::RightOuter(c)
            | JoinOperator::FullOuter(c) => c,
            _ => continue,
        };
        if let JoinConstraint::On(expr) = constraint {
            walk_expr(expr, names);
        }
    }
}

fn walk_select_items(items: &[SelectItem], names: &mut Vec<String>) {
    for item in items {
        match item {
            SelectItem::UnnamedExpr(expr) => walk_expr(expr, names),
            SelectItem::ExprWithAlias { expr, .. } => walk_expr(expr, names),
            _ => {}
        }
    }
}

fn walk_function(function: &Function, names: &mut Vec<String>) {
    names.push(normalize_name(&function.name.to_string()));
    walk_function_arguments(&function.parameters, names);
    walk_function_arguments(&function.args, names);
    if let Some(filter) = &function.filter {
        walk_expr(filter, names);
    }
}

fn walk_function_arguments(args: &FunctionArguments, names: &mut Vec<String>) {
    match args {
        FunctionArguments::List(list) => {
            for arg in &list.args {
                match arg {
                    FunctionArg::Named { arg, .. } => walk_function_arg_expr(arg, names),
                    FunctionArg::Unnamed(arg) => walk_function_arg_expr(arg, names),
                    _ => {}
                }
            }
        }
        // Subquery arguments are left to their own statement analysis.
        FunctionArguments::Subquery(_) | FunctionArguments::None => {}
    }
}

fn walk_function_arg_expr(arg: &FunctionArgExpr, names: &mut Vec<String>) {
    if let FunctionArgExpr::Expr(expr) = arg {
        walk_expr(expr, names);
    }
}

fn walk_expr(expr: &Expr, names: &mut Vec<String>) {
    match expr {
        Expr::Function(function) => walk_function(function, names),

        Expr::BinaryOp { left, right, .. } => {
            walk_expr(left, names);
            walk_expr(right, names);
        }
        Expr::UnaryOp { expr, .. } => walk_expr(expr, names),
        Expr::AnyOp { left, right, .. } | Expr::AllOp { left, right, .. } => {
            walk_expr(left, names);
            walk_expr(right, names);
        }

        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(operand) = operand {
                walk_expr(operand, names);
            }
            for when in conditions {
                walk_expr(&when.condition, names);
                walk_expr(&when.result, names);
            }
            if let Some(else_result) = else_result {
                walk_expr(else_result, names);
            }
        }

        Expr::Cast { expr, .. } => walk_expr(expr, names),
        Expr::Collate { expr, .. } => walk_expr(expr, names),
        Expr::Nested(expr) => walk_expr(expr, names),

        Expr::IsNull(expr)
        | Expr::IsNotNull(expr)
        | Expr::IsTrue(expr)
        | Expr::IsNotTrue(expr)
        | Expr::IsFalse(expr)
        | Expr::IsNotFalse(expr)
        | Expr::IsUnknown(expr)
        | Expr::IsNotUnknown(expr) => walk_expr(expr, names),

        Expr::InList { expr, list, .. } => {
            walk_expr(expr, names);
            for item in list {
                walk_expr(item, names);
            }
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            walk_expr(expr, names);
            walk_expr(low, names);
            walk_expr(high, names);
        }
        Expr::Like { expr, pattern, .. }
        | Expr::ILike { expr, pattern, .. }
        | Expr::SimilarTo { expr, pattern, .. } => {
            walk_expr(expr, names);
            walk_expr(pattern, names);
        }

        Expr::Tuple(exprs) => {
            for item in exprs {
                walk_expr(item, names);
            }
        }
        Expr::Array(array) => {
            for item in &array.elem {
                walk_expr(item, names);
            }
        }

        Expr::Extract { expr, .. } => walk_expr(expr, names),
        Expr::AtTimeZone { timestamp, .. } => walk_expr(timestamp, names),

        // Subquery bodies are not descended into: each subselect is analyzed
        // when it appears as its own statement node.
        Expr::Subquery(_) | Expr::Exists { .. } => {}
        Expr::InSubquery { expr, .. } => walk_expr(expr, names),

        _ => {}
    }
}

/// Lowercase the final path segment and strip identifier quoting, so
/// `public."PG_Cancel_Backend"` and `pg_cancel_backend` hit the same
/// catalog entry.
fn normalize_name(raw: &str) -> String {
    let last = raw.rsplit('.').next().unwrap_or(raw);
    last.trim_matches('"').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_schema_and_quoting() {
        assert_eq!(normalize_name("pg_catalog.pg_cancel_backend"), "pg_cancel_backend");
        assert_eq!(normalize_name("\"Weird\""), "weird");
        assert_eq!(normalize_name("lower"), "lower");
    }

    #[test]
    fn catalog_defaults_to_read() {
        assert_eq!(function_permission("now"), Permission::Read);
        assert_eq!(function_permission("pg_cancel_backend"), Permission::Admin);
        assert_eq!(function_permission("pg_terminate_backend"), Permission::Admin);
    }
}
