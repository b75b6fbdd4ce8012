//! Builder state to SQL text plus bound parameters.

use std::fmt::Write as _;

use super::conditions::{Condition, Conditions};
use super::{JoinKind, QueryBuilder, QueryKind, SelectColumn, SetValue};
use crate::dialect::Backend;
use crate::errors::{DbError, Result};
use crate::statement::Statement;
use crate::value::Value;

struct Renderer {
    backend: Backend,
    params: Vec<Value>,
}

impl Renderer {
    fn bind(&mut self, value: &Value) -> String {
        self.params.push(value.clone());
        self.backend.placeholder(self.params.len())
    }

    fn ident(&self, ident: &str) -> Result<String> {
        self.backend.quote_ident(ident)
    }

    /// Render a predicate list, or `None` when nothing renders.
    fn conditions(&mut self, conditions: &Conditions) -> Result<Option<String>> {
        let mut out = String::new();
        for (connector, condition) in &conditions.items {
            let Some(rendered) = self.condition(condition)? else {
                continue;
            };
            if !out.is_empty() {
                let _ = write!(out, " {} ", connector.as_sql());
            }
            out.push_str(&rendered);
        }
        Ok((!out.is_empty()).then_some(out))
    }

    fn condition(&mut self, condition: &Condition) -> Result<Option<String>> {
        let sql = match condition {
            Condition::Compare { column, op, value } => {
                let column = self.ident(column)?;
                if value.is_null() {
                    return Err(DbError::InvalidQuery(format!(
                        "comparison of {column} with NULL, use where_null"
                    )));
                }
                format!("{column} {} {}", op.as_sql(), self.bind(value))
            }
            Condition::Null { column, negated } => {
                let not = if *negated { " NOT" } else { "" };
                format!("{} IS{not} NULL", self.ident(column)?)
            }
            Condition::In { column, values } => {
                if values.is_empty() {
                    "1 = 0".to_string()
                } else {
                    let column = self.ident(column)?;
                    let placeholders: Vec<String> = values.iter().map(|v| self.bind(v)).collect();
                    format!("{column} IN ({})", placeholders.join(", "))
                }
            }
            Condition::Raw(sql) => format!("({sql})"),
            Condition::Group(group) => match self.conditions(group)? {
                Some(inner) => format!("({inner})"),
                None => return Ok(None),
            },
        };
        Ok(Some(sql))
    }

    fn where_clause(&mut self, conditions: &Conditions) -> Result<String> {
        Ok(self
            .conditions(conditions)?
            .map(|c| format!(" WHERE {c}"))
            .unwrap_or_default())
    }
}

pub(super) fn render(builder: &QueryBuilder, backend: Backend) -> Result<Statement> {
    let mut r = Renderer {
        backend,
        params: Vec::new(),
    };
    let table = r.ident(&builder.table)?;

    if builder.kind != QueryKind::Select {
        if !builder.joins.is_empty() || !builder.orders.is_empty() {
            return Err(DbError::InvalidQuery(format!(
                "{} does not take JOIN or ORDER BY",
                builder.kind.keyword()
            )));
        }
        if builder.limit.is_some() || builder.offset.is_some() {
            return Err(DbError::InvalidQuery(format!(
                "{} does not take LIMIT or OFFSET",
                builder.kind.keyword()
            )));
        }
    }

    let sql = match builder.kind {
        QueryKind::Select => {
            let mut sql = String::from("SELECT ");
            if builder.columns.is_empty() {
                sql.push('*');
            } else {
                let columns = builder
                    .columns
                    .iter()
                    .map(|c| match c {
                        SelectColumn::Ident(name) => r.ident(name),
                        SelectColumn::Raw(expr) => Ok(expr.clone()),
                    })
                    .collect::<Result<Vec<_>>>()?;
                sql.push_str(&columns.join(", "));
            }
            let _ = write!(sql, " FROM {table}");
            for join in &builder.joins {
                let keyword = match join.kind {
                    JoinKind::Inner => "INNER JOIN",
                    JoinKind::Left => "LEFT JOIN",
                };
                let _ = write!(
                    sql,
                    " {keyword} {} ON {} {} {}",
                    r.ident(&join.table)?,
                    r.ident(&join.left)?,
                    join.op.as_sql(),
                    r.ident(&join.right)?
                );
            }
            sql.push_str(&r.where_clause(&builder.conditions)?);
            if !builder.orders.is_empty() {
                let orders = builder
                    .orders
                    .iter()
                    .map(|(column, dir)| Ok(format!("{} {}", r.ident(column)?, dir.as_sql())))
                    .collect::<Result<Vec<_>>>()?;
                let _ = write!(sql, " ORDER BY {}", orders.join(", "));
            }
            sql.push_str(&backend.limit_clause(builder.limit, builder.offset));
            sql
        }
        QueryKind::Insert => {
            if builder.sets.is_empty() {
                return Err(DbError::InvalidQuery(format!(
                    "INSERT into {table} has no columns to set"
                )));
            }
            if !builder.conditions.is_empty() {
                return Err(DbError::InvalidQuery("INSERT does not take WHERE".into()));
            }
            let mut columns = Vec::with_capacity(builder.sets.len());
            let mut values = Vec::with_capacity(builder.sets.len());
            for (column, value) in &builder.sets {
                columns.push(r.ident(column)?);
                values.push(render_set_value(&mut r, value));
            }
            format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                values.join(", ")
            )
        }
        QueryKind::Update => {
            if builder.sets.is_empty() {
                return Err(DbError::InvalidQuery(format!(
                    "UPDATE of {table} has no columns to set"
                )));
            }
            let mut assignments = Vec::with_capacity(builder.sets.len());
            for (column, value) in &builder.sets {
                let column = r.ident(column)?;
                assignments.push(format!("{column} = {}", render_set_value(&mut r, value)));
            }
            let mut sql = format!("UPDATE {table} SET {}", assignments.join(", "));
            sql.push_str(&r.where_clause(&builder.conditions)?);
            sql
        }
        QueryKind::Delete => {
            let mut sql = format!("DELETE FROM {table}");
            sql.push_str(&r.where_clause(&builder.conditions)?);
            sql
        }
    };

    let stmt = Statement::from_parts(sql, r.params);
    match &builder.returning {
        None => Ok(stmt),
        Some(_) if builder.kind != QueryKind::Insert => Err(DbError::InvalidQuery(format!(
            "{} does not take RETURNING",
            builder.kind.keyword()
        ))),
        Some(column) => Ok(stmt.with_key_column(backend.quote_ident(column)?)),
    }
}

fn render_set_value(r: &mut Renderer, value: &SetValue) -> String {
    match value {
        SetValue::Bound(v) => r.bind(v),
        SetValue::Raw(expr) => expr.clone(),
    }
}
