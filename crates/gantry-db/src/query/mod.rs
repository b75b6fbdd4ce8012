//! Fluent query builder.
//!
//! A [`QueryBuilder`] only accumulates clauses; [`QueryBuilder::build`]
//! renders them into a [`Statement`] and never touches a connection.
//! Values are always bound as parameters. Identifiers are validated and
//! quoted. Raw fragments (`select_raw`, `where_raw`, `set_raw`) are the only
//! way to put caller text into SQL.
//!
//! ```ignore
//! let stmt = QueryBuilder::table("guilds")
//!     .where_eq("guild_id", 42_i64)
//!     .where_group(|g| g.where_null("prefix").or_where("prefix", Operator::Eq, "!"))
//!     .order_by("id", Direction::Desc)
//!     .limit(10)
//!     .build(Backend::Sqlite)?;
//! ```

mod conditions;
mod render;

pub use conditions::{Conditions, Direction, Operator};

use crate::dialect::Backend;
use crate::errors::Result;
use crate::statement::Statement;
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl QueryKind {
    fn keyword(self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum SelectColumn {
    Ident(String),
    Raw(String),
}

#[derive(Clone, Debug, PartialEq)]
enum SetValue {
    Bound(Value),
    Raw(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum JoinKind {
    Inner,
    Left,
}

#[derive(Clone, Debug, PartialEq)]
struct Join {
    kind: JoinKind,
    table: String,
    left: String,
    op: Operator,
    right: String,
}

/// Accumulated description of one SELECT, INSERT, UPDATE or DELETE.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryBuilder {
    kind: QueryKind,
    table: String,
    columns: Vec<SelectColumn>,
    conditions: Conditions,
    joins: Vec<Join>,
    orders: Vec<(String, Direction)>,
    limit: Option<u64>,
    offset: Option<u64>,
    sets: Vec<(String, SetValue)>,
    returning: Option<String>,
}

impl QueryBuilder {
    fn with_kind(kind: QueryKind, table: &str) -> Self {
        Self {
            kind,
            table: table.to_string(),
            columns: Vec::new(),
            conditions: Conditions::new(),
            joins: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            sets: Vec::new(),
            returning: None,
        }
    }

    /// SELECT from `table`.
    pub fn table(table: &str) -> Self {
        Self::with_kind(QueryKind::Select, table)
    }

    /// INSERT into `table`. Columns come from [`set`](Self::set).
    pub fn insert_into(table: &str) -> Self {
        Self::with_kind(QueryKind::Insert, table)
    }

    /// UPDATE `table`.
    pub fn update(table: &str) -> Self {
        Self::with_kind(QueryKind::Update, table)
    }

    /// DELETE from `table`.
    pub fn delete_from(table: &str) -> Self {
        Self::with_kind(QueryKind::Delete, table)
    }

    /// Leading keyword this builder renders to.
    pub fn keyword(&self) -> &'static str {
        self.kind.keyword()
    }

    /// Columns to select. Defaults to `*`.
    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns
            .extend(columns.into_iter().map(|c| SelectColumn::Ident(c.into())));
        self
    }

    /// Select a raw expression such as `COUNT(*) AS n`.
    #[must_use]
    pub fn select_raw(mut self, expr: impl Into<String>) -> Self {
        self.columns.push(SelectColumn::Raw(expr.into()));
        self
    }

    /// `AND column op ?`.
    #[must_use]
    pub fn and_where(mut self, column: &str, op: Operator, value: impl Into<Value>) -> Self {
        self.conditions = self.conditions.and_where(column, op, value);
        self
    }

    /// `OR column op ?`.
    #[must_use]
    pub fn or_where(mut self, column: &str, op: Operator, value: impl Into<Value>) -> Self {
        self.conditions = self.conditions.or_where(column, op, value);
        self
    }

    /// `AND column = ?`.
    #[must_use]
    pub fn where_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions = self.conditions.where_eq(column, value);
        self
    }

    /// `AND column IS NULL`.
    #[must_use]
    pub fn where_null(mut self, column: &str) -> Self {
        self.conditions = self.conditions.where_null(column);
        self
    }

    /// `AND column IS NOT NULL`.
    #[must_use]
    pub fn where_not_null(mut self, column: &str) -> Self {
        self.conditions = self.conditions.where_not_null(column);
        self
    }

    /// `AND column IN (...)`. An empty list matches no rows.
    #[must_use]
    pub fn where_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions = self.conditions.where_in(column, values);
        self
    }

    /// Trusted raw predicate.
    #[must_use]
    pub fn where_raw(mut self, sql: impl Into<String>) -> Self {
        self.conditions = self.conditions.where_raw(sql);
        self
    }

    /// Nested group, ANDed with its siblings.
    #[must_use]
    pub fn where_group(mut self, f: impl FnOnce(Conditions) -> Conditions) -> Self {
        self.conditions = self.conditions.where_group(f);
        self
    }

    /// Nested group, ORed with its siblings.
    #[must_use]
    pub fn or_where_group(mut self, f: impl FnOnce(Conditions) -> Conditions) -> Self {
        self.conditions = self.conditions.or_where_group(f);
        self
    }

    /// `INNER JOIN table ON left op right`.
    #[must_use]
    pub fn join(self, table: &str, left: &str, op: Operator, right: &str) -> Self {
        self.push_join(JoinKind::Inner, table, left, op, right)
    }

    /// `LEFT JOIN table ON left op right`.
    #[must_use]
    pub fn left_join(self, table: &str, left: &str, op: Operator, right: &str) -> Self {
        self.push_join(JoinKind::Left, table, left, op, right)
    }

    fn push_join(mut self, kind: JoinKind, table: &str, left: &str, op: Operator, right: &str) -> Self {
        self.joins.push(Join {
            kind,
            table: table.to_string(),
            left: left.to_string(),
            op,
            right: right.to_string(),
        });
        self
    }

    /// Append an ORDER BY term.
    #[must_use]
    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.orders.push((column.to_string(), direction));
        self
    }

    /// Row limit.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Rows to skip.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Set `column` to a bound value (INSERT / UPDATE).
    #[must_use]
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.sets
            .push((column.to_string(), SetValue::Bound(value.into())));
        self
    }

    /// Set `column` to a trusted raw expression such as `CURRENT_TIMESTAMP`.
    #[must_use]
    pub fn set_raw(mut self, column: &str, expr: impl Into<String>) -> Self {
        self.sets.push((column.to_string(), SetValue::Raw(expr.into())));
        self
    }

    /// Column an INSERT reports its generated keys from.
    #[must_use]
    pub fn returning(mut self, column: &str) -> Self {
        self.returning = Some(column.to_string());
        self
    }

    /// Render for `backend`.
    pub fn build(&self, backend: Backend) -> Result<Statement> {
        render::render(self, backend)
    }

    /// SQL text with `SQLite` placeholders.
    pub fn to_sql(&self) -> Result<String> {
        Ok(self.build(Backend::Sqlite)?.sql().to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
