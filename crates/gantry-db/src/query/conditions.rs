//! Predicate clauses and their operators.

use std::fmt;
use std::str::FromStr;

use crate::errors::DbError;
use crate::value::Value;

/// Comparison operator for a predicate or join.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `LIKE`
    Like,
    /// `NOT LIKE`
    NotLike,
}

impl Operator {
    /// SQL spelling.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Operator {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "=" | "==" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "LIKE" => Ok(Self::Like),
            "NOT LIKE" => Ok(Self::NotLike),
            _ => Err(DbError::InvalidQuery(format!("unknown operator {s:?}"))),
        }
    }
}

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Connector {
    And,
    Or,
}

impl Connector {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Condition {
    Compare {
        column: String,
        op: Operator,
        value: Value,
    },
    Null {
        column: String,
        negated: bool,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    Raw(String),
    Group(Conditions),
}

/// An ordered list of predicates. Items are joined by their connector,
/// `AND` unless added with an `or_` method; groups render parenthesized.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Conditions {
    pub(crate) items: Vec<(Connector, Condition)>,
}

impl Conditions {
    /// Empty predicate list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no predicate has been added.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn push(mut self, connector: Connector, condition: Condition) -> Self {
        self.items.push((connector, condition));
        self
    }

    /// `AND column op ?`.
    #[must_use]
    pub fn and_where(self, column: &str, op: Operator, value: impl Into<Value>) -> Self {
        self.push(
            Connector::And,
            Condition::Compare {
                column: column.to_string(),
                op,
                value: value.into(),
            },
        )
    }

    /// `OR column op ?`.
    #[must_use]
    pub fn or_where(self, column: &str, op: Operator, value: impl Into<Value>) -> Self {
        self.push(
            Connector::Or,
            Condition::Compare {
                column: column.to_string(),
                op,
                value: value.into(),
            },
        )
    }

    /// `AND column = ?`.
    #[must_use]
    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.and_where(column, Operator::Eq, value)
    }

    /// `AND column IS NULL`.
    #[must_use]
    pub fn where_null(self, column: &str) -> Self {
        self.push(
            Connector::And,
            Condition::Null {
                column: column.to_string(),
                negated: false,
            },
        )
    }

    /// `AND column IS NOT NULL`.
    #[must_use]
    pub fn where_not_null(self, column: &str) -> Self {
        self.push(
            Connector::And,
            Condition::Null {
                column: column.to_string(),
                negated: true,
            },
        )
    }

    /// `AND column IN (?, ...)`. An empty list matches nothing.
    #[must_use]
    pub fn where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push(
            Connector::And,
            Condition::In {
                column: column.to_string(),
                values: values.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// `AND (<sql>)`, inserted verbatim. Only pass trusted text.
    #[must_use]
    pub fn where_raw(self, sql: impl Into<String>) -> Self {
        self.push(Connector::And, Condition::Raw(sql.into()))
    }

    /// `AND ( ... )` built by `f`.
    #[must_use]
    pub fn where_group(self, f: impl FnOnce(Conditions) -> Conditions) -> Self {
        let group = f(Conditions::new());
        self.push(Connector::And, Condition::Group(group))
    }

    /// `OR ( ... )` built by `f`.
    #[must_use]
    pub fn or_where_group(self, f: impl FnOnce(Conditions) -> Conditions) -> Self {
        let group = f(Conditions::new());
        self.push(Connector::Or, Condition::Group(group))
    }
}
