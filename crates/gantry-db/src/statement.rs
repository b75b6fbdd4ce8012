//! SQL text plus bound parameters.

use crate::dialect::Backend;
use crate::errors::Result;
use crate::query::QueryBuilder;
use crate::value::Value;

/// A rendered statement ready to hand to a connection.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
    key_column: Option<String>,
}

impl Statement {
    /// Statement with no parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            key_column: None,
        }
    }

    /// Bind the next positional parameter.
    #[must_use]
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Build from already-collected parts.
    pub fn from_parts(sql: String, params: Vec<Value>) -> Self {
        Self {
            sql,
            params,
            key_column: None,
        }
    }

    /// Column an INSERT reports its generated keys from. Backends that
    /// hand out keys natively ignore it.
    #[must_use]
    pub fn with_key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = Some(column.into());
        self
    }

    /// SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound parameters, in placeholder order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Generated-key column set with [`with_key_column`](Self::with_key_column).
    pub fn key_column(&self) -> Option<&str> {
        self.key_column.as_deref()
    }

    /// Leading keyword, uppercased (`SELECT`, `INSERT`, ...). Leading
    /// whitespace, `(` and `--` line comments are skipped.
    pub fn keyword(&self) -> String {
        let mut rest = self.sql.as_str();
        loop {
            rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
            if let Some(after) = rest.strip_prefix("--") {
                rest = after.split_once('\n').map_or("", |(_, tail)| tail);
            } else {
                break;
            }
        }
        rest.chars()
            .take_while(char::is_ascii_alphabetic)
            .collect::<String>()
            .to_ascii_uppercase()
    }
}

/// Anything that can become a [`Statement`] for a given backend: raw SQL,
/// a prepared [`Statement`], or a [`QueryBuilder`].
pub trait IntoStatement {
    /// Render for `backend`.
    fn into_statement(self, backend: Backend) -> Result<Statement>;
}

impl IntoStatement for Statement {
    fn into_statement(self, _backend: Backend) -> Result<Statement> {
        Ok(self)
    }
}

impl IntoStatement for &Statement {
    fn into_statement(self, _backend: Backend) -> Result<Statement> {
        Ok(self.clone())
    }
}

impl IntoStatement for &str {
    fn into_statement(self, _backend: Backend) -> Result<Statement> {
        Ok(Statement::new(self))
    }
}

impl IntoStatement for String {
    fn into_statement(self, _backend: Backend) -> Result<Statement> {
        Ok(Statement::new(self))
    }
}

impl IntoStatement for &String {
    fn into_statement(self, _backend: Backend) -> Result<Statement> {
        Ok(Statement::new(self.as_str()))
    }
}

impl IntoStatement for QueryBuilder {
    fn into_statement(self, backend: Backend) -> Result<Statement> {
        self.build(backend)
    }
}

impl IntoStatement for &QueryBuilder {
    fn into_statement(self, backend: Backend) -> Result<Statement> {
        self.build(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_detection() {
        assert_eq!(Statement::new("insert into t values (1)").keyword(), "INSERT");
        assert_eq!(Statement::new("  \n\tSELECT 1").keyword(), "SELECT");
        assert_eq!(Statement::new("-- note\nUPDATE t SET a = 1").keyword(), "UPDATE");
        assert_eq!(Statement::new("(SELECT 1)").keyword(), "SELECT");
        assert_eq!(Statement::new("").keyword(), "");
        assert_eq!(Statement::new("-- only a comment").keyword(), "");
    }

    #[test]
    fn bind_keeps_order() {
        let stmt = Statement::new("SELECT ?1, ?2").bind(1_i64).bind("x");
        assert_eq!(stmt.params(), &[Value::Integer(1), Value::Text("x".into())]);
    }

    #[test]
    fn key_column_is_opt_in() {
        assert_eq!(Statement::new("INSERT INTO t DEFAULT VALUES").key_column(), None);
        let stmt = Statement::new("INSERT INTO t DEFAULT VALUES").with_key_column("uid");
        assert_eq!(stmt.key_column(), Some("uid"));
    }

    #[test]
    fn raw_sql_into_statement() {
        let stmt = "DELETE FROM t".into_statement(Backend::Postgres).unwrap();
        assert_eq!(stmt.sql(), "DELETE FROM t");
        assert!(stmt.params().is_empty());
    }
}
