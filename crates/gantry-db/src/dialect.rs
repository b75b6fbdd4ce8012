//! Per-backend SQL fragments.
//!
//! Everything that differs between the embedded and the client-server engine
//! is a method on [`Backend`]; call sites never branch on the backend
//! themselves.

use std::fmt;

use gantry_settings::BackendKind;

use crate::errors::{DbError, Result};
use crate::statement::Statement;

/// Concrete SQL backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Embedded engine (`SQLite`).
    Sqlite,
    /// Client-server engine (`PostgreSQL`).
    Postgres,
}

impl From<BackendKind> for Backend {
    fn from(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Sqlite => Self::Sqlite,
            BackendKind::Postgres => Self::Postgres,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Postgres => write!(f, "postgres"),
        }
    }
}

/// Logical column types understood by [`crate::schema::Blueprint`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-incrementing integer primary key.
    Increments,
    /// Bounded string.
    String(u32),
    /// Unbounded text.
    Text,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Long,
    /// Boolean.
    Boolean,
    /// Double precision float.
    Double,
    /// Timestamp without time zone.
    Timestamp,
}

impl Backend {
    /// Positional placeholder for the `index`-th (1-based) parameter.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Sqlite => format!("?{index}"),
            Self::Postgres => format!("${index}"),
        }
    }

    /// Validate and double-quote an identifier.
    ///
    /// Accepts `name`, `schema.name`, `table.*` and `*`. Other input is
    /// rejected so that identifiers can never carry SQL.
    pub fn quote_ident(self, ident: &str) -> Result<String> {
        if ident == "*" {
            return Ok("*".to_string());
        }
        let segments: Vec<&str> = ident.split('.').collect();
        let last = segments.len() - 1;
        let mut quoted = Vec::with_capacity(segments.len());
        for (i, segment) in segments.iter().enumerate() {
            if *segment == "*" && i == last && i > 0 {
                quoted.push("*".to_string());
            } else if is_plain_ident(segment) {
                quoted.push(format!("\"{segment}\""));
            } else {
                return Err(DbError::InvalidQuery(format!("invalid identifier {ident:?}")));
            }
        }
        Ok(quoted.join("."))
    }

    /// Column type fragment for a `CREATE TABLE` / `ADD COLUMN`.
    pub fn column_type_sql(self, ty: ColumnType) -> String {
        match (self, ty) {
            (Self::Sqlite, ColumnType::Increments) => "INTEGER PRIMARY KEY AUTOINCREMENT".into(),
            (Self::Postgres, ColumnType::Increments) => "BIGSERIAL PRIMARY KEY".into(),
            (_, ColumnType::String(len)) => format!("VARCHAR({len})"),
            (_, ColumnType::Text) => "TEXT".into(),
            (_, ColumnType::Integer) => "INTEGER".into(),
            (_, ColumnType::Long) => "BIGINT".into(),
            (_, ColumnType::Boolean) => "BOOLEAN".into(),
            (Self::Sqlite, ColumnType::Double) => "REAL".into(),
            (Self::Postgres, ColumnType::Double) => "DOUBLE PRECISION".into(),
            (_, ColumnType::Timestamp) => "TIMESTAMP".into(),
        }
    }

    /// `ALTER TABLE ... ADD COLUMN ...`. `SQLite` takes one column per statement,
    /// and Postgres accepts the same form, so callers issue one per column.
    pub fn add_column_sql(self, table: &str, column_def: &str) -> Result<String> {
        let table = self.quote_ident(table)?;
        Ok(match self {
            Self::Sqlite => format!("ALTER TABLE {table} ADD COLUMN {column_def}"),
            Self::Postgres => format!("ALTER TABLE {table} ADD COLUMN IF NOT EXISTS {column_def}"),
        })
    }

    /// `ALTER TABLE ... DROP COLUMN ...`.
    pub fn drop_column_sql(self, table: &str, column: &str) -> Result<String> {
        let table = self.quote_ident(table)?;
        let column = self.quote_ident(column)?;
        Ok(match self {
            Self::Sqlite => format!("ALTER TABLE {table} DROP COLUMN {column}"),
            Self::Postgres => format!("ALTER TABLE {table} DROP COLUMN IF EXISTS {column}"),
        })
    }

    /// Statement returning one row per matching table.
    pub fn has_table_statement(self, table: &str) -> Statement {
        match self {
            Self::Sqlite => {
                Statement::new("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1")
                    .bind(table)
            }
            Self::Postgres => Statement::new(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1",
            )
            .bind(table),
        }
    }

    /// Statement returning one row per matching column.
    ///
    /// `SQLite` exposes columns through the `pragma_table_info` table-valued
    /// function; Postgres through `information_schema.columns`.
    pub fn has_column_statement(self, table: &str, column: &str) -> Statement {
        match self {
            Self::Sqlite => {
                Statement::new("SELECT name FROM pragma_table_info(?1) WHERE name = ?2 COLLATE NOCASE")
                    .bind(table)
                    .bind(column)
            }
            Self::Postgres => Statement::new(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2",
            )
            .bind(table)
            .bind(column),
        }
    }

    /// `LIMIT` / `OFFSET` tail, empty when neither is set.
    pub fn limit_clause(self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (self, limit, offset) {
            (_, None, None) => String::new(),
            (_, Some(l), None) => format!(" LIMIT {l}"),
            (_, Some(l), Some(o)) => format!(" LIMIT {l} OFFSET {o}"),
            (Self::Sqlite, None, Some(o)) => format!(" LIMIT -1 OFFSET {o}"),
            (Self::Postgres, None, Some(o)) => format!(" OFFSET {o}"),
        }
    }
}

fn is_plain_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Append `RETURNING <column>` to an INSERT unless it already has one.
pub(crate) fn with_returning(sql: &str, column: &str) -> String {
    let trimmed = trim_statement(sql);
    if has_returning(trimmed) {
        trimmed.to_string()
    } else {
        format!("{trimmed} RETURNING {column}")
    }
}

/// SQL that reports generated keys for an INSERT, or `None` when there is
/// no key column to return and the statement should just be executed.
pub(crate) fn returning_sql(sql: &str, key_column: Option<&str>) -> Option<String> {
    let trimmed = trim_statement(sql);
    if has_returning(trimmed) {
        return Some(trimmed.to_string());
    }
    key_column.map(|column| with_returning(trimmed, column))
}

pub(crate) fn has_returning(sql: &str) -> bool {
    sql.to_ascii_uppercase().contains(" RETURNING ")
}

/// Table named by `INSERT INTO <table>`, as the catalog stores it: unquoted
/// names fold to lowercase, quoted names are kept, schema prefixes dropped.
pub(crate) fn insert_target(sql: &str) -> Option<String> {
    let rest = strip_keyword(strip_keyword(sql, "INSERT")?, "INTO")?.trim_start();
    let mut name = String::new();
    let mut chars = rest.chars().peekable();
    loop {
        name.clear();
        if chars.peek() == Some(&'"') {
            let _ = chars.next();
            loop {
                match chars.next()? {
                    '"' if chars.peek() == Some(&'"') => {
                        let _ = chars.next();
                        name.push('"');
                    }
                    '"' => break,
                    c => name.push(c),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| c.is_ascii_alphanumeric() || *c == '_') {
                name.push(c.to_ascii_lowercase());
            }
        }
        if name.is_empty() {
            return None;
        }
        if chars.next_if_eq(&'.').is_none() {
            return Some(name);
        }
    }
}

fn strip_keyword<'a>(sql: &'a str, keyword: &str) -> Option<&'a str> {
    let sql = sql.trim_start();
    let tail = sql.get(keyword.len()..)?;
    let matches = sql[..keyword.len()].eq_ignore_ascii_case(keyword);
    (matches && tail.starts_with(char::is_whitespace)).then_some(tail)
}

fn trim_statement(sql: &str) -> &str {
    sql.trim_end().trim_end_matches(';').trim_end()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
