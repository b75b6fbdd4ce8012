//! Client-server engine connection (`PostgreSQL` via the blocking `postgres` crate).

use std::collections::BTreeSet;
use std::time::Duration;

use ::postgres::types::{ToSql, Type};
use ::postgres::{Client, NoTls};
use tracing::{debug, info};

use super::{Connection, StatementHandle};
use crate::collection::RowCollection;
use crate::dialect::{Backend, has_returning, insert_target, returning_sql};
use crate::errors::{DbError, Result};
use crate::statement::Statement;
use crate::value::Value;

/// A single `PostgreSQL` connection, opened lazily.
pub struct PostgresConnection {
    url: String,
    connect_timeout: Duration,
    generated_key_column: String,
    client: Option<Client>,
    auto_commit: bool,
    tx: TxState,
}

impl std::fmt::Debug for PostgresConnection {
    // The url may carry a password.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("open", &self.client.is_some())
            .field("auto_commit", &self.auto_commit)
            .field("tx", &self.tx)
            .finish_non_exhaustive()
    }
}

/// Client-side view of the implicit transaction.
///
/// Once a statement fails inside a transaction the server rejects every
/// later statement and answers `COMMIT` with a silent rollback, so the
/// failure is remembered and `commit` reports it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct TxState {
    open: bool,
    failed: bool,
}

/// How an open transaction is closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TxEnd {
    Commit,
    Rollback,
    /// Commit was asked for but the transaction had already failed.
    Aborted,
}

impl TxEnd {
    fn sql(self) -> &'static str {
        match self {
            Self::Commit => "COMMIT",
            Self::Rollback | Self::Aborted => "ROLLBACK",
        }
    }
}

impl TxState {
    fn track<T, E: Into<DbError>>(&mut self, result: std::result::Result<T, E>) -> Result<T> {
        if result.is_err() && self.open {
            self.failed = true;
        }
        result.map_err(Into::into)
    }

    /// Close the transaction, returning what to send, if anything.
    fn close(&mut self, commit: bool) -> Option<TxEnd> {
        let state = std::mem::take(self);
        match (state.open, commit, state.failed) {
            (false, ..) => None,
            (true, true, false) => Some(TxEnd::Commit),
            (true, true, true) => Some(TxEnd::Aborted),
            (true, false, _) => Some(TxEnd::Rollback),
        }
    }
}

impl PostgresConnection {
    /// Connection described by a libpq key/value string or a `postgres://` URL.
    ///
    /// `generated_key_column` is what `insert` returns keys from when the
    /// statement names no key column of its own.
    pub fn new(url: impl Into<String>, connect_timeout: Duration, generated_key_column: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            generated_key_column: generated_key_column.into(),
            client: None,
            auto_commit: true,
            tx: TxState::default(),
        }
    }

    fn live(&mut self) -> Result<&mut Client> {
        self.client
            .as_mut()
            .ok_or_else(|| DbError::Unavailable("postgres connection is closed".into()))
    }

    /// The live client, with an implicit transaction opened first when
    /// auto-commit is off.
    fn live_for_statement(&mut self) -> Result<(&mut Client, &mut TxState)> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| DbError::Unavailable("postgres connection is closed".into()))?;
        if !self.auto_commit && !self.tx.open {
            client.batch_execute("BEGIN")?;
            self.tx.open = true;
        }
        Ok((client, &mut self.tx))
    }

    /// Key column for an INSERT that did not name one: the configured
    /// column, when the target table has it.
    fn default_key_column(&mut self, sql: &str) -> Result<Option<String>> {
        let Some(table) = insert_target(sql) else {
            return Ok(Some(self.generated_key_column.clone()));
        };
        let lookup = Backend::Postgres.has_column_statement(&table, &self.generated_key_column);
        if self.query(&lookup)?.is_empty() {
            debug!(table = %table, column = %self.generated_key_column, "no generated key column");
            return Ok(None);
        }
        Ok(Some(self.generated_key_column.clone()))
    }

    fn end_transaction(&mut self, commit: bool) -> Result<()> {
        let Some(end) = self.tx.close(commit) else {
            return Ok(());
        };
        self.live()?.batch_execute(end.sql())?;
        if end == TxEnd::Aborted {
            return Err(DbError::TransactionAborted);
        }
        Ok(())
    }
}

impl Connection for PostgresConnection {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        let mut config: ::postgres::Config = self.url.parse()?;
        let _ = config.connect_timeout(self.connect_timeout);
        let client = config.connect(NoTls)?;
        info!("postgres connection opened");
        self.client = Some(client);
        self.tx = TxState::default();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.is_closed())
    }

    fn close(&mut self) -> Result<()> {
        self.tx = TxState::default();
        if let Some(client) = self.client.take() {
            client.close()?;
            info!("postgres connection closed");
        }
        Ok(())
    }

    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn StatementHandle + 'c>> {
        let (client, tx) = self.live_for_statement()?;
        let stmt = tx.track(client.prepare(sql))?;
        Ok(Box::new(PostgresStatement { client, tx, stmt }))
    }

    fn insert(&mut self, stmt: &Statement) -> Result<BTreeSet<i64>> {
        let key_column = match stmt.key_column() {
            Some(column) => Some(column.to_string()),
            None if has_returning(stmt.sql()) => None,
            None => self.default_key_column(stmt.sql())?,
        };
        let Some(sql) = returning_sql(stmt.sql(), key_column.as_deref()) else {
            let _ = self.execute(stmt)?;
            return Ok(BTreeSet::new());
        };
        let (client, tx) = self.live_for_statement()?;
        let rows = tx.track(client.query(sql.as_str(), &param_refs(stmt.params())))?;
        let mut keys = BTreeSet::new();
        for row in rows {
            let key = match *row.columns()[0].type_() {
                Type::INT2 => row.try_get::<_, Option<i16>>(0)?.map(i64::from),
                Type::INT4 => row.try_get::<_, Option<i32>>(0)?.map(i64::from),
                _ => row.try_get::<_, Option<i64>>(0)?,
            };
            keys.extend(key);
        }
        Ok(keys)
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<()> {
        let closing = enabled && !self.auto_commit;
        self.auto_commit = enabled;
        debug!(enabled, "postgres auto-commit");
        if closing {
            // The transaction is closed even when COMMIT fails, so the
            // connection is back in auto-commit either way.
            self.end_transaction(true)?;
        }
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn commit(&mut self) -> Result<()> {
        self.end_transaction(true)
    }

    fn rollback(&mut self) -> Result<()> {
        self.end_transaction(false)
    }
}

struct PostgresStatement<'c> {
    client: &'c mut Client,
    tx: &'c mut TxState,
    stmt: ::postgres::Statement,
}

impl StatementHandle for PostgresStatement<'_> {
    fn parameter_count(&self) -> usize {
        self.stmt.params().len()
    }

    fn execute(&mut self, params: &[Value]) -> Result<u64> {
        self.tx
            .track(self.client.execute(&self.stmt, &param_refs(params)))
    }

    fn query(&mut self, params: &[Value]) -> Result<RowCollection> {
        let columns: Vec<String> = self
            .stmt
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let rows = self
            .tx
            .track(self.client.query(&self.stmt, &param_refs(params)))?;
        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            let cells = (0..row.len())
                .map(|i| cell(row, i))
                .collect::<Result<Vec<_>>>()?;
            values.push(cells);
        }
        Ok(RowCollection::new(columns, values))
    }
}

fn param_refs(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn cell(row: &::postgres::Row, idx: usize) -> Result<Value> {
    let ty = row.columns()[idx].type_();
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| Value::Integer(i64::from(v))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| Value::Integer(i64::from(v))),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Integer),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| Value::Real(f64::from(v))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Real),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
        }
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Blob),
        Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map(|t| Value::Text(t.format("%Y-%m-%d %H:%M:%S%.f").to_string())),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map(|t| Value::Text(t.to_rfc3339())),
        _ => return Err(DbError::UnsupportedType(ty.name().to_string())),
    };
    Ok(value.unwrap_or(Value::Null))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_conn() -> PostgresConnection {
        PostgresConnection::new(
            "host=127.0.0.1 port=1 user=gantry dbname=gantry",
            Duration::from_millis(200),
            "id",
        )
    }

    #[test]
    fn starts_closed() {
        let conn = unreachable_conn();
        assert!(!conn.is_open());
        assert!(conn.auto_commit());
        assert_eq!(conn.backend(), Backend::Postgres);
    }

    #[test]
    fn open_against_nothing_fails() {
        let mut conn = unreachable_conn();
        assert!(conn.open().is_err());
        assert!(!conn.is_open());
    }

    #[test]
    fn statements_on_closed_connection_are_unavailable() {
        let mut conn = unreachable_conn();
        assert!(matches!(
            conn.execute(&Statement::new("SELECT 1")),
            Err(DbError::Unavailable(_))
        ));
        assert!(matches!(
            conn.insert(&Statement::new("INSERT INTO t DEFAULT VALUES")),
            Err(DbError::Unavailable(_))
        ));
    }

    #[test]
    fn commit_without_transaction_is_a_no_op() {
        let mut conn = unreachable_conn();
        conn.commit().unwrap();
        conn.rollback().unwrap();
        conn.set_auto_commit(false).unwrap();
        conn.set_auto_commit(true).unwrap();
    }

    fn failed_statement() -> Result<()> {
        Err(DbError::InvalidQuery("syntax error at or near \"SELEC\"".into()))
    }

    #[test]
    fn failed_statement_turns_commit_into_rollback() {
        let mut tx = TxState { open: true, failed: false };
        assert!(tx.track(failed_statement()).is_err());
        assert!(tx.failed);
        assert_eq!(tx.close(true), Some(TxEnd::Aborted));
        assert_eq!(TxEnd::Aborted.sql(), "ROLLBACK");
        assert_eq!(tx, TxState::default());
    }

    #[test]
    fn failure_outside_a_transaction_is_not_remembered() {
        let mut tx = TxState::default();
        assert!(tx.track(failed_statement()).is_err());
        assert!(!tx.failed);
        assert_eq!(tx.close(true), None);
    }

    #[test]
    fn healthy_transaction_commits_and_rollback_stays_rollback() {
        let mut tx = TxState { open: true, failed: false };
        assert!(tx.track(Ok::<_, DbError>(3)).is_ok());
        assert_eq!(tx.close(true), Some(TxEnd::Commit));
        assert_eq!(tx.close(true), None);

        let mut tx = TxState { open: true, failed: true };
        assert_eq!(tx.close(false), Some(TxEnd::Rollback));
    }

    #[test]
    fn debug_hides_url() {
        let conn = PostgresConnection::new("postgres://u:secret@h/db", Duration::from_secs(1), "id");
        assert!(!format!("{conn:?}").contains("secret"));
    }

    #[test]
    fn malformed_url_is_an_error() {
        let mut conn = PostgresConnection::new("postgres://[::1", Duration::from_secs(1), "id");
        assert!(conn.open().is_err());
    }
}
