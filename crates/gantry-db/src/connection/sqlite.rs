//! Embedded engine connection (`SQLite` via rusqlite).
//!
//! File databases get WAL journaling, foreign keys and `synchronous = NORMAL`.
//! `:memory:` databases skip WAL, which `SQLite` does not support for them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rusqlite::params_from_iter;
use tracing::{debug, info, warn};

use super::{Connection, StatementHandle};
use crate::collection::RowCollection;
use crate::dialect::Backend;
use crate::errors::{DbError, Result};
use crate::statement::Statement;
use crate::value::Value;

const MEMORY: &str = ":memory:";

/// A single `SQLite` connection, opened lazily.
pub struct SqliteConnection {
    path: PathBuf,
    busy_timeout_ms: u32,
    conn: Option<rusqlite::Connection>,
    auto_commit: bool,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .field("open", &self.conn.is_some())
            .field("auto_commit", &self.auto_commit)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    /// Connection to a database file (created on open) or `:memory:`.
    pub fn new(path: impl AsRef<Path>, busy_timeout_ms: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout_ms,
            conn: None,
            auto_commit: true,
        }
    }

    /// In-memory database.
    pub fn in_memory() -> Self {
        Self::new(MEMORY, 5000)
    }

    /// Database path as configured.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY
    }

    fn live(&self) -> Result<&rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| DbError::Unavailable("sqlite connection is closed".into()))
    }

    /// The live connection, with an implicit transaction opened first when
    /// auto-commit is off.
    fn live_for_statement(&self) -> Result<&rusqlite::Connection> {
        let conn = self.live()?;
        if !self.auto_commit && conn.is_autocommit() {
            conn.execute_batch("BEGIN")?;
        }
        Ok(conn)
    }
}

impl Connection for SqliteConnection {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn open(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = if self.is_memory() {
            rusqlite::Connection::open_in_memory()?
        } else {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DbError::Unavailable(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
            let conn = rusqlite::Connection::open(&self.path)?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            conn
        };
        conn.execute_batch(&format!(
            "PRAGMA busy_timeout = {};\
             PRAGMA foreign_keys = ON;\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))?;
        info!(path = %self.path.display(), "sqlite connection opened");
        self.conn = Some(conn);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| DbError::Sqlite(e))?;
            info!(path = %self.path.display(), "sqlite connection closed");
        }
        Ok(())
    }

    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn StatementHandle + 'c>> {
        let conn = self.live_for_statement()?;
        let stmt = conn.prepare(sql)?;
        Ok(Box::new(SqliteStatement { stmt }))
    }

    fn insert(&mut self, stmt: &Statement) -> Result<BTreeSet<i64>> {
        let changes = self.execute(stmt)?;
        let last = self.live()?.last_insert_rowid();
        Ok(rowid_range(last, changes))
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<()> {
        let closing = enabled && !self.auto_commit;
        self.auto_commit = enabled;
        debug!(enabled, "sqlite auto-commit");
        if closing {
            if let Err(e) = self.commit() {
                // A failed COMMIT leaves the transaction open.
                if let Err(rb) = self.rollback() {
                    warn!(error = %rb, "rollback after failed commit also failed");
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn commit(&mut self) -> Result<()> {
        let conn = self.live()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let conn = self.live()?;
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

struct SqliteStatement<'c> {
    stmt: rusqlite::Statement<'c>,
}

impl StatementHandle for SqliteStatement<'_> {
    fn parameter_count(&self) -> usize {
        self.stmt.parameter_count()
    }

    fn execute(&mut self, params: &[Value]) -> Result<u64> {
        let changed = self.stmt.execute(params_from_iter(params))?;
        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }

    fn query(&mut self, params: &[Value]) -> Result<RowCollection> {
        let columns: Vec<String> = self
            .stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let width = columns.len();
        let mut rows = self.stmt.query(params_from_iter(params))?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            let cells = (0..width)
                .map(|i| row.get_ref(i).map(Value::from))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            values.push(cells);
        }
        Ok(RowCollection::new(columns, values))
    }
}

/// Keys generated by the last statement: `SQLite` assigns a contiguous rowid
/// range to a multi-row INSERT, ending at `last_insert_rowid`.
fn rowid_range(last: i64, changes: u64) -> BTreeSet<i64> {
    if changes == 0 || last == 0 {
        return BTreeSet::new();
    }
    let changes = i64::try_from(changes).unwrap_or(i64::MAX);
    let first = last.saturating_sub(changes - 1).max(1);
    (first..=last).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn open_memory() -> SqliteConnection {
        let mut conn = SqliteConnection::in_memory();
        conn.open().unwrap();
        conn.execute(&Statement::new(
            "CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)",
        ))
        .unwrap();
        conn
    }

    fn count(conn: &mut SqliteConnection) -> i64 {
        conn.query(&Statement::new("SELECT COUNT(*) AS n FROM t"))
            .unwrap()
            .first()
            .unwrap()
            .get_long("n")
            .unwrap()
            .unwrap()
    }

    #[test]
    fn closed_connection_is_unavailable() {
        let mut conn = SqliteConnection::in_memory();
        assert!(!conn.is_open());
        assert!(matches!(
            conn.execute(&Statement::new("SELECT 1")),
            Err(DbError::Unavailable(_))
        ));
    }

    #[test]
    fn open_is_idempotent_and_close_closes() {
        let mut conn = SqliteConnection::in_memory();
        conn.open().unwrap();
        conn.open().unwrap();
        assert!(conn.is_open());
        conn.close().unwrap();
        assert!(!conn.is_open());
        conn.close().unwrap();
    }

    #[test]
    fn file_database_creates_parent_dirs_and_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("db.sqlite");
        let mut conn = SqliteConnection::new(&path, 1000);
        conn.open().unwrap();
        assert!(path.exists());
        let mode = conn
            .query(&Statement::new("PRAGMA journal_mode"))
            .unwrap()
            .first()
            .unwrap()
            .get_string("journal_mode")
            .unwrap();
        assert_eq!(mode.as_deref(), Some("wal"));
    }

    #[test]
    fn multi_row_insert_returns_every_key() {
        let mut conn = open_memory();
        let first = conn
            .insert(&Statement::new("INSERT INTO t (name) VALUES (?1)").bind("a"))
            .unwrap();
        assert_eq!(first, BTreeSet::from([1]));
        let keys = conn
            .insert(&Statement::new("INSERT INTO t (name) VALUES ('b'), ('c'), ('d')"))
            .unwrap();
        assert_eq!(keys, BTreeSet::from([2, 3, 4]));
    }

    #[test]
    fn auto_commit_off_defers_until_commit() {
        let mut conn = open_memory();
        conn.set_auto_commit(false).unwrap();
        conn.execute(&Statement::new("INSERT INTO t (name) VALUES ('a')"))
            .unwrap();
        conn.rollback().unwrap();
        assert_eq!(count(&mut conn), 0);

        conn.execute(&Statement::new("INSERT INTO t (name) VALUES ('b')"))
            .unwrap();
        conn.commit().unwrap();
        conn.rollback().unwrap();
        assert_eq!(count(&mut conn), 1);
    }

    #[test]
    fn re_enabling_auto_commit_commits() {
        let mut conn = open_memory();
        conn.set_auto_commit(false).unwrap();
        conn.execute(&Statement::new("INSERT INTO t (name) VALUES ('a')"))
            .unwrap();
        conn.set_auto_commit(true).unwrap();
        assert!(conn.auto_commit());
        conn.rollback().unwrap();
        assert_eq!(count(&mut conn), 1);
    }

    fn open_with_deferred_child() -> SqliteConnection {
        let mut conn = open_memory();
        conn.execute(&Statement::new("CREATE TABLE parent (id INTEGER PRIMARY KEY)"))
            .unwrap();
        conn.execute(&Statement::new(
            "CREATE TABLE child (parent_id INTEGER REFERENCES parent(id) \
             DEFERRABLE INITIALLY DEFERRED)",
        ))
        .unwrap();
        conn
    }

    #[test]
    fn failed_commit_on_re_enable_still_restores_auto_commit() {
        let mut conn = open_with_deferred_child();
        conn.set_auto_commit(false).unwrap();
        conn.execute(&Statement::new("INSERT INTO child (parent_id) VALUES (999)"))
            .unwrap();

        assert!(matches!(conn.set_auto_commit(true), Err(DbError::Sqlite(_))));
        assert!(conn.auto_commit());
        assert!(conn.live().unwrap().is_autocommit());

        let keys = conn
            .insert(&Statement::new("INSERT INTO t (name) VALUES ('kept')"))
            .unwrap();
        assert_eq!(keys.len(), 1);
        conn.rollback().unwrap();
        assert_eq!(count(&mut conn), 1);
    }

    #[test]
    fn failed_commit_keeps_transaction_for_rollback() {
        let mut conn = open_with_deferred_child();
        conn.set_auto_commit(false).unwrap();
        conn.execute(&Statement::new("INSERT INTO child (parent_id) VALUES (999)"))
            .unwrap();
        assert!(conn.commit().is_err());
        conn.rollback().unwrap();
        conn.set_auto_commit(true).unwrap();
        let orphans = conn
            .query(&Statement::new("SELECT COUNT(*) AS n FROM child"))
            .unwrap()
            .first()
            .unwrap()
            .get_long("n")
            .unwrap();
        assert_eq!(orphans, Some(0));
    }

    #[test]
    fn prepared_handle_reports_parameter_count() {
        let mut conn = open_memory();
        let handle = conn.prepare("INSERT INTO t (name) VALUES (?1)").unwrap();
        assert_eq!(handle.parameter_count(), 1);
    }

    #[test]
    fn query_keeps_nulls_and_column_names() {
        let mut conn = open_memory();
        conn.execute(&Statement::new("INSERT INTO t (name) VALUES (NULL)"))
            .unwrap();
        let rows = conn.query(&Statement::new("SELECT id, name FROM t")).unwrap();
        assert_eq!(rows.columns(), &["id".to_string(), "name".to_string()]);
        assert!(rows.first().unwrap().is_null("name").unwrap());
    }

    #[test]
    fn rowid_range_edges() {
        assert!(rowid_range(0, 0).is_empty());
        assert!(rowid_range(5, 0).is_empty());
        assert_eq!(rowid_range(5, 1), BTreeSet::from([5]));
        assert_eq!(rowid_range(5, 3), BTreeSet::from([3, 4, 5]));
    }
}
