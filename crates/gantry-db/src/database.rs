//! Execution engine.
//!
//! [`Database`] is the handle every collaborator uses. It owns one
//! [`Connection`] behind a mutex and adds:
//!
//! - lazy (re)opening of a closed connection before each call
//! - bounded retry of transient failures for `query`, `execute` and `insert`
//! - transactional batches that share the connection safely with other
//!   callers and with each other
//!
//! # Batches
//!
//! Auto-commit is switched off when the first concurrent batch starts and
//! back on when the last one finishes, whatever order they finish in. The
//! fill callback runs without holding the connection lock. Executing the
//! rows and committing happen in one critical section, after any implicit
//! work queued through [`Database::with_connection`] has been committed, so
//! a rollback only ever discards the batch's own rows. The last batch out
//! commits by restoring auto-commit inside that critical section, so a
//! failed restore fails the batch. A failed batch is rolled back, logged and
//! returned to the caller as [`DbError::Batch`]. Batches are never retried.
//!
//! `query`, `execute` and `insert` calls that land while auto-commit is off
//! commit on their own before the connection lock is released, or roll back
//! and return the error.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use gantry_settings::{BackendKind, DatabaseSettings};
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument};

use crate::batch::{BatchStatement, BatchTracker};
use crate::collection::RowCollection;
use crate::connection::{Connection, SqliteConnection};
use crate::dialect::Backend;
use crate::errors::{DbError, Result};
use crate::retry::RetryPolicy;
use crate::schema::Schema;
use crate::statement::{IntoStatement, Statement};
use crate::value::Value;

/// Engine tuning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DatabaseOptions {
    /// Retry policy for `query`, `execute` and `insert`.
    pub retry: RetryPolicy,
}

/// Running counters, readable through [`Database::stats`].
#[derive(Debug, Default)]
struct DatabaseStats {
    queries: AtomicU64,
    executes: AtomicU64,
    inserts: AtomicU64,
    batches: AtomicU64,
    batch_failures: AtomicU64,
    retries: AtomicU64,
}

/// Point-in-time copy of the engine counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// `query` calls.
    pub queries: u64,
    /// `execute` calls.
    pub executes: u64,
    /// `insert` calls that reached the backend.
    pub inserts: u64,
    /// `batch` calls.
    pub batches: u64,
    /// Batches that were rolled back.
    pub batch_failures: u64,
    /// Transient failures that were retried.
    pub retries: u64,
}

fn bump(counter: &AtomicU64) {
    let _ = counter.fetch_add(1, Ordering::Relaxed);
}

struct Inner {
    conn: Mutex<Box<dyn Connection>>,
    backend: Backend,
    retry: RetryPolicy,
    batches: BatchTracker,
    stats: DatabaseStats,
}

/// Shared handle to the execution engine. Cloning is cheap.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.inner.backend)
            .field("retry", &self.inner.retry)
            .field("running_batches", &self.inner.batches.running_count())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Engine over an existing connection. Nothing is opened yet.
    pub fn new(conn: Box<dyn Connection>, options: DatabaseOptions) -> Self {
        let backend = conn.backend();
        Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                backend,
                retry: options.retry,
                batches: BatchTracker::new(),
                stats: DatabaseStats::default(),
            }),
        }
    }

    /// Engine for the configured backend.
    ///
    /// # Errors
    ///
    /// [`DbError::Configuration`] when the backend selector is missing or
    /// unknown.
    pub fn from_settings(settings: &DatabaseSettings) -> Result<Self> {
        let kind = settings
            .backend_kind()
            .map_err(|e| DbError::Configuration(e.to_string()))?;
        let conn: Box<dyn Connection> = match kind {
            BackendKind::Sqlite => Box::new(SqliteConnection::new(
                &settings.sqlite.path,
                settings.sqlite.busy_timeout_ms,
            )),
            BackendKind::Postgres => postgres_connection(settings)?,
        };
        let options = DatabaseOptions {
            retry: RetryPolicy {
                budget: settings.query_retries,
                delay: Duration::from_millis(settings.retry_delay_ms),
            },
        };
        info!(backend = %kind, retries = settings.query_retries, "database configured");
        Ok(Self::new(conn, options))
    }

    /// In-memory `SQLite` engine with default options.
    pub fn in_memory() -> Self {
        Self::new(Box::new(SqliteConnection::in_memory()), DatabaseOptions::default())
    }

    /// Backend this engine talks to.
    pub fn backend(&self) -> Backend {
        self.inner.backend
    }

    /// Open the connection now instead of on first use.
    ///
    /// # Errors
    ///
    /// [`DbError::Unavailable`] when the backend cannot be opened.
    #[instrument(skip_all, fields(backend = %self.inner.backend))]
    pub fn connect(&self) -> Result<()> {
        let mut conn = self.inner.conn.lock();
        conn.open().map_err(|e| match e {
            DbError::Unavailable(_) => e,
            other => DbError::Unavailable(other.to_string()),
        })
    }

    /// Whether the connection is currently open.
    pub fn is_open(&self) -> bool {
        self.inner.conn.lock().is_open()
    }

    /// Close the connection. A later call reopens it.
    #[instrument(skip_all, fields(backend = %self.inner.backend))]
    pub fn close(&self) -> Result<()> {
        self.inner.conn.lock().close()
    }

    /// Run a read statement.
    #[instrument(skip_all, fields(backend = %self.inner.backend))]
    pub fn query(&self, stmt: impl IntoStatement) -> Result<RowCollection> {
        let stmt = stmt.into_statement(self.inner.backend)?;
        log_statement("query", &stmt);
        bump(&self.inner.stats.queries);
        self.run_retrying(|conn| conn.query(&stmt))
    }

    /// Run a write statement and return the affected-row count.
    #[instrument(skip_all, fields(backend = %self.inner.backend))]
    pub fn execute(&self, stmt: impl IntoStatement) -> Result<u64> {
        let stmt = stmt.into_statement(self.inner.backend)?;
        log_statement("execute", &stmt);
        bump(&self.inner.stats.executes);
        self.run_retrying(|conn| conn.execute(&stmt))
    }

    /// Run an INSERT and return every generated key.
    ///
    /// # Errors
    ///
    /// [`DbError::MalformedCall`] when the statement is not an INSERT. The
    /// backend is not contacted in that case.
    #[instrument(skip_all, fields(backend = %self.inner.backend))]
    pub fn insert(&self, stmt: impl IntoStatement) -> Result<BTreeSet<i64>> {
        let stmt = stmt.into_statement(self.inner.backend)?;
        let keyword = stmt.keyword();
        if keyword != "INSERT" {
            return Err(DbError::MalformedCall(format!(
                "insert requires an INSERT statement, got {:?}",
                if keyword.is_empty() { stmt.sql() } else { keyword.as_str() }
            )));
        }
        log_statement("insert", &stmt);
        bump(&self.inner.stats.inserts);
        self.run_retrying(|conn| conn.insert(&stmt))
    }

    /// Run `stmt` once per row added by `fill`, atomically.
    ///
    /// Returns the total affected-row count.
    ///
    /// # Errors
    ///
    /// [`DbError::Batch`] wrapping the failure when `fill` or any row fails.
    /// The batch's rows are rolled back first.
    #[instrument(skip_all, fields(backend = %self.inner.backend, batch_id))]
    pub fn batch<F>(&self, stmt: impl IntoStatement, fill: F) -> Result<u64>
    where
        F: FnOnce(&mut BatchStatement) -> Result<()>,
    {
        let stmt = stmt.into_statement(self.inner.backend)?;
        if !stmt.params().is_empty() {
            return Err(DbError::MalformedCall(
                "batch statements take their parameters from the fill callback".into(),
            ));
        }
        bump(&self.inner.stats.batches);

        let inner = &*self.inner;
        let id = inner.batches.next_id();
        let _ = tracing::Span::current().record("batch_id", id);
        let mut guard = inner.begin_batch(id)?;

        let mut rows = BatchStatement::new();
        if let Err(source) = fill(&mut rows) {
            error!(batch_id = id, error = %source, "batch fill failed, nothing was sent");
            bump(&inner.stats.batch_failures);
            return Err(DbError::Batch {
                id,
                source: Box::new(source),
            });
        }
        let rows = rows.into_rows();
        debug!(batch_id = id, sql = stmt.sql(), rows = rows.len(), "batch");

        let mut conn = inner.conn.lock();
        let outcome = run_batch(conn.as_mut(), &stmt, &rows)
            .and_then(|affected| guard.finish(conn.as_mut()).map(|()| affected));
        match outcome {
            Ok(affected) => Ok(affected),
            Err(source) => {
                error!(batch_id = id, error = %source, "batch failed, rolling back");
                if let Err(e) = conn.rollback() {
                    error!(batch_id = id, error = %e, "batch rollback failed");
                }
                bump(&inner.stats.batch_failures);
                Err(DbError::Batch {
                    id,
                    source: Box::new(source),
                })
            }
        }
    }

    /// Whether any batch is running.
    pub fn has_running_batches(&self) -> bool {
        self.inner.batches.has_running()
    }

    /// Run `f` against the raw connection, opened if necessary.
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut dyn Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.inner.conn.lock();
        ensure_open(conn.as_mut())?;
        f(conn.as_mut())
    }

    /// Schema helper bound to this engine.
    pub fn schema(&self) -> Schema {
        Schema::new(self.clone())
    }

    /// Snapshot of the engine counters.
    pub fn stats(&self) -> StatsSnapshot {
        let s = &self.inner.stats;
        StatsSnapshot {
            queries: s.queries.load(Ordering::Relaxed),
            executes: s.executes.load(Ordering::Relaxed),
            inserts: s.inserts.load(Ordering::Relaxed),
            batches: s.batches.load(Ordering::Relaxed),
            batch_failures: s.batch_failures.load(Ordering::Relaxed),
            retries: s.retries.load(Ordering::Relaxed),
        }
    }

    fn run_retrying<T>(&self, mut op: impl FnMut(&mut dyn Connection) -> Result<T>) -> Result<T> {
        self.inner.retry.run(
            || {
                let mut conn = self.inner.conn.lock();
                ensure_open(conn.as_mut())?;
                let result = op(conn.as_mut());
                if conn.auto_commit() {
                    result
                } else {
                    settle_statement(conn.as_mut(), result)
                }
            },
            |_| bump(&self.inner.stats.retries),
        )
    }
}

impl Inner {
    /// Register batch `id`, disabling auto-commit if it is the first.
    fn begin_batch(&self, id: u64) -> Result<BatchGuard<'_>> {
        let mut conn = self.conn.lock();
        ensure_open(conn.as_mut())?;
        if self.batches.enter(id) {
            if let Err(source) = conn.set_auto_commit(false) {
                let _ = self.batches.leave(id);
                return Err(DbError::Batch {
                    id,
                    source: Box::new(source),
                });
            }
            debug!(batch_id = id, "auto-commit disabled");
        }
        Ok(BatchGuard {
            inner: self,
            id,
            finished: false,
        })
    }
}

/// Removes a batch from the running set on every exit path, restoring
/// auto-commit when it was the last one.
///
/// A batch that executed cleanly calls [`finish`](Self::finish) while it
/// still holds the connection. Any other exit, unwinding included, leaves
/// the set on drop, where a restore failure can only be logged.
struct BatchGuard<'a> {
    inner: &'a Inner,
    id: u64,
    finished: bool,
}

impl BatchGuard<'_> {
    /// Commit the batch's rows and leave the running set. The last batch
    /// out commits by restoring auto-commit.
    fn finish(&mut self, conn: &mut dyn Connection) -> Result<()> {
        self.finished = true;
        if self.inner.batches.leave(self.id) {
            conn.set_auto_commit(true)?;
            debug!(batch_id = self.id, "auto-commit restored");
            Ok(())
        } else {
            conn.commit()
        }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut conn = self.inner.conn.lock();
        if self.inner.batches.leave(self.id) {
            match conn.set_auto_commit(true) {
                Ok(()) => debug!(batch_id = self.id, "auto-commit restored"),
                Err(e) => error!(batch_id = self.id, error = %e, "failed to restore auto-commit"),
            }
        }
    }
}

fn run_batch(conn: &mut dyn Connection, stmt: &Statement, rows: &[Vec<Value>]) -> Result<u64> {
    ensure_open(conn)?;
    conn.commit()?;
    let mut total = 0_u64;
    {
        let mut handle = conn.prepare(stmt.sql())?;
        let expected = handle.parameter_count();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != expected {
                return Err(DbError::MalformedCall(format!(
                    "batch row {i} binds {} parameters, statement takes {expected}",
                    row.len()
                )));
            }
            total = total.saturating_add(handle.execute(row)?);
        }
    }
    Ok(total)
}

/// Close the implicit transaction a single statement opened while a batch
/// holds auto-commit off: commit on success, roll back on failure.
fn settle_statement<T>(conn: &mut dyn Connection, result: Result<T>) -> Result<T> {
    let result = result.and_then(|value| conn.commit().map(|()| value));
    if result.is_err() {
        if let Err(e) = conn.rollback() {
            error!(error = %e, "rollback of failed statement failed");
        }
    }
    result
}

fn ensure_open(conn: &mut dyn Connection) -> Result<()> {
    if !conn.is_open() {
        debug!(backend = %conn.backend(), "opening connection");
        conn.open()?;
    }
    Ok(())
}

fn log_statement(kind: &'static str, stmt: &Statement) {
    debug!(kind, sql = stmt.sql(), params = stmt.params().len(), "statement");
}

#[cfg(feature = "postgres")]
fn postgres_connection(settings: &DatabaseSettings) -> Result<Box<dyn Connection>> {
    Ok(Box::new(crate::connection::PostgresConnection::new(
        settings.postgres.url.clone(),
        Duration::from_millis(settings.postgres.connect_timeout_ms),
        settings.postgres.generated_key_column.clone(),
    )))
}

#[cfg(not(feature = "postgres"))]
fn postgres_connection(_settings: &DatabaseSettings) -> Result<Box<dyn Connection>> {
    Err(DbError::Configuration(
        "postgres backend selected but gantry-db was built without the `postgres` feature".into(),
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
