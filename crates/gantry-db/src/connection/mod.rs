//! Connection provider.
//!
//! A [`Connection`] owns one live link to a concrete backend. Statement
//! handles borrow the connection mutably, so a handle can never outlive it
//! and is released on every exit path when it goes out of scope.
//!
//! Transactions follow the auto-commit model: while auto-commit is on every
//! statement commits on its own. Turning it off makes the next statement
//! implicitly open a transaction that lasts until [`Connection::commit`] or
//! [`Connection::rollback`]. Turning it back on commits whatever is open.

use std::collections::BTreeSet;

use crate::collection::RowCollection;
use crate::dialect::Backend;
use crate::errors::Result;
use crate::statement::Statement;
use crate::value::Value;

#[cfg(test)]
pub(crate) mod fake;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sqlite;

#[cfg(feature = "postgres")]
pub use self::postgres::PostgresConnection;
pub use self::sqlite::SqliteConnection;

/// A prepared statement borrowed from its connection.
pub trait StatementHandle {
    /// Number of positional parameters the statement expects.
    fn parameter_count(&self) -> usize;

    /// Run the statement with `params` and return the affected-row count.
    fn execute(&mut self, params: &[Value]) -> Result<u64>;

    /// Run the statement with `params` and materialize every row.
    fn query(&mut self, params: &[Value]) -> Result<RowCollection>;
}

/// One live connection to one backend.
pub trait Connection: Send {
    /// Which backend this connection talks to.
    fn backend(&self) -> Backend;

    /// Open the connection. Opening an open connection is a no-op.
    fn open(&mut self) -> Result<()>;

    /// Whether the connection is currently usable.
    fn is_open(&self) -> bool;

    /// Close the connection, dropping any open transaction.
    fn close(&mut self) -> Result<()>;

    /// Prepare `sql`. When auto-commit is off this is where an implicit
    /// transaction begins.
    fn prepare<'c>(&'c mut self, sql: &str) -> Result<Box<dyn StatementHandle + 'c>>;

    /// Run a read statement.
    fn query(&mut self, stmt: &Statement) -> Result<RowCollection> {
        let mut handle = self.prepare(stmt.sql())?;
        handle.query(stmt.params())
    }

    /// Run a write statement and return the affected-row count.
    fn execute(&mut self, stmt: &Statement) -> Result<u64> {
        let mut handle = self.prepare(stmt.sql())?;
        handle.execute(stmt.params())
    }

    /// Run an INSERT and return every generated key.
    fn insert(&mut self, stmt: &Statement) -> Result<BTreeSet<i64>>;

    /// Enable or disable auto-commit. Enabling commits an open transaction.
    fn set_auto_commit(&mut self, enabled: bool) -> Result<()>;

    /// Current auto-commit mode.
    fn auto_commit(&self) -> bool;

    /// Commit the open transaction, if any.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction, if any.
    fn rollback(&mut self) -> Result<()>;
}
