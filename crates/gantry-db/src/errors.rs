//! Error types for the database layer.
//!
//! [`DbError`] is returned by every operation. Retry decisions never match on
//! variants directly; they go through [`DbError::class`] / [`is_transient`],
//! which map backend error codes onto the small [`ErrorClass`] taxonomy.

use thiserror::Error;

/// Errors that can occur in the database layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// `SQLite` backend error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// `PostgreSQL` backend error.
    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),

    /// The backend could not be reached or opened.
    #[error("database unavailable: {0}")]
    Unavailable(String),

    /// Invalid or missing configuration (e.g. unknown backend selector).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The call itself was wrong, e.g. `insert` with a non-INSERT statement.
    #[error("malformed call: {0}")]
    MalformedCall(String),

    /// A query builder state that cannot be rendered.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A row was asked for a column the result set does not have.
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// A column value could not be coerced to the requested type.
    #[error("type mismatch for column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Column name as requested.
        column: String,
        /// Requested type.
        expected: &'static str,
        /// Stored value kind.
        found: &'static str,
    },

    /// `first()` on an empty collection.
    #[error("result set is empty")]
    EmptyResult,

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// A batch failed and was rolled back.
    #[error("batch {id} rolled back: {source}")]
    Batch {
        /// Batch identifier.
        id: u64,
        /// What made the batch fail.
        #[source]
        source: Box<DbError>,
    },

    /// A statement failed inside the open transaction, so the server
    /// discarded it. The transaction was rolled back instead of committed.
    #[error("transaction aborted by an earlier failed statement and rolled back")]
    TransactionAborted,

    /// The backend returned a column type this layer does not map.
    #[error("unsupported column type: {0}")]
    UnsupportedType(String),
}

/// Convenience type alias for database results.
pub type Result<T> = std::result::Result<T, DbError>;

/// Coarse classification driving retry/propagation decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rollback/deadlock/busy class, expected to succeed shortly after.
    Transient,
    /// The backend gave up on the statement (statement timeout, interrupt).
    Timeout,
    /// Programmer error in how the layer was called.
    MalformedCall,
    /// Configuration or availability problem.
    Configuration,
    /// A batch that was rolled back.
    Batch,
    /// Any other SQL or data error.
    Sql,
}

impl DbError {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Sqlite(e) => classify_sqlite(e),
            #[cfg(feature = "postgres")]
            Self::Postgres(e) => classify_postgres(e),
            Self::Unavailable(_) | Self::Configuration(_) => ErrorClass::Configuration,
            Self::MalformedCall(_) | Self::InvalidQuery(_) => ErrorClass::MalformedCall,
            Self::Batch { .. } => ErrorClass::Batch,
            Self::ColumnNotFound(_)
            | Self::TypeMismatch { .. }
            | Self::EmptyResult
            | Self::Migration { .. }
            | Self::TransactionAborted
            | Self::UnsupportedType(_) => ErrorClass::Sql,
        }
    }

    pub(crate) fn migration(message: impl Into<String>) -> Self {
        Self::Migration {
            message: message.into(),
        }
    }
}

/// Whether an error belongs to the transient class that the engine retries.
pub fn is_transient(err: &DbError) -> bool {
    err.class() == ErrorClass::Transient
}

fn classify_sqlite(err: &rusqlite::Error) -> ErrorClass {
    use rusqlite::ErrorCode;

    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => ErrorClass::Transient,
        Some(ErrorCode::OperationInterrupted) => ErrorClass::Timeout,
        _ => ErrorClass::Sql,
    }
}

#[cfg(feature = "postgres")]
fn classify_postgres(err: &postgres::Error) -> ErrorClass {
    use postgres::error::SqlState;

    match err.code() {
        Some(code)
            if *code == SqlState::T_R_SERIALIZATION_FAILURE
                || *code == SqlState::T_R_DEADLOCK_DETECTED =>
        {
            ErrorClass::Transient
        }
        Some(code) if *code == SqlState::QUERY_CANCELED => ErrorClass::Timeout,
        _ if err.is_closed() => ErrorClass::Configuration,
        _ => ErrorClass::Sql,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A `SQLITE_BUSY` failure, the transient class on the embedded engine.
    pub(crate) fn busy() -> DbError {
        DbError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        ))
    }

    #[test]
    fn busy_is_transient() {
        assert!(is_transient(&busy()));
        assert_eq!(busy().class(), ErrorClass::Transient);
    }

    #[test]
    fn locked_is_transient() {
        let err = DbError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            None,
        ));
        assert!(is_transient(&err));
    }

    #[test]
    fn interrupt_is_timeout_not_transient() {
        let err = DbError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_INTERRUPT),
            None,
        ));
        assert_eq!(err.class(), ErrorClass::Timeout);
        assert!(!is_transient(&err));
    }

    #[test]
    fn constraint_violation_is_sql() {
        let err = DbError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed".to_string()),
        ));
        assert_eq!(err.class(), ErrorClass::Sql);
    }

    #[test]
    fn malformed_call_is_never_transient() {
        let err = DbError::MalformedCall("insert called with UPDATE".into());
        assert_eq!(err.class(), ErrorClass::MalformedCall);
        assert!(!is_transient(&err));
    }

    #[test]
    fn batch_wrapping_a_transient_error_is_not_transient() {
        let err = DbError::Batch {
            id: 3,
            source: Box::new(busy()),
        };
        assert_eq!(err.class(), ErrorClass::Batch);
        assert!(!is_transient(&err));
        assert!(err.to_string().starts_with("batch 3 rolled back"));
    }

    #[test]
    fn migration_error_display() {
        let err = DbError::migration("create_users failed: table exists");
        assert_eq!(
            err.to_string(),
            "migration error: create_users failed: table exists"
        );
    }

    #[test]
    fn from_rusqlite_error() {
        let err: DbError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, DbError::Sqlite(_)));
        assert_eq!(err.class(), ErrorClass::Sql);
    }

    #[test]
    fn unavailable_is_configuration_class() {
        let err = DbError::Unavailable("connection refused".into());
        assert_eq!(err.class(), ErrorClass::Configuration);
    }
}
