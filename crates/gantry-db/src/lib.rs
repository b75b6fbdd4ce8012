//! # gantry-db
//!
//! Relational database access layer over interchangeable SQL backends.
//!
//! - [`connection`]: one live connection per backend (`SQLite`, `PostgreSQL`)
//! - [`query`]: fluent builder rendering parameterized statements
//! - [`database`]: the execution engine, with transient-failure retry and
//!   transactional batches
//! - [`schema`] / [`migrations`]: table definitions and versioned migrations
//! - [`collection`]: materialized result sets with typed, NULL-aware getters
//!
//! ## Quick start
//!
//! ```ignore
//! let db = Database::in_memory();
//! db.schema().create("t", |t| {
//!     t.increments("id");
//!     t.string("name", 64);
//! })?;
//! let ids = db.insert(QueryBuilder::insert_into("t").set("name", "a"))?;
//! let rows = db.query(QueryBuilder::table("t"))?;
//! ```

#![deny(unsafe_code)]

pub mod batch;
pub mod collection;
pub mod connection;
pub mod database;
pub mod dialect;
pub mod errors;
pub mod migrations;
pub mod query;
pub mod retry;
pub mod schema;
pub mod statement;
pub mod value;

pub use batch::BatchStatement;
pub use collection::{Row, RowCollection};
pub use connection::{Connection, SqliteConnection, StatementHandle};
#[cfg(feature = "postgres")]
pub use connection::PostgresConnection;
pub use database::{Database, DatabaseOptions, StatsSnapshot};
pub use dialect::{Backend, ColumnType};
pub use errors::{DbError, ErrorClass, Result, is_transient};
pub use migrations::{Migration, MigrationRegistry, MigrationStatus, Migrator};
pub use query::{Conditions, Direction, Operator, QueryBuilder};
pub use retry::RetryPolicy;
pub use schema::{Blueprint, ColumnDef, Schema};
pub use statement::{IntoStatement, Statement};
pub use value::Value;
