//! Schema operations used by migrations.

mod blueprint;

pub use blueprint::{Blueprint, ColumnDef};

use tracing::info;

use crate::database::Database;
use crate::dialect::Backend;
use crate::errors::Result;
use crate::statement::Statement;

/// Table-level DDL bound to a [`Database`].
#[derive(Clone, Debug)]
pub struct Schema {
    db: Database,
}

impl Schema {
    /// Schema helper for `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The engine behind this schema, for statements the helpers do not cover.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Backend of the underlying engine.
    pub fn backend(&self) -> Backend {
        self.db.backend()
    }

    /// `CREATE TABLE`. Fails if the table exists.
    pub fn create(&self, table: &str, define: impl FnOnce(&mut Blueprint)) -> Result<()> {
        let mut blueprint = Blueprint::new(table);
        define(&mut blueprint);
        let _ = self
            .db
            .execute(blueprint.create_sql(self.backend(), false)?)?;
        info!(table, "table created");
        Ok(())
    }

    /// Create the table unless it already exists. Returns `true` either way
    /// once the table is present, matching the migration `up` contract.
    pub fn create_if_not_exists(&self, table: &str, define: impl FnOnce(&mut Blueprint)) -> Result<bool> {
        if self.has_table(table)? {
            return Ok(true);
        }
        let mut blueprint = Blueprint::new(table);
        define(&mut blueprint);
        let _ = self.db.execute(blueprint.create_sql(self.backend(), true)?)?;
        info!(table, "table created");
        Ok(true)
    }

    /// `DROP TABLE`. Fails if the table does not exist.
    pub fn drop(&self, table: &str) -> Result<()> {
        let table_sql = self.backend().quote_ident(table)?;
        let _ = self.db.execute(format!("DROP TABLE {table_sql}"))?;
        info!(table, "table dropped");
        Ok(())
    }

    /// `DROP TABLE IF EXISTS`. Returns `true` once the table is gone.
    pub fn drop_if_exists(&self, table: &str) -> Result<bool> {
        let table_sql = self.backend().quote_ident(table)?;
        let _ = self.db.execute(format!("DROP TABLE IF EXISTS {table_sql}"))?;
        info!(table, "table dropped if present");
        Ok(true)
    }

    /// Whether `table` exists.
    pub fn has_table(&self, table: &str) -> Result<bool> {
        let rows = self.db.query(self.backend().has_table_statement(table))?;
        Ok(!rows.is_empty())
    }

    /// Whether `table` has a column named `column`.
    pub fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let rows = self
            .db
            .query(self.backend().has_column_statement(table, column))?;
        Ok(!rows.is_empty())
    }

    /// Add the columns declared by `define`, one `ADD COLUMN` each. Columns
    /// that already exist are skipped. Returns how many were added.
    ///
    /// `SQLite` rejects adding a `NOT NULL` column without a default, so
    /// new columns are usually `nullable()` or carry `default_raw`.
    pub fn alter(&self, table: &str, define: impl FnOnce(&mut Blueprint)) -> Result<usize> {
        let mut blueprint = Blueprint::new(table);
        define(&mut blueprint);
        let backend = self.backend();
        let mut added = 0;
        for column in blueprint.columns() {
            if self.has_column(table, column.name())? {
                continue;
            }
            let sql = backend.add_column_sql(table, &column.sql(backend)?)?;
            let _ = self.db.execute(Statement::new(sql))?;
            info!(table, column = column.name(), "column added");
            added += 1;
        }
        Ok(added)
    }

    /// Drop `column` if present. Returns whether anything was dropped.
    pub fn drop_column(&self, table: &str, column: &str) -> Result<bool> {
        if !self.has_column(table, column)? {
            return Ok(false);
        }
        let _ = self
            .db
            .execute(self.backend().drop_column_sql(table, column)?)?;
        info!(table, column, "column dropped");
        Ok(true)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Database::in_memory().schema()
    }

    #[test]
    fn create_and_detect_table() {
        let schema = schema();
        assert!(!schema.has_table("t").unwrap());
        schema
            .create("t", |t| {
                let _ = t.increments("id");
                let _ = t.string("name", 64);
            })
            .unwrap();
        assert!(schema.has_table("t").unwrap());
        assert!(schema.has_column("t", "name").unwrap());
        assert!(schema.has_column("t", "NAME").unwrap());
        assert!(!schema.has_column("t", "missing").unwrap());
        assert!(schema.create("t", |t| { let _ = t.increments("id"); }).is_err());
    }

    #[test]
    fn create_if_not_exists_is_idempotent() {
        let schema = schema();
        let define = |t: &mut Blueprint| {
            let _ = t.increments("id");
        };
        assert!(schema.create_if_not_exists("t", define).unwrap());
        assert!(schema.create_if_not_exists("t", define).unwrap());
        assert!(schema.has_table("t").unwrap());
    }

    #[test]
    fn drop_if_exists_tolerates_absence() {
        let schema = schema();
        assert!(schema.drop_if_exists("nope").unwrap());
        assert!(schema.drop("nope").is_err());
        schema.create("t", |t| { let _ = t.increments("id"); }).unwrap();
        schema.drop("t").unwrap();
        assert!(!schema.has_table("t").unwrap());
    }

    #[test]
    fn alter_adds_missing_columns_only() {
        let schema = schema();
        schema
            .create("t", |t| {
                let _ = t.increments("id");
                let _ = t.text("a").nullable();
            })
            .unwrap();
        let added = schema
            .alter("t", |t| {
                let _ = t.text("a").nullable();
                let _ = t.integer("b").default_raw("0");
            })
            .unwrap();
        assert_eq!(added, 1);
        assert!(schema.has_column("t", "b").unwrap());
        assert_eq!(schema.alter("t", |t| { let _ = t.integer("b").default_raw("0"); }).unwrap(), 0);
    }

    #[test]
    fn drop_column_reports_whether_it_dropped() {
        let schema = schema();
        schema
            .create("t", |t| {
                let _ = t.increments("id");
                let _ = t.text("a").nullable();
            })
            .unwrap();
        assert!(schema.drop_column("t", "a").unwrap());
        assert!(!schema.has_column("t", "a").unwrap());
        assert!(!schema.drop_column("t", "a").unwrap());
    }
}
