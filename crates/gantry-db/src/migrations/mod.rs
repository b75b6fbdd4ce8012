//! Versioned schema migrations.
//!
//! Applied migrations are recorded in a bookkeeping table, one row per
//! migration name, tagged with the batch (run number) that applied them.
//! [`Migrator::run`] applies everything not yet recorded, in registry
//! order, as one new batch. The first failure stops the run; migrations
//! applied before it stay recorded.

mod registry;

pub use registry::{MigrationRegistry, parse_created_at};

use std::collections::HashSet;

use tracing::{info, instrument, warn};

use crate::database::Database;
use crate::errors::{DbError, Result};
use crate::query::{Direction, QueryBuilder};
use crate::schema::Schema;

/// Default bookkeeping table.
pub const MIGRATIONS_TABLE: &str = "migrations";

/// A schema change with forward and reverse operations.
///
/// Both operations should be safe to call when the schema is already in
/// the target state, typically by checking [`Schema::has_table`] or
/// [`Schema::has_column`] first. Returning `Ok(false)` counts as a failure.
pub trait Migration: Send + Sync {
    /// Identifier stored in the bookkeeping table. Never change it once shipped.
    fn name(&self) -> &'static str;

    /// Human-readable creation time, e.g. `"Sat, May 7, 2022 10:11 PM"`.
    fn created_at(&self) -> &'static str;

    /// Apply the change.
    fn up(&self, schema: &Schema) -> Result<bool>;

    /// Revert the change.
    fn down(&self, schema: &Schema) -> Result<bool>;
}

/// A bookkeeping row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedMigration {
    /// Row id.
    pub id: i64,
    /// Migration name.
    pub name: String,
    /// Batch that applied it.
    pub batch: i64,
}

/// Registry entry joined with its bookkeeping row, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Migration name.
    pub name: &'static str,
    /// Declared creation time.
    pub created_at: &'static str,
    /// Batch that applied it, `None` while pending.
    pub batch: Option<i64>,
}

/// Applies and reverts a [`MigrationRegistry`] against a [`Database`].
#[derive(Debug)]
pub struct Migrator {
    db: Database,
    registry: MigrationRegistry,
    table: String,
}

impl Migrator {
    /// Migrator using the default bookkeeping table.
    pub fn new(db: Database, registry: MigrationRegistry) -> Self {
        Self {
            db,
            registry,
            table: MIGRATIONS_TABLE.to_string(),
        }
    }

    /// Use a different bookkeeping table.
    #[must_use]
    pub fn with_table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    /// The registry being applied.
    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    fn schema(&self) -> Schema {
        self.db.schema()
    }

    fn ensure_table(&self) -> Result<()> {
        let _ = self.schema().create_if_not_exists(&self.table, |t| {
            let _ = t.increments("id");
            let _ = t.string("migration", 255).unique();
            let _ = t.integer("batch");
            let _ = t.timestamp("created_at").nullable();
        })?;
        Ok(())
    }

    /// Bookkeeping rows in apply order.
    pub fn applied(&self) -> Result<Vec<AppliedMigration>> {
        self.ensure_table()?;
        let rows = self.db.query(
            QueryBuilder::table(&self.table)
                .select(["id", "migration", "batch"])
                .order_by("batch", Direction::Asc)
                .order_by("id", Direction::Asc),
        )?;
        rows.iter()
            .map(|row| -> Result<AppliedMigration> {
                Ok(AppliedMigration {
                    id: row.get_long("id")?.unwrap_or_default(),
                    name: row.get_string("migration")?.unwrap_or_default(),
                    batch: row.get_long("batch")?.unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Names of registered migrations not applied yet, in apply order.
    pub fn pending(&self) -> Result<Vec<&'static str>> {
        let applied: HashSet<String> = self.applied()?.into_iter().map(|a| a.name).collect();
        Ok(self
            .registry
            .iter()
            .map(Migration::name)
            .filter(|name| !applied.contains(*name))
            .collect())
    }

    /// Apply every pending migration as one new batch. Returns the names applied.
    ///
    /// # Errors
    ///
    /// [`DbError::Migration`] naming the first migration that failed.
    #[instrument(skip_all, fields(table = %self.table))]
    pub fn run(&self) -> Result<Vec<&'static str>> {
        let applied = self.applied()?;
        let done: HashSet<&str> = applied.iter().map(|a| a.name.as_str()).collect();
        let batch = applied.iter().map(|a| a.batch).max().unwrap_or(0) + 1;
        let schema = self.schema();

        let mut ran = Vec::new();
        for migration in self.registry.iter().filter(|m| !done.contains(m.name())) {
            let name = migration.name();
            info!(migration = name, batch, "migrating");
            match migration.up(&schema) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(DbError::migration(format!("{name}: up reported failure")));
                }
                Err(e) => return Err(DbError::migration(format!("{name}: {e}"))),
            }
            let _ = self.db.execute(
                QueryBuilder::insert_into(&self.table)
                    .set("migration", name)
                    .set("batch", batch)
                    .set_raw("created_at", "CURRENT_TIMESTAMP"),
            )?;
            info!(migration = name, batch, "migrated");
            ran.push(name);
        }

        if ran.is_empty() {
            info!("nothing to migrate");
        }
        Ok(ran)
    }

    /// Revert the last `steps` batches, newest first. Returns the names reverted.
    #[instrument(skip_all, fields(table = %self.table, steps))]
    pub fn rollback(&self, steps: u32) -> Result<Vec<String>> {
        let applied = self.applied()?;
        let mut batches: Vec<i64> = applied.iter().map(|a| a.batch).collect();
        batches.sort_unstable();
        batches.dedup();
        let keep = batches.len().saturating_sub(steps as usize);
        let targets: HashSet<i64> = batches[keep..].iter().copied().collect();

        let schema = self.schema();
        let mut reverted = Vec::new();
        for record in applied.iter().rev().filter(|a| targets.contains(&a.batch)) {
            let Some(migration) = self.registry.get(&record.name) else {
                warn!(migration = %record.name, "recorded migration is not registered");
                return Err(DbError::migration(format!(
                    "{}: recorded in batch {} but not registered",
                    record.name, record.batch
                )));
            };
            info!(migration = %record.name, batch = record.batch, "rolling back");
            match migration.down(&schema) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(DbError::migration(format!(
                        "{}: down reported failure",
                        record.name
                    )));
                }
                Err(e) => return Err(DbError::migration(format!("{}: {e}", record.name))),
            }
            let _ = self.db.execute(
                QueryBuilder::delete_from(&self.table).where_eq("id", record.id),
            )?;
            info!(migration = %record.name, "rolled back");
            reverted.push(record.name.clone());
        }
        Ok(reverted)
    }

    /// Revert everything.
    pub fn reset(&self) -> Result<Vec<String>> {
        self.rollback(u32::MAX)
    }

    /// Every registered migration with its batch, in apply order.
    pub fn status(&self) -> Result<Vec<MigrationStatus>> {
        let applied = self.applied()?;
        Ok(self
            .registry
            .iter()
            .map(|m| MigrationStatus {
                name: m.name(),
                created_at: m.created_at(),
                batch: applied.iter().find(|a| a.name == m.name()).map(|a| a.batch),
            })
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use assert_matches::assert_matches;

    #[derive(Default)]
    struct Calls {
        up: AtomicUsize,
        down: AtomicUsize,
    }

    struct CreateTable {
        name: &'static str,
        created_at: &'static str,
        table: &'static str,
        calls: Arc<Calls>,
    }

    impl Migration for CreateTable {
        fn name(&self) -> &'static str {
            self.name
        }
        fn created_at(&self) -> &'static str {
            self.created_at
        }
        fn up(&self, schema: &Schema) -> Result<bool> {
            let _ = self.calls.up.fetch_add(1, Ordering::SeqCst);
            schema.create_if_not_exists(self.table, |t| {
                let _ = t.increments("id");
            })
        }
        fn down(&self, schema: &Schema) -> Result<bool> {
            let _ = self.calls.down.fetch_add(1, Ordering::SeqCst);
            schema.drop_if_exists(self.table)
        }
    }

    struct Refuses;

    impl Migration for Refuses {
        fn name(&self) -> &'static str {
            "refuses"
        }
        fn created_at(&self) -> &'static str {
            "Mon, Jan 1, 2024 9:00 AM"
        }
        fn up(&self, _schema: &Schema) -> Result<bool> {
            Ok(false)
        }
        fn down(&self, _schema: &Schema) -> Result<bool> {
            Ok(true)
        }
    }

    fn create(name: &'static str, created_at: &'static str, calls: &Arc<Calls>) -> Box<dyn Migration> {
        Box::new(CreateTable {
            name,
            created_at,
            table: name,
            calls: Arc::clone(calls),
        })
    }

    fn migrator(db: &Database, calls: &Arc<Calls>) -> Migrator {
        let registry = MigrationRegistry::new(vec![
            create("second", "Sat, Dec 14, 2022 9:50 PM", calls),
            create("first", "Sat, May 7, 2022 10:11 PM", calls),
        ])
        .unwrap();
        Migrator::new(db.clone(), registry)
    }

    #[test]
    fn run_applies_in_timestamp_order() {
        let db = Database::in_memory();
        let calls = Arc::new(Calls::default());
        let migrator = migrator(&db, &calls);
        assert_eq!(migrator.pending().unwrap(), vec!["first", "second"]);
        assert_eq!(migrator.run().unwrap(), vec!["first", "second"]);
        assert!(db.schema().has_table("first").unwrap());
        assert!(db.schema().has_table("second").unwrap());
        let applied = migrator.applied().unwrap();
        assert_eq!(applied.len(), 2);
        assert!(applied.iter().all(|a| a.batch == 1));
    }

    #[test]
    fn second_run_is_a_no_op() {
        let db = Database::in_memory();
        let calls = Arc::new(Calls::default());
        let migrator = migrator(&db, &calls);
        let _ = migrator.run().unwrap();
        let ups = calls.up.load(Ordering::SeqCst);
        assert!(migrator.run().unwrap().is_empty());
        assert_eq!(calls.up.load(Ordering::SeqCst), ups);
        assert_eq!(migrator.applied().unwrap().len(), 2);
    }

    #[test]
    fn later_runs_get_new_batches() {
        let db = Database::in_memory();
        let calls = Arc::new(Calls::default());
        let first = Migrator::new(
            db.clone(),
            MigrationRegistry::new(vec![create("a", "Sat, May 7, 2022 10:11 PM", &calls)]).unwrap(),
        );
        let _ = first.run().unwrap();
        let both = Migrator::new(
            db.clone(),
            MigrationRegistry::new(vec![
                create("a", "Sat, May 7, 2022 10:11 PM", &calls),
                create("b", "Sat, Dec 14, 2022 9:50 PM", &calls),
            ])
            .unwrap(),
        );
        assert_eq!(both.run().unwrap(), vec!["b"]);
        let status = both.status().unwrap();
        assert_eq!(status[0].batch, Some(1));
        assert_eq!(status[1].batch, Some(2));

        assert_eq!(both.rollback(1).unwrap(), vec!["b".to_string()]);
        assert!(!db.schema().has_table("b").unwrap());
        assert!(db.schema().has_table("a").unwrap());
        assert_eq!(both.pending().unwrap(), vec!["b"]);
    }

    #[test]
    fn reset_reverts_everything_newest_first() {
        let db = Database::in_memory();
        let calls = Arc::new(Calls::default());
        let migrator = migrator(&db, &calls);
        let _ = migrator.run().unwrap();
        assert_eq!(
            migrator.reset().unwrap(),
            vec!["second".to_string(), "first".to_string()]
        );
        assert_eq!(calls.down.load(Ordering::SeqCst), 2);
        assert!(migrator.applied().unwrap().is_empty());
        assert!(migrator.rollback(1).unwrap().is_empty());
    }

    #[test]
    fn failing_up_aborts_and_is_not_recorded() {
        let db = Database::in_memory();
        let calls = Arc::new(Calls::default());
        let registry = MigrationRegistry::new(vec![
            create("early", "Sat, May 7, 2022 10:11 PM", &calls),
            Box::new(Refuses),
            create("late", "Tue, Dec 31, 2024 11:59 PM", &calls),
        ])
        .unwrap();
        let migrator = Migrator::new(db.clone(), registry);
        assert_matches!(
            migrator.run(),
            Err(DbError::Migration { message }) if message.starts_with("refuses")
        );
        let applied: Vec<String> = migrator.applied().unwrap().into_iter().map(|a| a.name).collect();
        assert_eq!(applied, vec!["early".to_string()]);
        assert!(!db.schema().has_table("late").unwrap());
    }

    #[test]
    fn custom_table_name() {
        let db = Database::in_memory();
        let calls = Arc::new(Calls::default());
        let migrator = migrator(&db, &calls).with_table("schema_history");
        let _ = migrator.run().unwrap();
        assert!(db.schema().has_table("schema_history").unwrap());
        assert!(!db.schema().has_table(MIGRATIONS_TABLE).unwrap());
    }
}
