//! # gantry
//!
//! Operator CLI: applies and reverts the application's migrations and runs
//! ad-hoc queries against the configured database.

#![deny(unsafe_code)]

mod migrations;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gantry_db::{Database, Migrator};
use gantry_settings::GantrySettings;
use gantry_telemetry::TelemetryConfig;

/// Gantry database tool.
#[derive(Parser, Debug)]
#[command(name = "gantry", about = "Gantry database tool")]
struct Cli {
    /// Settings file (defaults to `~/.gantry/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply every pending migration as one batch.
    Migrate,
    /// Revert the most recent migration batches.
    Rollback {
        /// Number of batches to revert.
        #[arg(long, default_value_t = 1)]
        steps: u32,
    },
    /// List migrations and the batch that applied each.
    Status,
    /// Run a SELECT and print each row as a JSON object on its own line.
    Query {
        /// SQL text.
        sql: String,
    },
}

fn load_settings(path: Option<&PathBuf>) -> Result<GantrySettings> {
    match path {
        Some(path) => gantry_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => gantry_settings::load_settings().context("Failed to load settings"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.settings.as_ref())?;

    let telemetry =
        TelemetryConfig::from_level_name(&settings.logging.level, settings.logging.json)
            .with_module_levels(&settings.logging.modules);
    gantry_telemetry::init_telemetry(&telemetry).context("Failed to initialize telemetry")?;

    let db = Database::from_settings(&settings.database).context("Invalid database settings")?;
    db.connect().context("Database is unavailable")?;
    tracing::info!(backend = %db.backend(), "database connected");

    let outcome = run(&db, cli.command);
    db.close().context("Failed to close database")?;
    outcome
}

fn run(db: &Database, command: Command) -> Result<()> {
    let mut out = std::io::stdout().lock();
    match command {
        Command::Migrate => {
            let migrator = migrator(db)?;
            let applied = migrator.run().context("Migration failed")?;
            if applied.is_empty() {
                writeln!(out, "Nothing to migrate.")?;
            }
            for name in applied {
                writeln!(out, "Migrated: {name}")?;
            }
        }
        Command::Rollback { steps } => {
            let migrator = migrator(db)?;
            let reverted = migrator.rollback(steps).context("Rollback failed")?;
            if reverted.is_empty() {
                writeln!(out, "Nothing to roll back.")?;
            }
            for name in reverted {
                writeln!(out, "Rolled back: {name}")?;
            }
        }
        Command::Status => {
            let migrator = migrator(db)?;
            for status in migrator.status().context("Failed to read migration status")? {
                let batch = status
                    .batch
                    .map_or_else(|| "pending".to_string(), |b| format!("batch {b}"));
                writeln!(out, "{:<52} {:<36} {batch}", status.name, status.created_at)?;
            }
        }
        Command::Query { sql } => {
            let rows = db.query(sql.as_str()).context("Query failed")?;
            for row in &rows {
                serde_json::to_writer(&mut out, row)?;
                writeln!(out)?;
            }
            tracing::debug!(rows = rows.size(), "query complete");
        }
    }
    Ok(())
}

fn migrator(db: &Database) -> Result<Migrator> {
    let registry = migrations::registry().context("Invalid migration registry")?;
    Ok(Migrator::new(db.clone(), registry))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
