//! Application schema history.
//!
//! New migrations get their own module and an entry in [`registry`]. The
//! registry sorts by `created_at`, so the order of the list below does not
//! matter.

mod add_audit_log_ignored_channels;
mod create_appeal_tickets_table;
mod create_guilds_table;
mod create_pb_votes_table;

use gantry_db::{Migration, MigrationRegistry, Result};

/// Every migration the application ships.
pub fn registry() -> Result<MigrationRegistry> {
    let migrations: Vec<Box<dyn Migration>> = vec![
        Box::new(create_guilds_table::CreateGuildsTable),
        Box::new(create_pb_votes_table::CreatePbVotesTable),
        Box::new(add_audit_log_ignored_channels::AddAuditLogIgnoredChannels),
        Box::new(create_appeal_tickets_table::CreateAppealTicketsTable),
    ];
    MigrationRegistry::new(migrations)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
