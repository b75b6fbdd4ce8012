use gantry_db::{Migration, Result, Schema};

pub struct AddAuditLogIgnoredChannels;

const TABLE: &str = "guilds";
const COLUMN: &str = "ignored_audit_log_channels";

impl Migration for AddAuditLogIgnoredChannels {
    fn name(&self) -> &'static str {
        "add_audit_log_ignored_channels_to_guilds_table"
    }

    fn created_at(&self) -> &'static str {
        "Sat, May 7, 2022 10:11 PM"
    }

    fn up(&self, schema: &Schema) -> Result<bool> {
        if schema.has_column(TABLE, COLUMN)? {
            return Ok(true);
        }
        let _ = schema.alter(TABLE, |t| {
            let _ = t.text(COLUMN).nullable();
        })?;
        Ok(true)
    }

    fn down(&self, schema: &Schema) -> Result<bool> {
        let _ = schema.drop_column(TABLE, COLUMN)?;
        Ok(true)
    }
}
