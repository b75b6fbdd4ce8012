use gantry_db::{Migration, Result, Schema};

pub struct CreateAppealTicketsTable;

impl Migration for CreateAppealTicketsTable {
    fn name(&self) -> &'static str {
        "create_appeal_tickets_table"
    }

    // Dec 14, 2022 was a Wednesday; the weekday is not checked.
    fn created_at(&self) -> &'static str {
        "Sat, Dec 14, 2022 9:50 PM"
    }

    fn up(&self, schema: &Schema) -> Result<bool> {
        schema.create_if_not_exists("appeal_tickets", |t| {
            let _ = t.long("channel_id");
            let _ = t.string("user_id", 32);
            let _ = t.integer("type");
            t.timestamps();
        })
    }

    fn down(&self, schema: &Schema) -> Result<bool> {
        schema.drop_if_exists("appeal_tickets")
    }
}
