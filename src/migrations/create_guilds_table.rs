use gantry_db::{Migration, Result, Schema};

pub struct CreateGuildsTable;

impl Migration for CreateGuildsTable {
    fn name(&self) -> &'static str {
        "create_guilds_table"
    }

    fn created_at(&self) -> &'static str {
        "Wed, Jan 1, 2020 12:00 PM"
    }

    fn up(&self, schema: &Schema) -> Result<bool> {
        schema.create_if_not_exists("guilds", |t| {
            let _ = t.increments("id");
            let _ = t.long("guild_id").unique();
            let _ = t.string("prefix", 16).default_raw("'.'");
            let _ = t.text("level_exempt_channels").nullable();
            t.timestamps();
        })
    }

    fn down(&self, schema: &Schema) -> Result<bool> {
        schema.drop_if_exists("guilds")
    }
}
