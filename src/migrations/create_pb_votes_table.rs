use gantry_db::{Migration, Result, Schema};

pub struct CreatePbVotesTable;

impl Migration for CreatePbVotesTable {
    fn name(&self) -> &'static str {
        "create_pb_votes_table"
    }

    fn created_at(&self) -> &'static str {
        "Thursday, April 2nd, 2020 11:38 PM"
    }

    fn up(&self, schema: &Schema) -> Result<bool> {
        schema.create_if_not_exists("pb_votes", |t| {
            let _ = t.increments("id");
            let _ = t.string("question", 255);
            let _ = t.integer("total_votes").default_raw("0");
            let _ = t.string("vote_id", 64);
            let _ = t.long("guild_id");
            t.timestamps();
        })
    }

    fn down(&self, schema: &Schema) -> Result<bool> {
        schema.drop_if_exists("pb_votes")
    }
}
