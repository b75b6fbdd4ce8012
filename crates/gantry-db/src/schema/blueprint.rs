//! Table definitions.

use crate::dialect::{Backend, ColumnType};
use crate::errors::{DbError, Result};

/// One column of a [`Blueprint`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDef {
    name: String,
    ty: ColumnType,
    nullable: bool,
    default: Option<String>,
    unique: bool,
}

impl ColumnDef {
    fn new(name: &str, ty: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            nullable: false,
            default: None,
            unique: false,
        }
    }

    /// Allow NULL. Columns are `NOT NULL` unless marked.
    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    /// Raw SQL default such as `0`, `'none'` or `CURRENT_TIMESTAMP`.
    pub fn default_raw(&mut self, expr: impl Into<String>) -> &mut Self {
        self.default = Some(expr.into());
        self
    }

    /// Add a UNIQUE constraint.
    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column type.
    pub fn column_type(&self) -> ColumnType {
        self.ty
    }

    /// Column definition as it appears in `CREATE TABLE` / `ADD COLUMN`.
    pub fn sql(&self, backend: Backend) -> Result<String> {
        let mut sql = format!(
            "{} {}",
            backend.quote_ident(&self.name)?,
            backend.column_type_sql(self.ty)
        );
        if self.ty != ColumnType::Increments {
            sql.push_str(if self.nullable { " NULL" } else { " NOT NULL" });
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        Ok(sql)
    }
}

/// Column list for a table being created or altered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blueprint {
    table: String,
    columns: Vec<ColumnDef>,
}

impl Blueprint {
    /// Empty definition for `table`.
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
        }
    }

    fn column(&mut self, name: &str, ty: ColumnType) -> &mut ColumnDef {
        self.columns.push(ColumnDef::new(name, ty));
        let last = self.columns.len() - 1;
        &mut self.columns[last]
    }

    /// Auto-incrementing integer primary key.
    pub fn increments(&mut self, name: &str) -> &mut ColumnDef {
        self.column(name, ColumnType::Increments)
    }

    /// `VARCHAR(len)`.
    pub fn string(&mut self, name: &str, len: u32) -> &mut ColumnDef {
        self.column(name, ColumnType::String(len))
    }

    /// Unbounded text.
    pub fn text(&mut self, name: &str) -> &mut ColumnDef {
        self.column(name, ColumnType::Text)
    }

    /// 32-bit integer.
    pub fn integer(&mut self, name: &str) -> &mut ColumnDef {
        self.column(name, ColumnType::Integer)
    }

    /// 64-bit integer.
    pub fn long(&mut self, name: &str) -> &mut ColumnDef {
        self.column(name, ColumnType::Long)
    }

    /// Boolean.
    pub fn boolean(&mut self, name: &str) -> &mut ColumnDef {
        self.column(name, ColumnType::Boolean)
    }

    /// Double precision float.
    pub fn double(&mut self, name: &str) -> &mut ColumnDef {
        self.column(name, ColumnType::Double)
    }

    /// Timestamp.
    pub fn timestamp(&mut self, name: &str) -> &mut ColumnDef {
        self.column(name, ColumnType::Timestamp)
    }

    /// Nullable `created_at` and `updated_at` timestamps.
    pub fn timestamps(&mut self) {
        let _ = self.timestamp("created_at").nullable();
        let _ = self.timestamp("updated_at").nullable();
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Declared columns, in order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// `CREATE TABLE` statement.
    pub fn create_sql(&self, backend: Backend, if_not_exists: bool) -> Result<String> {
        if self.columns.is_empty() {
            return Err(DbError::InvalidQuery(format!(
                "table {} has no columns",
                self.table
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|c| c.sql(backend))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(
            "CREATE TABLE {}{} ({})",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            backend.quote_ident(&self.table)?,
            columns.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guilds() -> Blueprint {
        let mut t = Blueprint::new("guilds");
        let _ = t.increments("id");
        let _ = t.long("guild_id").unique();
        let _ = t.string("name", 255);
        let _ = t.boolean("partner").default_raw("0");
        let _ = t.text("settings").nullable();
        t.timestamps();
        t
    }

    #[test]
    fn sqlite_create() {
        assert_eq!(
            guilds().create_sql(Backend::Sqlite, true).unwrap(),
            "CREATE TABLE IF NOT EXISTS \"guilds\" (\
             \"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \
             \"guild_id\" BIGINT NOT NULL UNIQUE, \
             \"name\" VARCHAR(255) NOT NULL, \
             \"partner\" BOOLEAN NOT NULL DEFAULT 0, \
             \"settings\" TEXT NULL, \
             \"created_at\" TIMESTAMP NULL, \
             \"updated_at\" TIMESTAMP NULL)"
        );
    }

    #[test]
    fn postgres_create_uses_bigserial() {
        let sql = guilds().create_sql(Backend::Postgres, false).unwrap();
        assert!(sql.starts_with("CREATE TABLE \"guilds\" (\"id\" BIGSERIAL PRIMARY KEY, "));
    }

    #[test]
    fn empty_blueprint_is_rejected() {
        assert!(Blueprint::new("t").create_sql(Backend::Sqlite, false).is_err());
    }

    #[test]
    fn timestamps_adds_two_nullable_columns() {
        let mut t = Blueprint::new("t");
        t.timestamps();
        let names: Vec<&str> = t.columns().iter().map(ColumnDef::name).collect();
        assert_eq!(names, vec!["created_at", "updated_at"]);
        assert_eq!(t.columns()[0].column_type(), ColumnType::Timestamp);
    }
}
