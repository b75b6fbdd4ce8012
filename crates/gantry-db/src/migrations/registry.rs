//! Static, ordered set of migrations.

use std::collections::HashSet;

use chrono::NaiveDateTime;

use super::Migration;
use crate::errors::{DbError, Result};

const CREATED_AT_FORMAT: &str = "%b %d, %Y %I:%M %p";

struct Entry {
    created: NaiveDateTime,
    migration: Box<dyn Migration>,
}

/// Every migration the application knows about, sorted by creation time.
///
/// Two migrations with the same timestamp are ordered by name.
pub struct MigrationRegistry {
    entries: Vec<Entry>,
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter().map(Migration::name)).finish()
    }
}

impl MigrationRegistry {
    /// Validate and sort `migrations`.
    ///
    /// # Errors
    ///
    /// [`DbError::Migration`] when a name repeats or a timestamp does not parse.
    pub fn new(migrations: Vec<Box<dyn Migration>>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(migrations.len());
        for migration in migrations {
            if !seen.insert(migration.name()) {
                return Err(DbError::migration(format!(
                    "duplicate migration name {}",
                    migration.name()
                )));
            }
            let created = parse_created_at(migration.created_at()).map_err(|e| {
                DbError::migration(format!("{}: {e}", migration.name()))
            })?;
            entries.push(Entry { created, migration });
        }
        entries.sort_by(|a, b| {
            a.created
                .cmp(&b.created)
                .then_with(|| a.migration.name().cmp(b.migration.name()))
        });
        Ok(Self { entries })
    }

    /// Number of migrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Migrations in apply order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Migration> {
        self.entries.iter().map(|e| e.migration.as_ref())
    }

    /// Look a migration up by name.
    pub fn get(&self, name: &str) -> Option<&dyn Migration> {
        self.iter().find(|m| m.name() == name)
    }
}

/// Parse a human-readable creation timestamp such as
/// `"Sat, May 7, 2022 10:11 PM"` or `"Thursday, April 2nd, 2020 11:38 PM"`.
///
/// The leading weekday is ignored; it is not always right.
pub fn parse_created_at(raw: &str) -> Result<NaiveDateTime> {
    let rest = match raw.trim().split_once(", ") {
        Some((weekday, rest)) if weekday.chars().all(|c| c.is_ascii_alphabetic()) => rest,
        _ => raw.trim(),
    };
    let normalized = rest
        .split_whitespace()
        .map(strip_ordinal)
        .collect::<Vec<_>>()
        .join(" ");
    NaiveDateTime::parse_from_str(&normalized, CREATED_AT_FORMAT)
        .map_err(|e| DbError::migration(format!("invalid created_at {raw:?}: {e}")))
}

/// `2nd,` -> `2,`; other tokens unchanged.
fn strip_ordinal(token: &str) -> String {
    let (body, comma) = token
        .strip_suffix(',')
        .map_or((token, ""), |body| (body, ","));
    let digits = body.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let suffix = body[digits.len()..].to_ascii_lowercase();
    if !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
        && matches!(suffix.as_str(), "st" | "nd" | "rd" | "th")
    {
        format!("{digits}{comma}")
    } else {
        token.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use chrono::{Datelike, Timelike};

    struct Named(&'static str, &'static str);

    impl Migration for Named {
        fn name(&self) -> &'static str {
            self.0
        }
        fn created_at(&self) -> &'static str {
            self.1
        }
        fn up(&self, _schema: &Schema) -> Result<bool> {
            Ok(true)
        }
        fn down(&self, _schema: &Schema) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn parses_short_form() {
        let t = parse_created_at("Sat, May 7, 2022 10:11 PM").unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (2022, 5, 7));
        assert_eq!((t.hour(), t.minute()), (22, 11));
    }

    #[test]
    fn parses_long_form_with_ordinal() {
        let t = parse_created_at("Thursday, April 2nd, 2020 11:38 PM").unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (2020, 4, 2));
        assert_eq!(t.hour(), 23);
    }

    #[test]
    fn wrong_weekday_is_ignored() {
        // 14 Dec 2022 was a Wednesday.
        let t = parse_created_at("Sat, Dec 14, 2022 9:50 PM").unwrap();
        assert_eq!((t.month(), t.day(), t.hour()), (12, 14, 21));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_created_at("yesterday").is_err());
        assert!(parse_created_at("Sat, Foo 7, 2022 10:11 PM").is_err());
    }

    #[test]
    fn sorted_by_timestamp_then_name() {
        let registry = MigrationRegistry::new(vec![
            Box::new(Named("c", "Sat, Dec 14, 2022 9:50 PM")),
            Box::new(Named("b", "Sat, May 7, 2022 10:11 PM")),
            Box::new(Named("a", "Sat, May 7, 2022 10:11 PM")),
            Box::new(Named("z", "Thursday, April 2nd, 2020 11:38 PM")),
        ])
        .unwrap();
        let names: Vec<&str> = registry.iter().map(Migration::name).collect();
        assert_eq!(names, vec!["z", "a", "b", "c"]);
        assert_eq!(registry.len(), 4);
        assert!(registry.get("b").is_some());
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = MigrationRegistry::new(vec![
            Box::new(Named("a", "Sat, May 7, 2022 10:11 PM")),
            Box::new(Named("a", "Sat, Dec 14, 2022 9:50 PM")),
        ]);
        assert!(matches!(result, Err(DbError::Migration { message }) if message.contains("duplicate")));
    }

    #[test]
    fn bad_timestamp_names_the_migration() {
        let result = MigrationRegistry::new(vec![Box::new(Named("broken", "soon"))]);
        assert!(matches!(result, Err(DbError::Migration { message }) if message.starts_with("broken")));
    }
}
