//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file format
//! and implement [`Default`] with production values, so a partial settings
//! file only needs the keys it overrides.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GantrySettings {
    /// Database backend selection and connection parameters.
    pub database: DatabaseSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Which concrete backend the connection provider talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded, file-backed engine (`SQLite`).
    Sqlite,
    /// Client-server engine (`PostgreSQL`).
    Postgres,
}

impl FromStr for BackendKind {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "embedded" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "networked" => Ok(Self::Postgres),
            other => Err(SettingsError::InvalidValue(format!(
                "unknown database backend {other:?}, expected one of: sqlite, embedded, postgres, networked"
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Postgres => write!(f, "postgres"),
        }
    }
}

/// Database settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// Backend selector. There is deliberately no default: startup must
    /// fail when it is missing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// Embedded engine settings.
    pub sqlite: SqliteSettings,
    /// Client-server engine settings.
    pub postgres: PostgresSettings,
    /// Retry budget for transient (rollback/deadlock) failures.
    pub query_retries: u32,
    /// Fixed pause between retries in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: None,
            sqlite: SqliteSettings::default(),
            postgres: PostgresSettings::default(),
            query_retries: 5,
            retry_delay_ms: 0,
        }
    }
}

impl DatabaseSettings {
    /// Resolve the backend selector.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidValue`] when the selector is absent
    /// or not one of the recognized names.
    pub fn backend_kind(&self) -> Result<BackendKind> {
        match self.backend.as_deref() {
            None | Some("") => Err(SettingsError::InvalidValue(
                "database.backend is not set".to_string(),
            )),
            Some(raw) => raw.parse(),
        }
    }
}

/// Embedded engine settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SqliteSettings {
    /// Database file path, or `:memory:`.
    pub path: String,
    /// How long a writer waits on a locked database before giving up.
    pub busy_timeout_ms: u32,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            path: default_sqlite_path().to_string_lossy().into_owned(),
            busy_timeout_ms: 5000,
        }
    }
}

/// Client-server engine settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostgresSettings {
    /// Connection string, key/value (`host=... user=...`) or URL form.
    pub url: String,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Column returned as the generated key of an INSERT.
    pub generated_key_column: String,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            url: "host=localhost user=gantry dbname=gantry".to_string(),
            connect_timeout_ms: 5000,
            generated_key_column: "id".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
    /// Per-target level overrides, e.g. `{"gantry_db": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}

/// `~/.gantry`, falling back to `/tmp/.gantry` when `HOME` is unset.
pub fn gantry_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".gantry")
}

fn default_sqlite_path() -> PathBuf {
    gantry_home().join("database").join("gantry.db")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
