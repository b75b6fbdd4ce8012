//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`GantrySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `GANTRY_*` environment variable overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{GantrySettings, gantry_home};

/// Resolve the path to the settings file (`~/.gantry/settings.json`).
pub fn settings_path() -> PathBuf {
    gantry_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<GantrySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. An unreadable file or invalid JSON is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<GantrySettings> {
    let defaults = serde_json::to_value(GantrySettings::default())?;

    let merged = match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!(?path, "loading settings from file");
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(?path, "settings file not found, using defaults");
            defaults
        }
        Err(e) => return Err(e.into()),
    };

    let mut settings: GantrySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Overlay `overlay` onto `base`.
///
/// Objects merge key by key, recursively. Any other overlay value (arrays
/// included) replaces the base value outright. `null` in the overlay leaves
/// the base value alone, so a file can mention a key without overriding it.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map.into_iter().filter(|(_, v)| !v.is_null()) {
                let merged = match base_map.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Apply `GANTRY_*` environment overrides.
///
/// A variable that does not parse is logged and skipped; the file or
/// default value stays in place.
pub fn apply_env_overrides(settings: &mut GantrySettings) {
    let db = &mut settings.database;
    if let Some(v) = env_string("GANTRY_DB_BACKEND") {
        db.backend = Some(v);
    }
    if let Some(v) = env_string("GANTRY_SQLITE_PATH") {
        db.sqlite.path = v;
    }
    if let Some(v) = env_string("GANTRY_POSTGRES_URL") {
        db.postgres.url = v;
    }
    if let Some(v) = env_parsed("GANTRY_DB_RETRIES", |raw| parse_u32_range(raw, 0, 100)) {
        db.query_retries = v;
    }
    if let Some(v) = env_string("GANTRY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env_parsed("GANTRY_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

/// `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`, any case.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A `u32` in `min..=max`.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    val.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| (min..=max).contains(n))
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T>(name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let raw = env_string(name)?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        warn!(key = name, value = %raw, "ignoring unparseable env override");
    }
    parsed
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
