//! # gantry-telemetry
//!
//! `tracing` subscriber setup shared by the gantry binary and tests.
//!
//! `RUST_LOG` always wins over the configured level so operators can turn up
//! `gantry_db=debug` (every statement is logged at debug) without editing
//! the settings file.

#![deny(unsafe_code)]

use std::fmt::Write as _;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by `RUST_LOG`.
    pub level: Level,
    /// Per-module level overrides (e.g. `"gantry_db"` => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build a config from a level name, falling back to INFO for unknown names.
    pub fn from_level_name(name: &str, json: bool) -> Self {
        Self {
            level: parse_level(name).unwrap_or(Level::INFO),
            module_levels: Vec::new(),
            json,
        }
    }

    /// Add per-target overrides from `(target, level name)` pairs. Pairs
    /// whose level does not parse are skipped.
    #[must_use]
    pub fn with_module_levels<'a>(
        mut self,
        modules: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Self {
        for (module, level) in modules {
            if let Some(level) = parse_level(level) {
                self.module_levels.push((module.clone(), level));
            }
        }
        self
    }

    /// Render the directive string handed to [`EnvFilter`].
    pub fn filter_directives(&self) -> String {
        let mut filter = self.level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            let _ = write!(filter, ",{module}={}", level.to_string().to_lowercase());
        }
        filter
    }
}

/// Errors from subscriber installation.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Parse a level name (case-insensitive). `warning` is accepted for `warn`.
pub fn parse_level(name: &str) -> Option<Level> {
    match name.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_names() {
        assert_eq!(parse_level("TRACE"), Some(Level::TRACE));
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level(" info "), Some(Level::INFO));
        assert_eq!(parse_level("warning"), Some(Level::WARN));
        assert_eq!(parse_level("error"), Some(Level::ERROR));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn directives_include_module_levels() {
        let config = TelemetryConfig {
            level: Level::WARN,
            module_levels: vec![("gantry_db".to_string(), Level::DEBUG)],
            json: false,
        };
        assert_eq!(config.filter_directives(), "warn,gantry_db=debug");
    }

    #[test]
    fn module_levels_from_settings_pairs() {
        let modules = std::collections::BTreeMap::from([
            ("gantry_db".to_string(), "debug".to_string()),
            ("rusqlite".to_string(), "nonsense".to_string()),
        ]);
        let config = TelemetryConfig::from_level_name("warn", false).with_module_levels(&modules);
        assert_eq!(config.module_levels, vec![("gantry_db".to_string(), Level::DEBUG)]);
        assert_eq!(config.filter_directives(), "warn,gantry_db=debug");
    }

    #[test]
    fn unknown_level_name_falls_back_to_info() {
        let config = TelemetryConfig::from_level_name("chatty", true);
        assert_eq!(config.level, Level::INFO);
        assert!(config.json);
    }

    #[test]
    fn second_init_reports_error() {
        let config = TelemetryConfig::default();
        let _ = init_telemetry(&config);
        assert!(init_telemetry(&config).is_err());
    }
}
