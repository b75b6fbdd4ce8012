//! # gantry-settings
//!
//! Configuration for the gantry database layer and CLI.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`GantrySettings::default()`]
//! 2. **User file**: `~/.gantry/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `GANTRY_*` overrides (highest priority)
//!
//! The database backend selector has no default. [`DatabaseSettings::backend_kind`]
//! fails when it is missing or unrecognized, and callers treat that as fatal.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
