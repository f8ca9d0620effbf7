//! # rows-settings
//!
//! Layered configuration for the rows game server.
//!
//! Settings are built from three layers (in priority order):
//! 1. **Compiled defaults**: [`RowsSettings::default()`]
//! 2. **Settings file**: `~/.rows/settings.json` or `$ROWS_SETTINGS`
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `ROWS_*` overrides (highest priority)
//!
//! The binary applies its command-line flags on top and then calls
//! [`RowsSettings::validate`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
