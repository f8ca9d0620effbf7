//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RowsSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `ROWS_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::RowsSettings;

/// Env var naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "ROWS_SETTINGS";

/// Resolve the settings file: `$ROWS_SETTINGS`, else `~/.rows/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(path) = read_env_string(SETTINGS_PATH_ENV) {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".rows").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RowsSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RowsSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults with the file at `path` merged over them. No env overrides.
pub fn load_file_layer(path: &Path) -> Result<RowsSettings> {
    let defaults = serde_json::to_value(RowsSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `ROWS_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut RowsSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply `ROWS_*` overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value kept.
pub fn apply_overrides(settings: &mut RowsSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("ROWS_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("ROWS_PORT", |s| parse_u16_range(s, 1, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = env.parsed("ROWS_MAX_CONNECTIONS", |s| parse_usize_range(s, 1, 1_000_000)) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.parsed("ROWS_PING_INTERVAL_SECS", |s| parse_u64_range(s, 1, 3600)) {
        settings.server.ping_interval_secs = v;
    }
    if let Some(v) = env.parsed("ROWS_READ_TIMEOUT_SECS", |s| parse_u64_range(s, 1, 7200)) {
        settings.server.read_timeout_secs = v;
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = env.parsed("ROWS_STORAGE_ENABLED", parse_bool) {
        settings.storage.enabled = v;
    }
    if let Some(v) = env.string("ROWS_DB_PATH") {
        settings.storage.db_path = v;
    }
    if let Some(v) = env.parsed("ROWS_MAX_INACTIVE_SECS", |s| parse_u64_range(s, 1, 31_536_000)) {
        settings.storage.max_inactive_secs = v;
    }

    // ── Analytics ───────────────────────────────────────────────────
    if let Some(v) = env.parsed("ROWS_ANALYTICS_ENABLED", parse_bool) {
        settings.analytics.enabled = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("ROWS_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("ROWS_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }

    // ── Bot ─────────────────────────────────────────────────────────
    if let Some(v) = env.parsed("ROWS_BOT_MOVE_DELAY_MS", |s| parse_u64_range(s, 0, 60_000)) {
        settings.bot.move_delay_ms = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(val.trim());
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
