//! File + environment settings for processes that host a log store.
//!
//! Loading flow:
//! 1. Start with compiled [`LogSinkSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `LOGSINK_*` environment overrides (highest priority)
//! 4. Clamp `maxAgeIntervalMs` to [`MIN_MAX_AGE_INTERVAL_MS`]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::sqlite::ConnectionConfig;
use crate::store::LogStoreConfig;

/// Errors that can occur when loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the settings file.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pool settings as they appear in the settings file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Maximum pooled connections for file-backed stores.
    pub pool_size: u32,
    /// `SQLite` busy timeout.
    pub busy_timeout_ms: u32,
    /// Page cache size in KiB.
    pub cache_size_kib: i64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let c = ConnectionConfig::default();
        Self {
            pool_size: c.pool_size,
            busy_timeout_ms: c.busy_timeout_ms,
            cache_size_kib: c.cache_size_kib,
        }
    }
}

/// Log store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogSinkSettings {
    /// Database file (or `:memory:`).
    pub path: String,
    /// Maximum record age in ms; 0 disables retention.
    pub max_age_ms: u64,
    /// Pause between retention passes in ms.
    pub max_age_interval_ms: u64,
    /// Mirror writes to stderr.
    pub tee_stderr: bool,
    /// Default minimum level for loggers created by tools.
    pub default_level: String,
    /// Pool settings.
    pub connection: ConnectionSettings,
}

impl Default for LogSinkSettings {
    fn default() -> Self {
        Self {
            path: default_db_path().to_string_lossy().into_owned(),
            max_age_ms: 2_592_000_000,
            max_age_interval_ms: 86_400_000,
            tee_stderr: false,
            default_level: "info".to_string(),
            connection: ConnectionSettings::default(),
        }
    }
}

impl From<&LogSinkSettings> for LogStoreConfig {
    fn from(s: &LogSinkSettings) -> Self {
        Self {
            path: s.path.clone(),
            max_age: Duration::from_millis(s.max_age_ms),
            max_age_interval: Duration::from_millis(s.max_age_interval_ms),
            tee_stderr: s.tee_stderr,
            connection: ConnectionConfig {
                pool_size: s.connection.pool_size,
                busy_timeout_ms: s.connection.busy_timeout_ms,
                cache_size_kib: s.connection.cache_size_kib,
            },
            side_channel: None,
        }
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

/// `~/.logsink/logs.db`
pub fn default_db_path() -> PathBuf {
    home_dir().join(".logsink").join("logs.db")
}

/// `~/.logsink/settings.json`
pub fn settings_path() -> PathBuf {
    home_dir().join(".logsink").join("settings.json")
}

/// Shortest accepted pause between retention passes.
pub const MIN_MAX_AGE_INTERVAL_MS: u64 = 1000;

/// [`load_settings_from_path`] on [`settings_path`].
pub fn load_settings() -> Result<LogSinkSettings, SettingsError> {
    load_settings_from_path(&settings_path())
}

/// Defaults, then the file at `path` if present, then `LOGSINK_*` variables.
pub fn load_settings_from_path(path: &Path) -> Result<LogSinkSettings, SettingsError> {
    let mut merged = serde_json::to_value(LogSinkSettings::default())?;
    if let Some(overrides) = read_settings_file(path)? {
        merged = deep_merge(merged, overrides);
    }

    let mut settings: LogSinkSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    enforce_limits(&mut settings);
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<Option<Value>, SettingsError> {
    if !path.exists() {
        debug!(?path, "no settings file");
        return Ok(None);
    }
    debug!(?path, "reading settings file");
    let raw = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&raw)?))
}

/// Overlay `source` onto `target`.
///
/// Nested objects merge key by key. Any other `source` value wins outright,
/// except `null`, which leaves the target untouched.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay.into_iter().filter(|(_, v)| !v.is_null()) {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, replacement) => replacement,
    }
}

/// Clamp values the file or environment may have set out of range.
fn enforce_limits(settings: &mut LogSinkSettings) {
    if settings.max_age_interval_ms < MIN_MAX_AGE_INTERVAL_MS {
        warn!(
            value = settings.max_age_interval_ms,
            min = MIN_MAX_AGE_INTERVAL_MS,
            "maxAgeIntervalMs below minimum, clamping"
        );
        settings.max_age_interval_ms = MIN_MAX_AGE_INTERVAL_MS;
    }
}

/// Apply `LOGSINK_*` overrides. Invalid values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut LogSinkSettings) {
    if let Some(v) = read_env_string("LOGSINK_PATH") {
        settings.path = v;
    }
    if let Some(v) = read_env_u64("LOGSINK_MAX_AGE_MS", 0, u64::MAX) {
        settings.max_age_ms = v;
    }
    let min_interval = MIN_MAX_AGE_INTERVAL_MS;
    if let Some(v) = read_env_u64("LOGSINK_MAX_AGE_INTERVAL_MS", min_interval, u64::MAX) {
        settings.max_age_interval_ms = v;
    }
    if let Some(v) = read_env_bool("LOGSINK_TEE_STDERR") {
        settings.tee_stderr = v;
    }
    if let Some(v) = read_env_string("LOGSINK_DEFAULT_LEVEL") {
        settings.default_level = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off` (case-insensitive).
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid integer env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
