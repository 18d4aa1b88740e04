//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{TaxdeskSettings, data_dir};

/// Resolve the path to the settings file (`~/.taxdesk/settings.json`).
pub fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TaxdeskSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<TaxdeskSettings> {
    let mut settings = load_file(path)?;
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

fn load_file(path: &Path) -> Result<TaxdeskSettings> {
    let defaults = serde_json::to_value(TaxdeskSettings::default())?;

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

/// Apply `TAXDESK_*` overrides read through `lookup`.
///
/// Invalid values are logged and ignored, leaving the file/default value.
pub fn apply_overrides<F>(settings: &mut TaxdeskSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("TAXDESK_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("TAXDESK_PORT", |s| parse_range::<u16>(s, 1, u16::MAX)) {
        settings.server.port = v;
    }
    if let Some(v) = env.parsed("TAXDESK_MAX_CONNECTIONS_PER_USER", |s| parse_range::<usize>(s, 1, 1000)) {
        settings.server.max_connections_per_user = v;
    }
    if let Some(v) = env.parsed("TAXDESK_MAX_MESSAGE_SIZE", |s| parse_range::<usize>(s, 1024, 16 * 1024 * 1024)) {
        settings.server.max_message_size = v;
    }
    if let Some(v) = env.parsed("TAXDESK_HEARTBEAT_INTERVAL_SECS", |s| parse_range::<u64>(s, 1, 3600)) {
        settings.server.heartbeat_interval_secs = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = env.string("TAXDESK_JWT_SECRET") {
        settings.auth.jwt_secret = v;
    }
    if let Some(v) = env.parsed("TAXDESK_TOKEN_TTL_SECS", |s| parse_range::<u64>(s, 60, 30 * 24 * 3600)) {
        settings.auth.token_ttl_secs = v;
    }

    // ── Database / telemetry ────────────────────────────────────────
    if let Some(v) = env.string("TAXDESK_DB_PATH") {
        settings.database.path = v;
    }
    if let Some(v) = env.string("TAXDESK_LOG_LEVEL") {
        settings.telemetry.level = v;
    }
    if let Some(v) = env.parsed("TAXDESK_LOG_JSON", parse_bool) {
        settings.telemetry.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

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

/// Parse an integer and check it lies in `min..=max`.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}
