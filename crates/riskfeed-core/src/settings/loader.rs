//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use super::types::RiskfeedSettings;
use super::Result;

/// Resolve the path to the settings file (`~/.riskfeed/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".riskfeed").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RiskfeedSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RiskfeedSettings> {
    let defaults = serde_json::to_value(RiskfeedSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RiskfeedSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Overlay a user settings document onto the serialized defaults.
///
/// Objects merge key by key, anything else in `user` replaces the default
/// outright, and `null` in `user` means "keep the default" so a file can
/// blank out a key without breaking deserialization.
pub fn deep_merge(mut defaults: Value, user: Value) -> Value {
    overlay(&mut defaults, user);
    defaults
}

fn overlay(slot: &mut Value, user: Value) {
    match (slot, user) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer.into_iter().filter(|(_, v)| !v.is_null()) {
                match base.get_mut(&key) {
                    Some(existing) => overlay(existing, value),
                    None => {
                        let _ = base.insert(key, value);
                    }
                }
            }
        }
        (slot, user) => *slot = user,
    }
}

/// Apply `RISKFEED_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut RiskfeedSettings) {
    apply_overrides(settings, &|name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Invalid values are ignored with a warning and the file/default value
/// is kept.
pub fn apply_overrides(settings: &mut RiskfeedSettings, lookup: &dyn Fn(&str) -> Option<String>) {
    let read_string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Endpoint ────────────────────────────────────────────────────
    if let Some(v) = read_string("RISKFEED_BASE_URL") {
        settings.base_url = Some(v);
    }

    // ── Reconnect ───────────────────────────────────────────────────
    if let Some(v) = read_checked(lookup, "RISKFEED_RECONNECT_DELAY_MS", |v| {
        parse_u64_range(v, 0, 3_600_000)
    }) {
        settings.reconnect.delay_ms = v;
    }
    if let Some(v) = read_checked(lookup, "RISKFEED_MAX_RECONNECT_ATTEMPTS", |v| {
        parse_u32_range(v, 0, 10_000)
    }) {
        settings.reconnect.max_attempts = v;
    }

    // ── Transport ───────────────────────────────────────────────────
    if let Some(v) = read_checked(lookup, "RISKFEED_CONNECT_TIMEOUT_MS", |v| {
        parse_u64_range(v, 100, 600_000)
    }) {
        settings.transport.connect_timeout_ms = v;
    }
    if let Some(v) = read_checked(lookup, "RISKFEED_OPEN_TIMEOUT_MS", |v| {
        parse_u64_range(v, 100, 600_000)
    }) {
        settings.transport.open_timeout_ms = v;
    }
    if let Some(v) = read_checked(lookup, "RISKFEED_IDLE_TIMEOUT_MS", |v| {
        parse_u64_range(v, 1_000, 3_600_000)
    }) {
        settings.transport.idle_timeout_ms = Some(v);
    }
    if let Some(v) = read_string("RISKFEED_BEARER_TOKEN") {
        settings.transport.bearer_token = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_string("RISKFEED_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_checked(lookup, "RISKFEED_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

fn read_checked<T>(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let val = lookup(name)?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse an env flag. Surrounding whitespace and ASCII case are ignored.
///
/// `true`/`1`/`yes`/`on` enable, `false`/`0`/`no`/`off` disable.
pub fn parse_bool(val: &str) -> Option<bool> {
    const ON: [&str; 4] = ["true", "1", "yes", "on"];
    const OFF: [&str; 4] = ["false", "0", "no", "off"];
    let val = val.trim();
    let matches = |words: &[&str]| words.iter().any(|w| val.eq_ignore_ascii_case(w));
    if matches(&ON) {
        Some(true)
    } else if matches(&OFF) {
        Some(false)
    } else {
        None
    }
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
