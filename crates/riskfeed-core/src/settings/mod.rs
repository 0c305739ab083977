//! Layered client configuration.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RiskfeedSettings::default()`]
//! 2. **User file**: `~/.riskfeed/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `RISKFEED_*` overrides (highest priority)
//!
//! Out of the box: 5 s reconnect delay, 5 attempts, no extra request headers.

mod loader;
mod types;

pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    parse_bool, parse_u32_range, parse_u64_range, settings_path,
};
pub use types::{LoggingSettings, ReconnectSettings, RiskfeedSettings, TransportSettings};

use thiserror::Error;

/// Errors that can occur when loading or parsing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the settings file.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
