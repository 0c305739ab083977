//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file is valid: missing fields keep their default.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_OPEN_TIMEOUT_MS,
    DEFAULT_RECONNECT_DELAY_MS,
};

/// Root settings for the stream client and the `riskfeed` CLI.
///
/// ```json
/// {
///   "baseUrl": "https://risk.example.com",
///   "reconnect": { "delayMs": 2000 },
///   "transport": { "headers": { "X-Demo-User": "analyst" } }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RiskfeedSettings {
    /// Base URL that relative endpoints (`/events/jobs`) are resolved against.
    pub base_url: Option<String>,
    /// Reconnect backoff.
    pub reconnect: ReconnectSettings,
    /// HTTP transport behavior.
    pub transport: TransportSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Fixed-delay reconnect policy parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    /// Delay before every scheduled reconnect (default: 5000).
    pub delay_ms: u64,
    /// Consecutive failures before giving up (default: 5).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Request-level options for the SSE transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// TCP/TLS connect timeout (default: 10000).
    pub connect_timeout_ms: u64,
    /// Limit on waiting for response headers after the request is sent
    /// (default: 30000). The stream body itself is not bounded by this.
    pub open_timeout_ms: u64,
    /// Treat the stream as dead if no frame arrives for this long.
    /// `None` disables the check.
    pub idle_timeout_ms: Option<u64>,
    /// Extra headers sent on every open (demo-mode identity headers, tenant ids).
    pub headers: BTreeMap<String, String>,
    /// Sent as `Authorization: Bearer <token>` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            open_timeout_ms: DEFAULT_OPEN_TIMEOUT_MS,
            idle_timeout_ms: None,
            headers: BTreeMap::new(),
            bearer_token: None,
        }
    }
}

/// Log output settings consumed by `riskfeed-telemetry`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`..`error`). `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-module level overrides, e.g. `{"riskfeed_client": "debug"}`.
    pub module_levels: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            module_levels: BTreeMap::new(),
        }
    }
}
