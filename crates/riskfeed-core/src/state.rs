//! Connection state and endpoint types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the connection supervisor.
///
/// Only the supervisor mutates this value. `Failed` is sticky until an
/// explicit `connect()` moves it back to `Connecting`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport and no pending reconnect.
    #[default]
    Disconnected,
    /// A transport open is in flight.
    Connecting,
    /// The transport is open and frames are flowing.
    Connected,
    /// The last attempt failed; a reconnect timer is pending.
    Reconnecting,
    /// The backoff policy refused further retries.
    Failed,
}

impl ConnectionState {
    /// Whether a transport is open, opening, or scheduled to reopen.
    ///
    /// `connect()` is a no-op in any active state.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Reconnecting)
    }

    /// Whether the supervisor has stopped on its own and needs `connect()`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Stable lowercase name, used in logs and the CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The URL or path a supervisor streams from. Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    /// Wrap a URL (`https://host/events`) or a path (`/events/jobs`).
    pub fn new(target: impl Into<String>) -> Self {
        Self(target.into())
    }

    /// The raw target string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the target carries its own scheme and needs no base URL.
    pub fn is_absolute(&self) -> bool {
        self.0.starts_with("http://") || self.0.starts_with("https://")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Endpoint {
    fn from(value: String) -> Self {
        Self(value)
    }
}
