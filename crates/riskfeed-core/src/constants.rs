//! Fixed protocol and policy constants.

/// Topic that receives every frame without an explicit event name.
pub const DEFAULT_TOPIC: &str = "message";

/// Delay before each scheduled reconnect, in milliseconds.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;

/// Consecutive failures tolerated before the supervisor gives up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Connect timeout applied by the HTTP transport, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Time allowed between sending the request and receiving response headers,
/// in milliseconds.
pub const DEFAULT_OPEN_TIMEOUT_MS: u64 = 30_000;
