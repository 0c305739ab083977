//! Error taxonomy for the stream client.
//!
//! Transport failures feed the reconnect loop; decode failures drop a single
//! frame. Neither is ever returned from `connect()` or `subscribe()`.

use std::time::Duration;

/// Failures of the underlying server-push connection.
///
/// Every variant is recovered by the supervisor's reconnect loop; callers
/// only ever observe them through logs and the `Failed` state.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint (or base URL) is not a usable absolute URL.
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint {
        /// The endpoint as configured.
        endpoint: String,
        /// Why it could not be resolved.
        reason: String,
    },
    /// A configured request header has an invalid name or value.
    #[error("invalid header {name}: {reason}")]
    InvalidHeader {
        /// Header name as configured.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The request could not be sent (DNS, refused, TLS, connect timeout).
    #[error("request failed: {0}")]
    Request(String),
    /// The server accepted the connection but sent no response headers in time.
    #[error("no response within {0:?}")]
    OpenTimeout(Duration),
    /// The server answered with a non-2xx status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, best effort.
        body: String,
    },
    /// Reading or parsing the open stream failed.
    #[error("stream error: {0}")]
    Stream(String),
    /// The open stream went silent for longer than the idle limit.
    #[error("no frame received within {0:?}")]
    IdleTimeout(Duration),
    /// The server ended the stream.
    #[error("stream closed by server")]
    Closed,
}

impl TransportError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidEndpoint { .. } => "invalid_endpoint",
            Self::InvalidHeader { .. } => "invalid_header",
            Self::Request(_) => "request",
            Self::OpenTimeout(_) => "open_timeout",
            Self::Status { .. } => "status",
            Self::Stream(_) => "stream",
            Self::IdleTimeout(_) => "idle_timeout",
            Self::Closed => "closed",
        }
    }
}

/// A frame body that could not be decoded as JSON. The frame is dropped.
#[derive(Debug, thiserror::Error)]
#[error("frame on topic {topic} is not valid JSON: {source}")]
pub struct DecodeError {
    /// Topic the frame would have been dispatched to.
    pub topic: String,
    /// The underlying JSON error.
    #[source]
    pub source: serde_json::Error,
}
