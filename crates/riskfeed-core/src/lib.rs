//! # riskfeed-core
//!
//! Shared building blocks for the riskfeed streaming subscription client.
//!
//! - [`ConnectionState`] and [`Endpoint`]: the supervisor's observable state and target
//! - [`Frame`]: transport-neutral server-push message, decoded into topic + JSON payload
//! - [`BackoffPolicy`] / [`FixedBackoff`]: whether and when to reconnect
//! - [`errors`]: transport and decode error taxonomy
//! - [`settings`]: layered configuration (defaults → settings file → env vars)
//!
//! Nothing in this crate performs I/O except settings loading; the async
//! machinery lives in `riskfeed-client`.

#![deny(unsafe_code)]

pub mod backoff;
pub mod constants;
pub mod errors;
pub mod frame;
pub mod settings;
pub mod state;

pub use backoff::{BackoffPolicy, FixedBackoff};
pub use constants::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_OPEN_TIMEOUT_MS, DEFAULT_RECONNECT_DELAY_MS, DEFAULT_TOPIC,
};
pub use errors::{DecodeError, TransportError};
pub use frame::Frame;
pub use settings::{
    LoggingSettings, ReconnectSettings, RiskfeedSettings, SettingsError, TransportSettings,
};
pub use state::{ConnectionState, Endpoint};
