//! Reconnect backoff policy.
//!
//! The supervisor counts consecutive failed attempts since the last
//! successful open (or explicit `connect()`), increments the counter on each
//! failure, and asks the policy with the new value:
//!
//! - [`BackoffPolicy::should_retry`]: schedule another attempt, or stop in `Failed`
//! - [`BackoffPolicy::delay_for`]: how long the single pending timer waits
//!
//! [`FixedBackoff`] is the default policy: a constant delay, no jitter, no
//! growth, so reconnect behavior is reproducible in tests.

use std::fmt::Debug;
use std::time::Duration;

use crate::constants::{DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY_MS};
use crate::settings::ReconnectSettings;

/// Decides whether and when a failed connection is retried.
pub trait BackoffPolicy: Debug + Send + Sync {
    /// Whether another attempt is allowed after `attempt` consecutive failures.
    fn should_retry(&self, attempt: u32) -> bool;

    /// How long to wait before the next attempt.
    fn delay_for(&self, attempt: u32) -> Duration;
}

/// Constant delay, bounded attempt count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedBackoff {
    delay: Duration,
    max_attempts: u32,
}

impl FixedBackoff {
    /// Build a policy with an explicit delay and attempt cap.
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    /// Build a policy from the `reconnect` settings section.
    pub fn from_settings(settings: &ReconnectSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.delay_ms),
            settings.max_attempts,
        )
    }

    /// The configured attempt cap.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            DEFAULT_MAX_RECONNECT_ATTEMPTS,
        )
    }
}

impl BackoffPolicy for FixedBackoff {
    fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    fn delay_for(&self, _attempt: u32) -> Duration {
        self.delay
    }
}
