//! Error types for throttle operations.

use std::time::Duration;

/// Result type for throttle operations.
pub type ThrottleResult<T> = Result<T, ThrottleError>;

/// Errors from reserving or configuring a throttle.
///
/// None of these are fatal: an invalid key only rejects that one request, and
/// contention is reported so the caller can retry.
#[derive(Debug, thiserror::Error)]
pub enum ThrottleError {
    #[error("Invalid throttle key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("Throttle state for {key} is contended (waited {waited:?})")]
    Contended { key: String, waited: Duration },
    #[error("Invalid throttle configuration: {0}")]
    InvalidConfig(String),
}

impl ThrottleError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ThrottleError::Contended { .. })
    }
}

impl From<crate::config::ConfigError> for ThrottleError {
    fn from(e: crate::config::ConfigError) -> Self {
        ThrottleError::InvalidConfig(e.to_string())
    }
}
