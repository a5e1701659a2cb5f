//! Typed error handling for message processing.
//!
//! Unhealthy downstream state and retry exhaustion are not errors: they are
//! handled by rescheduling and by tripping the breaker, and surface as
//! [`Outcome`](crate::Outcome) variants. What remains here are failures of the
//! queue itself, of its administrative plane, and of configuration.

use thiserror::Error;
use tripwire_queue::QueueError;

/// Top-level processing error type.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Receive, complete or schedule failed.
    ///
    /// Not retried here; the message returns through lock expiry.
    #[error("Transport error: {0}")]
    Transport(#[source] QueueError),

    /// Reading or updating the entity status failed.
    ///
    /// The entity keeps its last known state.
    #[error("Admin state error: {0}")]
    AdminState(#[source] QueueError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A bounded queue operation did not finish in time.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },
}

/// Configuration errors, detected before any message is handled.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A retry ceiling of zero would trip before the first evaluation.
    #[error("retry_ceiling must be at least 1")]
    ZeroRetryCeiling,

    /// Jitter outside `0.0..=1.0`.
    #[error("jitter_factor must be within 0.0 and 1.0, got {0}")]
    InvalidJitter(String),

    /// Zero concurrent calls would never receive.
    #[error("max_concurrent_calls must be at least 1")]
    ZeroConcurrency,

    /// `serve` was called before `init`.
    #[error("Message processor not initialised. Call init() first.")]
    NotInitialised,
}

impl ProcessingError {
    /// Returns `true` if the queue data plane failed.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }

    /// Returns `true` if the entity status could not be read or written.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::AdminState(_))
    }

    /// Returns `true` for configuration problems.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
