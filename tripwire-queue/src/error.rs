//! Error types for the tripwire-queue crate.

use thiserror::Error;

use crate::types::LockToken;

/// Top-level queue error type.
///
/// Returned by every receive, acknowledge, schedule and admin operation.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The peek-lock expired or was never held; the message will be redelivered.
    #[error("Message lock lost: {0}")]
    LockLost(LockToken),

    /// The entity refuses receivers.
    #[error("Receive is disabled on entity {0}")]
    ReceiveDisabled(String),

    /// The entity refuses senders.
    #[error("Send is disabled on entity {0}")]
    SendDisabled(String),

    /// No entity with this name exists.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// The queue is full.
    #[error("Queue capacity exceeded: {used}/{capacity} messages")]
    CapacityExceeded { used: usize, capacity: usize },

    /// Injected or unexpected failure inside the queue.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Returns `true` if the entity's administrative state caused the failure.
    #[must_use]
    pub const fn is_entity_disabled(&self) -> bool {
        matches!(self, Self::ReceiveDisabled(_) | Self::SendDisabled(_))
    }
}

/// Specialized `Result` type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
