use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    message::Message,
    types::{EntityStatus, LockToken, SequenceNumber},
};

/// Receiving side of a peek-lock queue
///
/// A received message stays invisible to other receivers until it is
/// completed or its lock expires, at which point it is redelivered with an
/// incremented delivery count.
#[async_trait]
pub trait MessageReceiver: Send + Sync + std::fmt::Debug {
    /// Wait up to `max_wait` for the next visible message
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ReceiveDisabled`](crate::QueueError::ReceiveDisabled)
    /// when the entity refuses receivers, or a transport error.
    async fn receive(&self, max_wait: std::time::Duration) -> crate::Result<Option<Message>>;

    /// Acknowledge a received message, removing it from the queue
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::LockLost`](crate::QueueError::LockLost) if the lock
    /// has expired or was already released.
    async fn complete(&self, lock_token: &LockToken) -> crate::Result<()>;

    /// Path of the entity this receiver reads from
    fn entity_path(&self) -> &str;

    /// Namespace endpoint the entity lives under
    fn endpoint(&self) -> &str;
}

/// Sending side of a queue, including delayed delivery
#[async_trait]
pub trait MessageScheduler: Send + Sync + std::fmt::Debug {
    /// Enqueue `message` so that it becomes visible at `visible_at`
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::SendDisabled`](crate::QueueError::SendDisabled)
    /// when the entity refuses senders, or a capacity/transport error.
    async fn schedule(
        &self,
        message: Message,
        visible_at: DateTime<Utc>,
    ) -> crate::Result<SequenceNumber>;

    /// Move `message` to the entity's dead-letter store
    ///
    /// # Errors
    ///
    /// Returns an error if the dead-letter store cannot accept the message.
    async fn dead_letter(&self, message: Message, reason: &str) -> crate::Result<()>;

    /// Enqueue `message` for immediate delivery
    ///
    /// # Errors
    ///
    /// See [`MessageScheduler::schedule`].
    async fn send(&self, message: Message) -> crate::Result<SequenceNumber> {
        self.schedule(message, Utc::now()).await
    }
}

/// Management operations on queue entities
#[async_trait]
pub trait QueueAdmin: Send + Sync + std::fmt::Debug {
    /// Read the administrative status of the named entity
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::EntityNotFound`](crate::QueueError::EntityNotFound)
    /// for an unknown entity, or a transport error.
    async fn get_entity_status(&self, entity: &str) -> crate::Result<EntityStatus>;

    /// Overwrite the administrative status of the named entity
    ///
    /// # Errors
    ///
    /// See [`QueueAdmin::get_entity_status`].
    async fn set_entity_status(&self, entity: &str, status: EntityStatus) -> crate::Result<()>;
}
