//! One-way circuit breaker over a queue entity
//!
//! Tripping the breaker disables receive on the whole entity, not just on the
//! failing delivery chain. There is no half-open probing and no automatic
//! reset: re-enabling the entity is an administrative action taken outside
//! this process.
//!
//! # State Transitions
//!
//! ```text
//! ┌──────────────┐     trip()     ┌─────────────────────────────┐
//! │ receivable   │ ─────────────> │ ReceiveDisabled / Disabled  │
//! │ Active       │                └─────────────────────────────┘
//! │ SendDisabled │                    │ trip() again: no write
//! └──────────────┘                    v
//!                                  AlreadyOpen
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tripwire_common::{
    internal,
    tracing::{debug, warn},
};
use tripwire_queue::{EntityStatus, QueueAdmin};

use crate::error::ProcessingError;

/// Result of a trip request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripOutcome {
    /// This call disabled receive on the entity
    Opened,
    /// Receive was already blocked; nothing was written
    AlreadyOpen,
}

/// Disables receive on a queue entity through its admin interface
#[derive(Debug)]
pub struct CircuitBreaker {
    admin: Arc<dyn QueueAdmin>,
    entity: String,
    trips: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(admin: Arc<dyn QueueAdmin>, entity: impl Into<String>) -> Self {
        Self {
            admin,
            entity: entity.into(),
            trips: AtomicU64::new(0),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Current administrative status of the entity
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::AdminState`] if the status cannot be read.
    pub async fn status(&self) -> Result<EntityStatus, ProcessingError> {
        self.admin
            .get_entity_status(&self.entity)
            .await
            .map_err(ProcessingError::AdminState)
    }

    /// Whether the entity currently refuses receivers
    ///
    /// # Errors
    ///
    /// See [`CircuitBreaker::status`].
    pub async fn is_open(&self) -> Result<bool, ProcessingError> {
        Ok(!self.status().await?.can_receive())
    }

    /// Number of status writes issued by this breaker
    pub fn trip_count(&self) -> u64 {
        self.trips.load(Ordering::SeqCst)
    }

    /// Disable receive on the entity
    ///
    /// Reads the status first and only writes when receive is still allowed.
    /// An entity that already refuses senders ends up fully `Disabled`.
    /// Concurrent trips may both write; the result is the same.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::AdminState`] if the status cannot be read or
    /// written. The entity keeps whatever state it had.
    pub async fn trip(&self) -> Result<TripOutcome, ProcessingError> {
        let current = self.status().await?;

        if !current.can_receive() {
            debug!(
                entity = %self.entity,
                status = %current,
                "Circuit breaker already open"
            );
            return Ok(TripOutcome::AlreadyOpen);
        }

        let target = if current.can_send() {
            EntityStatus::ReceiveDisabled
        } else {
            EntityStatus::Disabled
        };

        self.admin
            .set_entity_status(&self.entity, target)
            .await
            .map_err(ProcessingError::AdminState)?;
        self.trips.fetch_add(1, Ordering::SeqCst);

        warn!(
            entity = %self.entity,
            from = %current,
            to = %target,
            "Circuit breaker opened, receive disabled"
        );
        internal!(
            level = INFO,
            "Re-enable {} out of band once the dependency has recovered",
            self.entity
        );

        Ok(TripOutcome::Opened)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use tripwire_queue::TestQueue;

    use super::*;

    fn breaker(queue: &TestQueue) -> CircuitBreaker {
        CircuitBreaker::new(Arc::new(queue.clone()), "orders")
    }

    #[tokio::test]
    async fn test_trip_is_idempotent() {
        let queue = TestQueue::new("orders");
        let breaker = breaker(&queue);

        assert_eq!(breaker.trip().await.expect("trip"), TripOutcome::Opened);
        assert_eq!(
            breaker.trip().await.expect("trip"),
            TripOutcome::AlreadyOpen
        );

        assert_eq!(queue.set_status_calls(), 1);
        assert_eq!(queue.get_status_calls(), 2);
        assert_eq!(breaker.trip_count(), 1);
        assert_eq!(queue.memory().status(), EntityStatus::ReceiveDisabled);
    }

    #[tokio::test]
    async fn test_already_disabled_entity_is_not_written() {
        let queue = TestQueue::new("orders");
        queue.memory().set_status(EntityStatus::Disabled);
        let breaker = breaker(&queue);

        assert!(breaker.is_open().await.expect("status"));
        assert_eq!(
            breaker.trip().await.expect("trip"),
            TripOutcome::AlreadyOpen
        );
        assert_eq!(queue.set_status_calls(), 0);
    }

    #[tokio::test]
    async fn test_send_disabled_becomes_fully_disabled() {
        let queue = TestQueue::new("orders");
        queue.memory().set_status(EntityStatus::SendDisabled);
        let breaker = breaker(&queue);

        assert_eq!(breaker.trip().await.expect("trip"), TripOutcome::Opened);
        assert_eq!(queue.memory().status(), EntityStatus::Disabled);
    }

    #[tokio::test]
    async fn test_admin_failure_leaves_state() {
        let queue = TestQueue::new("orders");
        queue.fail_set_status(true);
        let breaker = breaker(&queue);

        let err = breaker.trip().await.expect_err("write fails");
        assert!(err.is_admin());
        assert_eq!(queue.memory().status(), EntityStatus::Active);
        assert_eq!(breaker.trip_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_entity() {
        let queue = TestQueue::new("orders");
        let breaker = CircuitBreaker::new(Arc::new(queue.clone()), "payments");

        assert!(breaker.status().await.expect_err("no entity").is_admin());
        assert_eq!(queue.set_status_calls(), 0);
    }
}
