use std::{
    collections::{BTreeMap, HashMap},
    pin::pin,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tripwire_common::internal;

use crate::{
    QueueError,
    message::Message,
    r#trait::{MessageReceiver, MessageScheduler, QueueAdmin},
    types::{EntityStatus, LockToken, SequenceNumber},
};

/// How often a blocked receiver re-checks for scheduled messages becoming due
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A message moved to the dead-letter store
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub message: Message,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Locked {
    sequence: SequenceNumber,
    message: Message,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct State {
    next_sequence: i64,
    status: EntityStatus,
    available: BTreeMap<SequenceNumber, Message>,
    scheduled: BTreeMap<(DateTime<Utc>, SequenceNumber), Message>,
    locked: HashMap<LockToken, Locked>,
    dead_letters: Vec<DeadLetter>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            next_sequence: 1,
            status: EntityStatus::Active,
            available: BTreeMap::new(),
            scheduled: BTreeMap::new(),
            locked: HashMap::new(),
            dead_letters: Vec::new(),
        }
    }
}

impl State {
    /// Make due scheduled messages visible and release expired locks
    fn promote(&mut self, now: DateTime<Utc>) {
        while let Some(entry) = self.scheduled.first_entry() {
            if entry.key().0 > now {
                break;
            }

            let ((_, sequence), message) = entry.remove_entry();
            self.available.insert(sequence, message);
        }

        let expired = self
            .locked
            .iter()
            .filter(|(_, locked)| locked.expires_at <= now)
            .map(|(token, _)| *token)
            .collect::<Vec<_>>();

        for token in expired {
            if let Some(Locked {
                sequence,
                mut message,
                ..
            }) = self.locked.remove(&token)
            {
                message.system_mut().lock_token = None;
                self.available.insert(sequence, message);
            }
        }
    }

    fn len(&self) -> usize {
        self.available.len() + self.scheduled.len() + self.locked.len()
    }
}

/// In-memory peek-lock queue
///
/// Holds a single entity. Messages move between three places: `available`
/// (visible, ordered by sequence number), `scheduled` (invisible until their
/// visibility time) and `locked` (handed to a receiver and awaiting
/// completion). An expired lock puts the message back into `available`.
///
/// # Capacity Management
/// An optional capacity bounds the number of messages across all three
/// places. Dead letters do not count towards it.
///
/// # Concurrency
/// All state sits behind a single mutex; the queue is cheap to clone and
/// clones share state.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
    entity: String,
    endpoint: String,
    lock_duration: TimeDelta,
    capacity: Option<usize>,
}

impl MemoryQueue {
    /// Create an empty, active queue entity with a 60 second lock duration
    #[must_use]
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            notify: Arc::new(Notify::new()),
            entity: entity.into(),
            endpoint: "memory://localhost/".to_string(),
            lock_duration: TimeDelta::seconds(60),
            capacity: None,
        }
    }

    #[must_use]
    pub fn with_lock_duration(mut self, duration: Duration) -> Self {
        self.lock_duration = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
        self
    }

    /// Limit the number of messages the queue will hold
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Number of live messages: visible, scheduled and locked
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of messages currently held under a peek-lock
    #[must_use]
    pub fn locked_count(&self) -> usize {
        self.state.lock().locked.len()
    }

    /// Messages waiting for their visibility time, earliest first
    #[must_use]
    pub fn scheduled_messages(&self) -> Vec<(DateTime<Utc>, Message)> {
        let mut state = self.state.lock();
        state.promote(Utc::now());
        state
            .scheduled
            .iter()
            .map(|((at, _), message)| (*at, message.clone()))
            .collect()
    }

    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().dead_letters.clone()
    }

    /// Current administrative status of the entity
    #[must_use]
    pub fn status(&self) -> EntityStatus {
        self.state.lock().status
    }

    /// Overwrite the administrative status of the entity
    pub fn set_status(&self, status: EntityStatus) {
        let previous = std::mem::replace(&mut self.state.lock().status, status);
        if previous != status {
            internal!(
                level = DEBUG,
                "Entity {} status changed from {previous} to {status}",
                self.entity
            );
        }
        self.notify.notify_waiters();
    }

    /// Take the next visible message without waiting
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ReceiveDisabled`] if the entity refuses receivers.
    pub fn try_receive(&self) -> crate::Result<Option<Message>> {
        let now = Utc::now();
        let mut state = self.state.lock();

        if !state.status.can_receive() {
            return Err(QueueError::ReceiveDisabled(self.entity.clone()));
        }

        state.promote(now);

        let Some((sequence, mut message)) = state.available.pop_first() else {
            return Ok(None);
        };

        let token = LockToken::generate();
        let system = message.system_mut();
        system.delivery_count = system.delivery_count.saturating_add(1);
        system.lock_token = Some(token);

        state.locked.insert(
            token,
            Locked {
                sequence,
                message: message.clone(),
                expires_at: now
                    .checked_add_signed(self.lock_duration)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );

        Ok(Some(message))
    }

    fn check_entity(&self, entity: &str) -> crate::Result<()> {
        if entity == self.entity {
            Ok(())
        } else {
            Err(QueueError::EntityNotFound(entity.to_string()))
        }
    }
}

#[async_trait]
impl MessageReceiver for MemoryQueue {
    async fn receive(&self, max_wait: Duration) -> crate::Result<Option<Message>> {
        let deadline = tokio::time::Instant::now().checked_add(max_wait);

        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            if let Some(message) = self.try_receive()? {
                return Ok(Some(message));
            }

            let wait = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                    remaining.min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };

            let _ = tokio::time::timeout(wait, notified).await;
        }
    }

    async fn complete(&self, lock_token: &LockToken) -> crate::Result<()> {
        let mut state = self.state.lock();
        state.promote(Utc::now());

        state
            .locked
            .remove(lock_token)
            .map(|_| ())
            .ok_or(QueueError::LockLost(*lock_token))
    }

    fn entity_path(&self) -> &str {
        &self.entity
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MessageScheduler for MemoryQueue {
    async fn schedule(
        &self,
        mut message: Message,
        visible_at: DateTime<Utc>,
    ) -> crate::Result<SequenceNumber> {
        let now = Utc::now();

        let sequence = {
            let mut state = self.state.lock();

            if !state.status.can_send() {
                return Err(QueueError::SendDisabled(self.entity.clone()));
            }

            if let Some(capacity) = self.capacity
                && state.len() >= capacity
            {
                return Err(QueueError::CapacityExceeded {
                    used: state.len(),
                    capacity,
                });
            }

            let sequence = SequenceNumber(state.next_sequence);
            state.next_sequence += 1;

            let system = message.system_mut();
            system.sequence_number = Some(sequence);
            system.lock_token = None;
            system.enqueued_at = Some(visible_at);
            system.delivery_count = 0;

            if visible_at <= now {
                state.available.insert(sequence, message);
            } else {
                state.scheduled.insert((visible_at, sequence), message);
            }

            sequence
        };

        self.notify.notify_waiters();
        Ok(sequence)
    }

    async fn dead_letter(&self, message: Message, reason: &str) -> crate::Result<()> {
        self.state.lock().dead_letters.push(DeadLetter {
            message,
            reason: reason.to_string(),
            dead_lettered_at: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl QueueAdmin for MemoryQueue {
    async fn get_entity_status(&self, entity: &str) -> crate::Result<EntityStatus> {
        self.check_entity(entity)?;
        Ok(self.status())
    }

    async fn set_entity_status(&self, entity: &str, status: EntityStatus) -> crate::Result<()> {
        self.check_entity(entity)?;
        self.set_status(status);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receive_then_complete() {
        let queue = MemoryQueue::new("orders");
        let first = queue.send(Message::new("a")).await.expect("Failed to send");
        let second = queue.send(Message::new("b")).await.expect("Failed to send");
        assert!(first < second);

        let message = queue
            .receive(Duration::from_millis(100))
            .await
            .expect("Failed to receive")
            .expect("Expected a message");

        assert_eq!(message.body(), b"a");
        assert_eq!(message.sequence_number(), Some(first));
        assert_eq!(message.delivery_count(), 1);
        assert_eq!(queue.locked_count(), 1);

        let token = message.lock_token().expect("Expected a lock token");
        queue.complete(&token).await.expect("Failed to complete");
        assert_eq!(queue.len(), 1);

        let err = queue.complete(&token).await.expect_err("Double completion");
        assert!(matches!(err, QueueError::LockLost(t) if t == token));
    }

    #[tokio::test]
    async fn test_expired_lock_redelivers() {
        let queue = MemoryQueue::new("orders").with_lock_duration(Duration::ZERO);
        queue.send(Message::new("a")).await.expect("Failed to send");

        let first = queue.try_receive().expect("Receive").expect("Message");
        let second = queue.try_receive().expect("Receive").expect("Message");

        assert_eq!(first.sequence_number(), second.sequence_number());
        assert_eq!(second.delivery_count(), 2);
        assert_ne!(first.lock_token(), second.lock_token());

        let stale = first.lock_token().expect("Expected a lock token");
        assert!(matches!(
            queue.complete(&stale).await,
            Err(QueueError::LockLost(_))
        ));
    }

    #[tokio::test]
    async fn test_scheduled_message_is_invisible_until_due() {
        let queue = MemoryQueue::new("orders");
        let later = Utc::now() + TimeDelta::hours(1);
        queue
            .schedule(Message::new("later"), later)
            .await
            .expect("Failed to schedule");

        assert!(queue.try_receive().expect("Receive").is_none());

        let scheduled = queue.scheduled_messages();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0, later);

        let past = Utc::now() - TimeDelta::seconds(1);
        queue
            .schedule(Message::new("now"), past)
            .await
            .expect("Failed to schedule");
        let message = queue.try_receive().expect("Receive").expect("Message");
        assert_eq!(message.body(), b"now");
    }

    #[tokio::test]
    async fn test_receive_wakes_on_send() {
        let queue = MemoryQueue::new("orders");
        let sender = queue.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            sender.send(Message::new("late")).await
        });

        let message = queue
            .receive(Duration::from_secs(5))
            .await
            .expect("Failed to receive");
        assert!(message.is_some());
        handle.await.expect("Join").expect("Send");
    }

    #[tokio::test]
    async fn test_receive_times_out_empty() {
        let queue = MemoryQueue::new("orders");
        let message = queue
            .receive(Duration::from_millis(30))
            .await
            .expect("Failed to receive");
        assert!(message.is_none());
    }

    #[tokio::test]
    async fn test_entity_status_gates_operations() {
        let queue = MemoryQueue::new("orders");
        queue.send(Message::new("a")).await.expect("Failed to send");

        queue
            .set_entity_status("orders", EntityStatus::ReceiveDisabled)
            .await
            .expect("Failed to set status");
        assert!(matches!(
            queue.receive(Duration::from_millis(10)).await,
            Err(QueueError::ReceiveDisabled(_))
        ));
        queue
            .send(Message::new("b"))
            .await
            .expect("Sends are still accepted");

        queue.set_status(EntityStatus::SendDisabled);
        assert!(matches!(
            queue.send(Message::new("c")).await,
            Err(QueueError::SendDisabled(_))
        ));
        assert!(queue.try_receive().expect("Receive").is_some());
    }

    #[tokio::test]
    async fn test_unknown_entity() {
        let queue = MemoryQueue::new("orders");
        assert!(matches!(
            queue.get_entity_status("payments").await,
            Err(QueueError::EntityNotFound(name)) if name == "payments"
        ));
        assert_eq!(
            queue.get_entity_status("orders").await.expect("Status"),
            EntityStatus::Active
        );
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let queue = MemoryQueue::new("orders").with_capacity(1);
        queue.send(Message::new("a")).await.expect("Failed to send");

        let err = queue.send(Message::new("b")).await.expect_err("Queue full");
        assert!(matches!(
            err,
            QueueError::CapacityExceeded {
                used: 1,
                capacity: 1
            }
        ));

        queue
            .dead_letter(Message::new("c"), "testing")
            .await
            .expect("Dead letters are not capacity bound");
        assert_eq!(queue.dead_letters().len(), 1);
        assert_eq!(queue.dead_letters()[0].reason, "testing");
    }
}
