//! Retry state carried in a message's property bag.
//!
//! The controller keeps no store of its own: every clone it schedules carries
//! the count forward, so any worker can pick up any link of the chain.

use tripwire_common::tracing::warn;
use tripwire_queue::{Message, PropertyValue, SequenceNumber};

/// Property holding the number of unhealthy evaluations so far
pub const RETRY_COUNT: &str = "retry_count";

/// Property holding the sequence number of the first message in the chain
pub const ORIGINAL_SEQUENCE_NUMBER: &str = "original_sequence_number";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub retry_count: u32,
    pub original_sequence_number: Option<SequenceNumber>,
}

impl RetryState {
    /// Read the state without modifying the message
    ///
    /// Returns `None` if the message has never been seen by a controller.
    pub fn read(message: &Message) -> Option<Self> {
        let value = message.property(RETRY_COUNT)?;

        Some(Self {
            retry_count: parse_count(value),
            original_sequence_number: message
                .property(ORIGINAL_SEQUENCE_NUMBER)
                .and_then(PropertyValue::as_int)
                .map(SequenceNumber),
        })
    }

    /// Read the state, stamping first-seen metadata when it is absent
    ///
    /// A message without `retry_count` starts at zero; a message without
    /// `original_sequence_number` gets its own sequence number. Both are left
    /// untouched when present.
    pub fn initialise(message: &mut Message) -> Self {
        if !message.contains_property(ORIGINAL_SEQUENCE_NUMBER)
            && let Some(sequence) = message.sequence_number()
        {
            message.set_property(ORIGINAL_SEQUENCE_NUMBER, sequence.get());
        }

        match Self::read(message) {
            Some(state) => state,
            None => {
                message.set_property(RETRY_COUNT, 0_u32);
                Self {
                    retry_count: 0,
                    original_sequence_number: message
                        .property(ORIGINAL_SEQUENCE_NUMBER)
                        .and_then(PropertyValue::as_int)
                        .map(SequenceNumber),
                }
            }
        }
    }

    /// Write `retry_count` onto a message
    pub fn store(message: &mut Message, retry_count: u32) {
        message.set_property(RETRY_COUNT, retry_count);
    }
}

/// Malformed counts restart the chain rather than poisoning it
fn parse_count(value: &PropertyValue) -> u32 {
    match value.as_int() {
        Some(count) if count >= 0 => u32::try_from(count).unwrap_or(u32::MAX),
        _ => {
            warn!(value = %value, "Ignoring malformed {RETRY_COUNT} property");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_state_reads_as_none() {
        let message = Message::new("body");
        assert_eq!(RetryState::read(&message), None);
    }

    #[test]
    fn test_initialise_stamps_missing_properties() {
        let mut message = Message::new("body");
        let state = RetryState::initialise(&mut message);

        assert_eq!(state.retry_count, 0);
        assert_eq!(
            message.property(RETRY_COUNT).and_then(PropertyValue::as_int),
            Some(0)
        );
        assert_eq!(RetryState::read(&message), Some(state));
    }

    #[test]
    fn test_initialise_preserves_existing_chain() {
        let mut message = Message::new("body")
            .with_property(RETRY_COUNT, 3_i64)
            .with_property(ORIGINAL_SEQUENCE_NUMBER, 42_i64);

        let state = RetryState::initialise(&mut message);

        assert_eq!(state.retry_count, 3);
        assert_eq!(state.original_sequence_number, Some(SequenceNumber(42)));
    }

    #[test]
    fn test_malformed_count_restarts() {
        let mut message = Message::new("body").with_property(RETRY_COUNT, "three");
        assert_eq!(RetryState::initialise(&mut message).retry_count, 0);

        let message = Message::new("body").with_property(RETRY_COUNT, -4_i64);
        assert_eq!(RetryState::read(&message).map(|s| s.retry_count), Some(0));

        let message = Message::new("body").with_property(RETRY_COUNT, i64::MAX);
        assert_eq!(
            RetryState::read(&message).map(|s| s.retry_count),
            Some(u32::MAX)
        );
    }

    #[test]
    fn test_store_overwrites() {
        let mut message = Message::new("body");
        RetryState::initialise(&mut message);
        RetryState::store(&mut message, 4);
        assert_eq!(RetryState::read(&message).map(|s| s.retry_count), Some(4));
    }
}
