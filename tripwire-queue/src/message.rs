//! The message envelope delivered by a queue.
//!
//! A message is an immutable body plus a user property bag, and a set of
//! system properties that only the queue assigns (sequence number, lock
//! token, enqueue time and delivery count). Consumers that need to carry
//! state across redeliveries write it into the property bag and resend a
//! clone; see [`Message::clone_for_resend`].

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LockToken, SequenceNumber};

/// A value in a message's user property bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl PropertyValue {
    /// The value as an integer, if it is one
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// The value as a string slice, if it is one
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
        }
    }
}

/// Properties owned by the queue, never by the sender
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemProperties {
    /// Assigned on enqueue
    pub sequence_number: Option<SequenceNumber>,
    /// Present only while the message is held under a peek-lock
    pub lock_token: Option<LockToken>,
    /// When the message became (or will become) visible
    pub enqueued_at: Option<DateTime<Utc>>,
    /// Number of times the message has been handed to a receiver
    pub delivery_count: u32,
}

/// A queue message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    body: Arc<[u8]>,
    #[serde(default)]
    properties: BTreeMap<String, PropertyValue>,
    #[serde(default)]
    system: SystemProperties,
}

impl Message {
    /// Create a message with the given body and no properties
    pub fn new(body: impl AsRef<[u8]>) -> Self {
        Self {
            body: Arc::from(body.as_ref()),
            properties: BTreeMap::new(),
            system: SystemProperties::default(),
        }
    }

    /// Builder-style property setter
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set_property(key, value);
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body decoded as UTF-8, replacing invalid sequences
    pub fn body_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn contains_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn remove_property(&mut self, key: &str) -> Option<PropertyValue> {
        self.properties.remove(key)
    }

    pub const fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    pub const fn system(&self) -> &SystemProperties {
        &self.system
    }

    /// Queue-side access to the system properties
    pub(crate) const fn system_mut(&mut self) -> &mut SystemProperties {
        &mut self.system
    }

    pub const fn sequence_number(&self) -> Option<SequenceNumber> {
        self.system.sequence_number
    }

    pub const fn lock_token(&self) -> Option<LockToken> {
        self.system.lock_token
    }

    pub const fn delivery_count(&self) -> u32 {
        self.system.delivery_count
    }

    /// Copy the body and user properties into a new, unsent message
    ///
    /// System properties are cleared; the queue assigns fresh ones when the
    /// copy is enqueued.
    #[must_use]
    pub fn clone_for_resend(&self) -> Self {
        Self {
            body: Arc::clone(&self.body),
            properties: self.properties.clone(),
            system: SystemProperties::default(),
        }
    }
}
