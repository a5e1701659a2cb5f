use serde::{Deserialize, Serialize};

/// Token identifying one peek-locked delivery of a message
///
/// A fresh token is issued on every receive, so a redelivered message carries
/// a different token than the delivery whose lock expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockToken {
    id: ulid::Ulid,
}

impl LockToken {
    /// Create a lock token from a ULID
    #[must_use]
    pub const fn new(id: ulid::Ulid) -> Self {
        Self { id }
    }

    /// Generate a new unique lock token
    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }

    /// Get the underlying ULID
    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.id
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Position of a message in its queue, assigned by the queue on enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceNumber(pub i64);

impl SequenceNumber {
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Administrative state of a queue entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityStatus {
    /// Sending and receiving are both allowed
    #[default]
    Active,
    /// Messages may be sent, but receivers are refused
    ReceiveDisabled,
    /// Messages may be received, but senders are refused
    SendDisabled,
    /// Both directions are refused
    Disabled,
}

impl EntityStatus {
    /// Whether receivers may take messages from the entity
    #[must_use]
    pub const fn can_receive(self) -> bool {
        matches!(self, Self::Active | Self::SendDisabled)
    }

    /// Whether senders (including scheduled sends) are accepted
    #[must_use]
    pub const fn can_send(self) -> bool {
        matches!(self, Self::Active | Self::ReceiveDisabled)
    }
}

impl std::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Active => "Active",
            Self::ReceiveDisabled => "ReceiveDisabled",
            Self::SendDisabled => "SendDisabled",
            Self::Disabled => "Disabled",
        };
        f.write_str(name)
    }
}
