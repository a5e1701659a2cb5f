use serde::Deserialize;

use crate::backends::MemoryQueue;

const fn default_lock_duration_secs() -> u64 {
    60
}

fn default_entity() -> String {
    "tripwire".to_string()
}

fn default_endpoint() -> String {
    "memory://localhost/".to_string()
}

/// Configuration for the queue entity a processor consumes
///
/// # Examples
///
/// ```ron
/// Tripwire (
///     queue: (
///         entity: "orders",
///         lock_duration_secs: 30,
///         capacity: Some(10000),
///     ),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueConfig {
    /// Name (path) of the queue entity
    #[serde(default = "default_entity")]
    pub entity: String,
    /// Namespace endpoint reported in diagnostics
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// How long a received message stays locked before redelivery
    #[serde(default = "default_lock_duration_secs")]
    pub lock_duration_secs: u64,
    /// Maximum number of messages held (omit for unlimited)
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            entity: default_entity(),
            endpoint: default_endpoint(),
            lock_duration_secs: default_lock_duration_secs(),
            capacity: None,
        }
    }
}

impl QueueConfig {
    /// Build the in-memory queue described by this configuration
    #[must_use]
    pub fn into_memory_queue(self) -> MemoryQueue {
        let queue = MemoryQueue::new(self.entity)
            .with_endpoint(self.endpoint)
            .with_lock_duration(std::time::Duration::from_secs(self.lock_duration_secs));

        match self.capacity {
            Some(capacity) => queue.with_capacity(capacity),
            None => queue,
        }
    }
}
