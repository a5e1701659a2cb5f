pub mod backends;
pub mod config;
pub mod error;
pub mod message;
pub mod r#trait;
pub mod types;

pub use backends::{DeadLetter, MemoryQueue, TestQueue};
pub use config::QueueConfig;
pub use error::{QueueError, Result};
pub use message::{Message, PropertyValue, SystemProperties};
pub use r#trait::{MessageReceiver, MessageScheduler, QueueAdmin};
pub use types::{EntityStatus, LockToken, SequenceNumber};
