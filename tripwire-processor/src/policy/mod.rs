//! Policy abstractions for message processing.
//!
//! - [`RetryPolicy`]: Retry ceiling and backoff timing

pub mod retry;

pub use retry::RetryPolicy;
