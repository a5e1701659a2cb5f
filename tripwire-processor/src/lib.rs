//! Consumer-side retry, backoff and circuit breaking for peek-lock queues
//!
//! This crate provides functionality to:
//! - Track a per-message retry count inside the message's property bag
//! - Reschedule clones of unhealthy messages with a growing delay
//! - Disable receive on the queue entity once retries are exhausted
//! - Run the above concurrently over a queue receiver with graceful shutdown

mod backoff;
mod circuit_breaker;
mod controller;
mod downstream;
mod error;
mod health;
pub mod policy;
mod processor;
pub mod retry_state;

pub use backoff::{Backoff, calculate_delay};
pub use circuit_breaker::{CircuitBreaker, TripOutcome};
pub use controller::{AckMode, Collaborators, ControllerConfig, Outcome, RetryController};
pub use downstream::{Downstream, LogDownstream};
pub use error::{ConfigError, ProcessingError};
pub use health::{FnHealthCheck, HealthCheck, HealthChecker};
pub use policy::RetryPolicy;
pub use processor::{
    MessageProcessor,
    exception::{ExceptionContext, ExceptionHandler, ExecutingAction, LogExceptionHandler},
    stats::{ProcessorStats, StatsSnapshot},
};
pub use retry_state::RetryState;
