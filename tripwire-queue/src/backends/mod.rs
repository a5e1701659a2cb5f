//! Queue implementations
//!
//! - `memory`: In-process peek-lock queue with scheduled delivery
//! - `test`: Wrapper over `memory` with call counters, failure injection
//!   and synchronisation helpers

pub mod memory;

pub use memory::{DeadLetter, MemoryQueue};
pub use test::TestQueue;
