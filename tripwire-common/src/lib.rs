pub mod logging;

pub use tracing;

/// Lifecycle signals broadcast by the hosting process to long-running tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
