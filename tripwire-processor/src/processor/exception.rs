use tripwire_common::tracing::error;

use crate::error::ProcessingError;

/// What the processor was doing when an error surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutingAction {
    /// Pulling the next message from the queue
    Receive,
    /// Running the retry controller on a delivered message
    UserCallback,
    /// Reading the entity status before serving
    Startup,
}

impl std::fmt::Display for ExecutingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Receive => "Receive",
            Self::UserCallback => "UserCallback",
            Self::Startup => "Startup",
        })
    }
}

/// Where an error surfaced
#[derive(Debug, Clone, Copy)]
pub struct ExceptionContext<'a> {
    pub endpoint: &'a str,
    pub entity_path: &'a str,
    pub action: ExecutingAction,
}

/// Out-of-band error hook
///
/// Invoked for errors that no message outcome accounts for. Implementations
/// must not touch retry state.
pub trait ExceptionHandler: Send + Sync + std::fmt::Debug {
    fn on_error(&self, error: &ProcessingError, context: &ExceptionContext<'_>);
}

/// Default hook: log and move on
#[derive(Debug, Default, Clone, Copy)]
pub struct LogExceptionHandler;

impl ExceptionHandler for LogExceptionHandler {
    fn on_error(&self, error: &ProcessingError, context: &ExceptionContext<'_>) {
        error!(
            endpoint = context.endpoint,
            entity_path = context.entity_path,
            executing_action = %context.action,
            error = %error,
            "Message handler encountered an exception"
        );
    }
}
