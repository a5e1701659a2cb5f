//! Bookkeeping for finished message tasks

use tokio::task::JoinError;
use tripwire_common::tracing::error;

use super::{
    MessageProcessor, Runtime, context,
    exception::{ExceptionHandler, ExecutingAction},
};
use crate::{controller::Outcome, error::ProcessingError};

impl MessageProcessor {
    /// Record the result of one handled message
    ///
    /// Errors go to the exception hook; a panicked or aborted task is only
    /// logged, since its message returns through lock expiry either way.
    pub(super) fn on_finished(
        &self,
        runtime: &Runtime,
        handler: &dyn ExceptionHandler,
        result: Result<Result<Outcome, ProcessingError>, JoinError>,
    ) {
        match result {
            Ok(Ok(outcome)) => self.stats.record(&outcome),
            Ok(Err(processing_error)) => {
                self.stats.record_failure();
                handler.on_error(
                    &processing_error,
                    &context(runtime, ExecutingAction::UserCallback),
                );
            }
            Err(join_error) => {
                self.stats.record_failure();
                error!(
                    entity_path = runtime.receiver.entity_path(),
                    error = %join_error,
                    "Message task did not finish"
                );
            }
        }
    }
}
