//! Message processor orchestration

pub mod exception;
mod process;
pub mod stats;

use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use tokio::{sync::broadcast, task::JoinSet};
use tripwire_common::{
    Signal, internal,
    tracing::{debug, error, warn},
};
use tripwire_queue::MessageReceiver;

use self::{
    exception::{ExceptionContext, ExceptionHandler, ExecutingAction, LogExceptionHandler},
    stats::{ProcessorStats, StatsSnapshot},
};
use crate::{
    controller::{Collaborators, ControllerConfig, RetryController},
    error::{ConfigError, ProcessingError},
};

const fn default_max_concurrent_calls() -> usize {
    10
}

const fn default_receive_wait_ms() -> u64 {
    1000
}

const fn default_receive_error_backoff_ms() -> u64 {
    1000
}

const fn default_shutdown_timeout_secs() -> u64 {
    30
}

#[derive(Debug)]
pub(crate) struct Runtime {
    receiver: Arc<dyn MessageReceiver>,
    controller: Arc<RetryController>,
}

/// Concurrent consumer that feeds delivered messages to a [`RetryController`]
///
/// Each message is handled in its own task, with at most
/// `max_concurrent_calls` in flight. Completion of the peek-lock is left to
/// the controller; the processor never auto-completes.
#[derive(Debug, Deserialize)]
pub struct MessageProcessor {
    /// Maximum number of messages handled at once
    ///
    /// Default: 10
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,

    /// How long a single receive call waits for a message (in milliseconds)
    ///
    /// Default: 1000
    #[serde(default = "default_receive_wait_ms")]
    pub receive_wait_ms: u64,

    /// Pause after a failed receive before trying again (in milliseconds)
    ///
    /// Default: 1000
    #[serde(default = "default_receive_error_backoff_ms")]
    pub receive_error_backoff_ms: u64,

    /// How long in-flight messages may run after shutdown (in seconds)
    ///
    /// Tasks still running afterwards are aborted; their messages return
    /// through lock expiry.
    ///
    /// Default: 30
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Retry controller settings
    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(skip)]
    pub(crate) runtime: Option<Runtime>,

    #[serde(skip)]
    pub(crate) exception_handler: Option<Arc<dyn ExceptionHandler>>,

    #[serde(skip)]
    pub(crate) stats: Arc<ProcessorStats>,
}

impl Default for MessageProcessor {
    fn default() -> Self {
        Self {
            max_concurrent_calls: default_max_concurrent_calls(),
            receive_wait_ms: default_receive_wait_ms(),
            receive_error_backoff_ms: default_receive_error_backoff_ms(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            controller: ControllerConfig::default(),
            runtime: None,
            exception_handler: None,
            stats: Arc::default(),
        }
    }
}

impl MessageProcessor {
    /// Wire the processor to its collaborators
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::Config`] if the configuration is invalid.
    pub fn init(&mut self, collaborators: Collaborators) -> Result<(), ProcessingError> {
        internal!("Initialising Message Processor ...");

        if self.max_concurrent_calls == 0 {
            return Err(ConfigError::ZeroConcurrency.into());
        }

        let receiver = Arc::clone(&collaborators.receiver);
        let controller = RetryController::new(self.controller.clone(), collaborators)?;

        internal!(
            "Message processor for {} initialised with max_concurrent_calls={}, retry_ceiling={}, base_interval={}s, backoff={:?}, ack_mode={:?}",
            receiver.entity_path(),
            self.max_concurrent_calls,
            self.controller.retry.retry_ceiling,
            self.controller.retry.base_interval_secs,
            self.controller.retry.backoff,
            self.controller.ack_mode
        );

        self.runtime = Some(Runtime {
            receiver,
            controller: Arc::new(controller),
        });

        Ok(())
    }

    /// Replace the default logging exception hook
    #[must_use]
    pub fn with_exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.exception_handler = Some(handler);
        self
    }

    /// The controller built by `init`
    pub fn controller(&self) -> Option<&Arc<RetryController>> {
        self.runtime.as_ref().map(|runtime| &runtime.controller)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn exception_handler(&self) -> Arc<dyn ExceptionHandler> {
        self.exception_handler
            .clone()
            .unwrap_or_else(|| Arc::new(LogExceptionHandler))
    }

    /// Run the processor until a shutdown signal is received
    ///
    /// ## Graceful Shutdown
    ///
    /// When a shutdown signal is received:
    /// 1. Stop receiving new messages
    /// 2. Wait for in-flight messages to be handled (up to `shutdown_timeout_secs`)
    /// 3. Abort whatever is still running and exit
    ///
    /// # Errors
    ///
    /// Returns an error if the processor was not initialised, or if the
    /// startup status check fails (for example, the entity does not exist).
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn serve(
        &self,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), ProcessingError> {
        internal!("Message processor starting");

        let Some(runtime) = &self.runtime else {
            return Err(ConfigError::NotInitialised.into());
        };

        let handler = self.exception_handler();
        self.startup_check(runtime, handler.as_ref()).await?;

        let receive_wait = Duration::from_millis(self.receive_wait_ms);
        let receive_error_backoff = Duration::from_millis(self.receive_error_backoff_ms);
        let mut tasks = JoinSet::new();
        let mut entity_disabled = false;

        loop {
            while let Some(result) = tasks.try_join_next() {
                self.on_finished(runtime, handler.as_ref(), result);
            }

            if tasks.len() >= self.max_concurrent_calls {
                tokio::select! {
                    biased;
                    signal = shutdown.recv() => {
                        log_signal(&signal);
                        break;
                    }
                    Some(result) = tasks.join_next() => {
                        self.on_finished(runtime, handler.as_ref(), result);
                        continue;
                    }
                }
            }

            tokio::select! {
                biased;
                signal = shutdown.recv() => {
                    log_signal(&signal);
                    break;
                }
                received = runtime.receiver.receive(receive_wait) => match received {
                    Ok(Some(message)) => {
                        entity_disabled = false;
                        let controller = Arc::clone(&runtime.controller);
                        tasks.spawn(async move { controller.handle(message).await });
                    }
                    Ok(None) => entity_disabled = false,
                    Err(error) => {
                        // A disabled entity is reported once per outage; the
                        // breaker keeps it that way until an operator steps in.
                        if entity_disabled && error.is_entity_disabled() {
                            debug!(
                                entity_path = runtime.receiver.entity_path(),
                                error = %error,
                                "Entity still refuses receivers"
                            );
                        } else {
                            entity_disabled = error.is_entity_disabled();
                            self.stats.record_failure();
                            handler.on_error(
                                &ProcessingError::Transport(error),
                                &context(runtime, ExecutingAction::Receive),
                            );
                        }

                        tokio::select! {
                            biased;
                            signal = shutdown.recv() => {
                                log_signal(&signal);
                                break;
                            }
                            () = tokio::time::sleep(receive_error_backoff) => {}
                        }
                    }
                },
            }
        }

        self.drain(runtime, handler.as_ref(), tasks).await;

        internal!("Message processor shutdown complete");
        Ok(())
    }

    async fn startup_check(
        &self,
        runtime: &Runtime,
        handler: &dyn ExceptionHandler,
    ) -> Result<(), ProcessingError> {
        match runtime.controller.breaker().status().await {
            Ok(status) => {
                internal!(
                    level = INFO,
                    "Serving entity {} at {} (status: {status})",
                    runtime.receiver.entity_path(),
                    runtime.receiver.endpoint()
                );
                if !status.can_receive() {
                    warn!(
                        entity = runtime.receiver.entity_path(),
                        status = %status,
                        "Entity refuses receivers; the circuit is open until it is re-enabled"
                    );
                }
                Ok(())
            }
            Err(error) => {
                handler.on_error(&error, &context(runtime, ExecutingAction::Startup));
                Err(error)
            }
        }
    }

    async fn drain(
        &self,
        runtime: &Runtime,
        handler: &dyn ExceptionHandler,
        mut tasks: JoinSet<Result<crate::Outcome, ProcessingError>>,
    ) {
        if tasks.is_empty() {
            return;
        }

        debug!(in_flight = tasks.len(), "Waiting for in-flight messages");

        let shutdown_timeout = Duration::from_secs(self.shutdown_timeout_secs);
        let drained = tokio::time::timeout(shutdown_timeout, async {
            while let Some(result) = tasks.join_next().await {
                self.on_finished(runtime, handler, result);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "Shutdown timeout exceeded, {} in-flight messages will be redelivered after lock expiry",
                tasks.len()
            );
            tasks.shutdown().await;
        } else {
            internal!("All in-flight messages handled");
        }
    }
}

fn context(runtime: &Runtime, action: ExecutingAction) -> ExceptionContext<'_> {
    ExceptionContext {
        endpoint: runtime.receiver.endpoint(),
        entity_path: runtime.receiver.entity_path(),
        action,
    }
}

fn log_signal(signal: &Result<Signal, broadcast::error::RecvError>) {
    match signal {
        Ok(Signal::Shutdown | Signal::Finalised) => {
            internal!("Message processor received shutdown signal");
        }
        Err(e) => {
            error!("Message processor shutdown channel error: {e}");
        }
    }
}
