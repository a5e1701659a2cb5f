//! Per-message retry control
//!
//! For every delivered message the controller:
//!
//! 1. stamps first-seen retry metadata onto the property bag,
//! 2. completes the peek-lock (before or after the decision, see [`AckMode`]),
//! 3. asks the [`HealthCheck`] whether downstream work can proceed,
//! 4. on healthy, hands the message to the [`Downstream`] capability,
//! 5. on unhealthy, schedules a clone with an incremented `retry_count`
//!    after a backoff delay, or trips the [`CircuitBreaker`] once the retry
//!    ceiling is reached.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tripwire_common::tracing::{debug, info, instrument, warn};
use tripwire_queue::{LockToken, Message, MessageReceiver, MessageScheduler, QueueAdmin, SequenceNumber};

use crate::{
    circuit_breaker::{CircuitBreaker, TripOutcome},
    downstream::Downstream,
    error::ProcessingError,
    health::HealthCheck,
    policy::RetryPolicy,
    retry_state::RetryState,
};

const fn default_health_check_timeout_secs() -> u64 {
    10
}

const fn default_schedule_timeout_secs() -> u64 {
    30
}

const fn default_dead_letter_on_schedule_failure() -> bool {
    true
}

/// When the original delivery's peek-lock is completed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum AckMode {
    /// Complete on receipt, before the health check.
    ///
    /// A crash between completion and reschedule loses the chain.
    #[default]
    BeforeDecision,
    /// Complete only once the reschedule, trip or downstream hand-off
    /// finished. A failure leaves the original locked, so it is redelivered
    /// with its retry progress intact.
    AfterDecision,
}

/// Settings for [`RetryController`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ControllerConfig {
    /// Retry ceiling and backoff
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Placement of the peek-lock completion
    ///
    /// Default: `BeforeDecision`
    #[serde(default)]
    pub ack_mode: AckMode,

    /// Bound on a single health check (in seconds); a timeout counts as
    /// unhealthy.
    ///
    /// Default: 10 seconds
    #[serde(default = "default_health_check_timeout_secs")]
    pub health_check_timeout_secs: u64,

    /// Bound on scheduling a clone (in seconds); a timeout is a transport
    /// failure.
    ///
    /// Default: 30 seconds
    #[serde(default = "default_schedule_timeout_secs")]
    pub schedule_timeout_secs: u64,

    /// Move the clone to the dead-letter store when it cannot be scheduled.
    ///
    /// Default: `true`
    #[serde(default = "default_dead_letter_on_schedule_failure")]
    pub dead_letter_on_schedule_failure: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            ack_mode: AckMode::default(),
            health_check_timeout_secs: default_health_check_timeout_secs(),
            schedule_timeout_secs: default_schedule_timeout_secs(),
            dead_letter_on_schedule_failure: default_dead_letter_on_schedule_failure(),
        }
    }
}

/// External collaborators, constructed and owned by the hosting process
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub receiver: Arc<dyn MessageReceiver>,
    pub scheduler: Arc<dyn MessageScheduler>,
    pub admin: Arc<dyn QueueAdmin>,
    pub health: Arc<dyn HealthCheck>,
    pub downstream: Arc<dyn Downstream>,
}

/// What happened to a message
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Healthy: the message went downstream
    Completed {
        sequence_number: Option<SequenceNumber>,
        retry_count: u32,
    },
    /// Unhealthy: a clone will be redelivered at `visible_at`
    Rescheduled {
        sequence_number: Option<SequenceNumber>,
        retry_count: u32,
        delay: Duration,
        visible_at: DateTime<Utc>,
        scheduled_as: SequenceNumber,
    },
    /// The clone could not be scheduled and was dead-lettered instead
    DeadLettered {
        sequence_number: Option<SequenceNumber>,
        retry_count: u32,
        reason: String,
    },
    /// The retry ceiling was reached and receive is disabled
    ///
    /// `parked` is the unsent clone with its `retry_count` reset to zero, so
    /// a host that re-enqueues it starts a fresh chain.
    CircuitTripped {
        sequence_number: Option<SequenceNumber>,
        retry_count: u32,
        trip: TripOutcome,
        parked: Message,
    },
}

impl Outcome {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Rescheduled { .. } => "rescheduled",
            Self::DeadLettered { .. } => "dead_lettered",
            Self::CircuitTripped { .. } => "circuit_tripped",
        }
    }

    pub const fn sequence_number(&self) -> Option<SequenceNumber> {
        match self {
            Self::Completed {
                sequence_number, ..
            }
            | Self::Rescheduled {
                sequence_number, ..
            }
            | Self::DeadLettered {
                sequence_number, ..
            }
            | Self::CircuitTripped {
                sequence_number, ..
            } => *sequence_number,
        }
    }

    pub const fn retry_count(&self) -> u32 {
        match self {
            Self::Completed { retry_count, .. }
            | Self::Rescheduled { retry_count, .. }
            | Self::DeadLettered { retry_count, .. }
            | Self::CircuitTripped { retry_count, .. } => *retry_count,
        }
    }
}

/// Retry, backoff and breaker decisions for delivered messages
#[derive(Debug)]
pub struct RetryController {
    config: ControllerConfig,
    receiver: Arc<dyn MessageReceiver>,
    scheduler: Arc<dyn MessageScheduler>,
    health: Arc<dyn HealthCheck>,
    downstream: Arc<dyn Downstream>,
    breaker: CircuitBreaker,
}

impl RetryController {
    /// Build a controller over the receiver's entity
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::Config`] if the retry policy is invalid.
    pub fn new(
        config: ControllerConfig,
        collaborators: Collaborators,
    ) -> Result<Self, ProcessingError> {
        config.retry.validate()?;

        let Collaborators {
            receiver,
            scheduler,
            admin,
            health,
            downstream,
        } = collaborators;

        let breaker = CircuitBreaker::new(admin, receiver.entity_path());

        Ok(Self {
            config,
            receiver,
            scheduler,
            health,
            downstream,
            breaker,
        })
    }

    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Decide the fate of one delivered message
    ///
    /// # Errors
    ///
    /// Transport failures (complete, schedule) and admin failures (trip) are
    /// returned unretried. With [`AckMode::AfterDecision`] the original stays
    /// locked and is redelivered after lock expiry.
    #[instrument(level = "debug", skip_all, fields(sequence_number = ?message.sequence_number()))]
    pub async fn handle(&self, mut message: Message) -> Result<Outcome, ProcessingError> {
        let state = RetryState::initialise(&mut message);
        let lock_token = message.lock_token();

        if self.config.ack_mode == AckMode::BeforeDecision {
            self.acknowledge(lock_token).await?;
        }

        let outcome = if self.check_health().await {
            if let Err(error) = self.downstream.process(&message).await {
                warn!(
                    sequence_number = ?message.sequence_number(),
                    error = %error,
                    "Downstream processing failed"
                );
            }

            Outcome::Completed {
                sequence_number: message.sequence_number(),
                retry_count: state.retry_count,
            }
        } else {
            self.back_off(&message, state).await?
        };

        if self.config.ack_mode == AckMode::AfterDecision {
            self.acknowledge(lock_token).await?;
        }

        info!(
            sequence_number = ?outcome.sequence_number(),
            retry_count = outcome.retry_count(),
            outcome = outcome.name(),
            "Handled message"
        );

        Ok(outcome)
    }

    async fn acknowledge(&self, lock_token: Option<LockToken>) -> Result<(), ProcessingError> {
        match lock_token {
            Some(token) => self
                .receiver
                .complete(&token)
                .await
                .map_err(ProcessingError::Transport),
            None => {
                debug!("Message carries no lock token, nothing to complete");
                Ok(())
            }
        }
    }

    async fn check_health(&self) -> bool {
        let secs = self.config.health_check_timeout_secs;

        tokio::time::timeout(Duration::from_secs(secs), self.health.is_healthy())
            .await
            .unwrap_or_else(|_| {
                warn!(timeout_secs = secs, "Health check timed out, treating as unhealthy");
                false
            })
    }

    async fn back_off(
        &self,
        message: &Message,
        state: RetryState,
    ) -> Result<Outcome, ProcessingError> {
        let sequence_number = message.sequence_number();
        let updated = state.retry_count.saturating_add(1);

        if self.config.retry.should_trip(updated) {
            let mut parked = message.clone_for_resend();
            RetryState::store(&mut parked, 0);

            let trip = self.breaker.trip().await?;
            warn!(
                sequence_number = ?sequence_number,
                original_sequence_number = ?state.original_sequence_number,
                retry_count = updated,
                ceiling = self.config.retry.retry_ceiling,
                "Retry ceiling reached"
            );

            return Ok(Outcome::CircuitTripped {
                sequence_number,
                retry_count: updated,
                trip,
                parked,
            });
        }

        let (delay, visible_at) = self.config.retry.visible_at(updated, Utc::now());
        let mut clone = message.clone_for_resend();
        RetryState::store(&mut clone, updated);

        info!(
            sequence_number = ?sequence_number,
            retry_count = updated,
            remaining_retries = self.config.retry.remaining_retries(updated),
            "Scheduling message retry {updated} to wait {} seconds and arrive at {visible_at}",
            delay.as_secs()
        );

        let secs = self.config.schedule_timeout_secs;
        let scheduled = tokio::time::timeout(
            Duration::from_secs(secs),
            self.scheduler.schedule(clone.clone(), visible_at),
        )
        .await;

        let error = match scheduled {
            Ok(Ok(scheduled_as)) => {
                return Ok(Outcome::Rescheduled {
                    sequence_number,
                    retry_count: updated,
                    delay,
                    visible_at,
                    scheduled_as,
                });
            }
            Ok(Err(error)) => ProcessingError::Transport(error),
            Err(_) => ProcessingError::Timeout {
                operation: "schedule",
                secs,
            },
        };

        self.schedule_failed(clone, sequence_number, updated, error)
            .await
    }

    async fn schedule_failed(
        &self,
        clone: Message,
        sequence_number: Option<SequenceNumber>,
        retry_count: u32,
        error: ProcessingError,
    ) -> Result<Outcome, ProcessingError> {
        if !self.config.dead_letter_on_schedule_failure {
            return Err(error);
        }

        let reason = format!("Reschedule failed: {error}");
        match self.scheduler.dead_letter(clone, &reason).await {
            Ok(()) => {
                warn!(
                    sequence_number = ?sequence_number,
                    retry_count,
                    reason = %reason,
                    "Dead-lettered message"
                );
                Ok(Outcome::DeadLettered {
                    sequence_number,
                    retry_count,
                    reason,
                })
            }
            Err(dead_letter_error) => {
                warn!(
                    sequence_number = ?sequence_number,
                    error = %dead_letter_error,
                    "Dead-lettering failed"
                );
                Err(error)
            }
        }
    }
}
