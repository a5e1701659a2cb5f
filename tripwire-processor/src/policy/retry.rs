//! Retry policy for unhealthy evaluations.
//!
//! Decides, from the retry count carried on a message, whether to reschedule
//! it and with what delay, or to trip the circuit breaker.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    backoff::{Backoff, calculate_delay},
    error::ConfigError,
};

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retry count at which the circuit breaker trips.
    ///
    /// Must be at least 1. A ceiling of 1 trips on the first unhealthy
    /// evaluation without rescheduling.
    ///
    /// Default: 5
    #[serde(default = "defaults::retry_ceiling")]
    pub retry_ceiling: u32,

    /// Base delay between retries (in seconds).
    ///
    /// Default: 5 seconds
    #[serde(default = "defaults::base_interval_secs")]
    pub base_interval_secs: u64,

    /// Growth curve applied to the base delay.
    ///
    /// Default: `Linear`
    #[serde(default)]
    pub backoff: Backoff,

    /// Cap on any single delay (in seconds).
    ///
    /// Default: None (uncapped)
    #[serde(default)]
    pub max_delay_secs: Option<u64>,

    /// Jitter factor for randomizing retry delays (0.0 to 1.0).
    ///
    /// Default: 0.0 (no jitter)
    #[serde(default)]
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_ceiling: defaults::retry_ceiling(),
            base_interval_secs: defaults::base_interval_secs(),
            backoff: Backoff::default(),
            max_delay_secs: None,
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject configurations that cannot be evaluated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroRetryCeiling`] or
    /// [`ConfigError::InvalidJitter`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_ceiling == 0 {
            return Err(ConfigError::ZeroRetryCeiling);
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidJitter(self.jitter_factor.to_string()));
        }

        Ok(())
    }

    /// Whether reaching `updated_count` exhausts the retries.
    ///
    /// Also stops chains carrying a counter above a lowered ceiling.
    #[must_use]
    pub const fn should_trip(&self, updated_count: u32) -> bool {
        updated_count >= self.retry_ceiling
    }

    /// Number of reschedules left before the breaker trips.
    #[must_use]
    pub const fn remaining_retries(&self, retry_count: u32) -> u32 {
        self.retry_ceiling
            .saturating_sub(retry_count)
            .saturating_sub(1)
    }

    /// Delay before the given retry.
    #[must_use]
    pub fn delay_for(&self, updated_count: u32) -> Duration {
        calculate_delay(
            self.backoff,
            updated_count,
            self.base_interval_secs,
            self.max_delay_secs,
            self.jitter_factor,
        )
    }

    /// When a clone carrying `updated_count` should become visible.
    #[must_use]
    pub fn visible_at(&self, updated_count: u32, now: DateTime<Utc>) -> (Duration, DateTime<Utc>) {
        let delay = self.delay_for(updated_count);
        let at = TimeDelta::from_std(delay)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (delay, at)
    }
}

mod defaults {
    pub const fn retry_ceiling() -> u32 {
        5
    }

    pub const fn base_interval_secs() -> u64 {
        5
    }
}
