//! Retry delay calculation

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Growth curve of the retry delay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backoff {
    /// `base * attempt`
    #[default]
    Linear,
    /// `base * 2^(attempt - 1)`
    Exponential,
}

/// Calculate the delay before the given retry attempt
///
/// # Formula
/// `delay = min(curve(base, attempt), max_delay) * (1 ± jitter)`
///
/// # Arguments
/// * `backoff` - Growth curve
/// * `attempt` - The retry number (1-indexed)
/// * `base_delay_secs` - Base delay in seconds
/// * `max_delay_secs` - Optional cap in seconds
/// * `jitter_factor` - Jitter factor (e.g., 0.2 for ±20%, 0.0 to disable)
pub fn calculate_delay(
    backoff: Backoff,
    attempt: u32,
    base_delay_secs: u64,
    max_delay_secs: Option<u64>,
    jitter_factor: f64,
) -> Duration {
    let delay = match backoff {
        Backoff::Linear => base_delay_secs.saturating_mul(u64::from(attempt)),
        Backoff::Exponential => {
            let exponent = attempt.saturating_sub(1);
            if exponent >= 63 {
                u64::MAX
            } else {
                base_delay_secs.saturating_mul(1u64 << exponent)
            }
        }
    };

    let delay = max_delay_secs.map_or(delay, |max| delay.min(max));

    if jitter_factor <= 0.0 || delay == 0 {
        return Duration::from_secs(delay);
    }

    // Intentional precision loss and casting for randomization
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let jittered = {
        let jitter_range = (delay as f64) * jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        ((delay as f64) + jitter).max(0.0) as u64
    };

    Duration::from_secs(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff_calculation() {
        let delays = (1..=4)
            .map(|attempt| calculate_delay(Backoff::Linear, attempt, 5, None, 0.0).as_secs())
            .collect::<Vec<_>>();
        assert_eq!(delays, vec![5, 10, 15, 20]);
    }

    #[test]
    fn test_linear_backoff_is_strictly_increasing() {
        for attempt in 1..50 {
            let current = calculate_delay(Backoff::Linear, attempt, 3, None, 0.0);
            let next = calculate_delay(Backoff::Linear, attempt + 1, 3, None, 0.0);
            assert!(next > current, "delay({}) <= delay({attempt})", attempt + 1);
        }
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        assert_eq!(
            calculate_delay(Backoff::Exponential, 1, 60, None, 0.0).as_secs(),
            60
        );
        assert_eq!(
            calculate_delay(Backoff::Exponential, 2, 60, None, 0.0).as_secs(),
            120
        );
        assert_eq!(
            calculate_delay(Backoff::Exponential, 3, 60, None, 0.0).as_secs(),
            240
        );
        assert_eq!(
            calculate_delay(Backoff::Exponential, 200, 60, None, 0.0).as_secs(),
            u64::MAX
        );
    }

    #[test]
    fn test_max_delay_caps_both_curves() {
        assert_eq!(
            calculate_delay(Backoff::Linear, 100, 60, Some(600), 0.0).as_secs(),
            600
        );
        assert_eq!(
            calculate_delay(Backoff::Exponential, 20, 60, Some(86400), 0.0).as_secs(),
            86400
        );
    }

    #[test]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation
    )]
    fn test_backoff_with_jitter() {
        let jitter_factor = 0.2;

        let delay = calculate_delay(Backoff::Linear, 2, 60, None, jitter_factor).as_secs();

        let expected = 120;
        let min = expected - (expected as f64 * jitter_factor) as u64;
        let max = expected + (expected as f64 * jitter_factor) as u64;
        assert!(
            delay >= min && delay <= max,
            "Delay {delay} should be within jitter range [{min}, {max}]"
        );
    }

    #[test]
    fn test_zero_base_is_immediate() {
        assert_eq!(
            calculate_delay(Backoff::Linear, 4, 0, None, 0.5),
            Duration::ZERO
        );
    }
}
