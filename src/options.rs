use std::time::Duration;

use rand::Rng;

use crate::{RelayError, Result};

/// Configures per-attempt timeout and retry behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first call. Must be at least 1.
    pub max_attempts: u32,
    /// Base retry backoff in milliseconds (exponential strategy).
    pub base_delay_ms: u64,
    /// Per-attempt timeout in milliseconds. Must be greater than zero.
    pub attempt_timeout_ms: u64,
    /// Upper bound (exclusive) of the additive jitter in milliseconds.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            attempt_timeout_ms: 25_000,
            jitter_ms: 120,
        }
    }
}

impl RetryPolicy {
    /// Rejects policies the executor cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(RelayError::Configuration(
                "max_attempts must be at least 1".to_owned(),
            ));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(RelayError::Configuration(
                "attempt_timeout_ms must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Delay to wait after failed attempt `attempt` before the next one.
    ///
    /// `base_delay_ms * 2^attempt + uniform[0, jitter_ms)`, saturating, with no
    /// ceiling.
    pub fn backoff_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let exponential = self.base_delay_ms.saturating_mul(multiplier);
        let jitter = if self.jitter_ms > 0 {
            rng.random_range(0..self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(exponential.saturating_add(jitter))
    }
}
