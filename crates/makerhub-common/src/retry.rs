//! Backoff and timeout utilities for host-scheduled work.

use std::future::Future;
use std::time::Duration;

use crate::MakerHubError;

/// Exponential backoff policy.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Maximum number of attempts before giving up (1 = no retries).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per failed attempt.
    pub backoff_multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Whether `failures` failed attempts use up the budget.
    pub fn exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }

    /// Delay to wait after the given number of failed attempts (1-indexed).
    pub fn delay_after_failures(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi((failures - 1) as i32);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }
}

/// Await `operation`, failing with [`MakerHubError::Timeout`] after `timeout`.
pub async fn with_timeout<T, Fut>(timeout: Duration, operation: Fut) -> Result<T, MakerHubError>
where
    Fut: Future<Output = T>,
{
    tokio::time::timeout(timeout, operation)
        .await
        .map_err(|_| MakerHubError::Timeout(timeout))
}
