//! Retry policy for transient API failures
//!
//! Exponential backoff with jitter, capped at a maximum delay. Rate-limit
//! responses that carry an explicit wait hint override the computed delay.

use crate::domain::MeridianError;
use rand::Rng;
use std::time::Duration;

/// Backoff schedule for retryable failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts including the first
    pub max_attempts: usize,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,

    /// Fraction of the delay added as random jitter (0.0 disables)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Whether another attempt should be made after `attempt` failures.
    pub fn should_retry(&self, attempt: usize, error: &MeridianError) -> bool {
        attempt < self.max_attempts && error.is_retryable()
    }

    /// Delay before retry number `attempt` (1-based), honoring any wait
    /// hint the error carries.
    pub fn delay_for(&self, attempt: usize, error: &MeridianError) -> Duration {
        if let Some(hint) = error.retry_hint() {
            return hint.min(self.max_delay);
        }

        let exp = attempt.saturating_sub(1).min(16) as u32;
        let base = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);

        if self.jitter > 0.0 {
            let jitter_ms =
                (base.as_millis() as f64 * self.jitter * rand::thread_rng().gen::<f64>()) as u64;
            (base + Duration::from_millis(jitter_ms)).min(self.max_delay)
        } else {
            base
        }
    }
}

/// Runs `operation`, retrying per the policy on retryable errors.
///
/// Non-retryable errors are returned immediately. The last error is
/// returned once attempts are exhausted.
pub async fn retry_request<F, T, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    operation: F,
) -> crate::domain::Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = crate::domain::Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if !policy.should_retry(attempt, &e) {
                    return Err(e);
                }

                let delay = policy.delay_for(attempt, &e);
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
