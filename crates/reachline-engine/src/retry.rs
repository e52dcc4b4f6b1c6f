//! Bounded retry with exponential backoff.
//!
//! [`with_retry`] is a combinator over any fallible async operation: it
//! classifies each failure through the [`StageError`] retry metadata,
//! sleeps out the computed backoff, and gives observers a callback per
//! retry. Composition with the circuit breaker is explicit at the call
//! site: the breaker wraps the retried operation, so breaker state reflects
//! downstream health after local retries are exhausted.

use std::future::Future;
use std::time::Duration;

use reachline_types::error::StageError;

/// Retry policy for a class of operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = `max_retries + 1`).
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following failed attempt number `attempt`
    /// (0-based): `min(max_delay, initial_delay * backoff_factor^attempt)`,
    /// unless the error carries an explicit `retry_after_ms` hint.
    #[must_use]
    pub fn delay_for(&self, err: &StageError, attempt: u32) -> Duration {
        if let Some(ms) = err.retry_after_ms {
            return Duration::from_millis(ms).min(self.max_delay);
        }
        let factor = self.backoff_factor.powi(attempt.min(32) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Run `op` under `policy`, retrying transient failures with backoff.
///
/// Non-retryable errors propagate immediately. After `policy.max_retries`
/// retries the last observed error is returned. `on_retry(&err, attempt)`
/// fires before every backoff sleep with the failed attempt number
/// (0-based).
///
/// # Errors
///
/// Returns the first non-retryable error, or the last retryable error once
/// the retry budget is exhausted.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    mut on_retry: impl FnMut(&StageError, u32),
    mut op: F,
) -> Result<T, StageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StageError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.retryable && attempt < policy.max_retries => {
                let delay = policy.delay_for(&err, attempt);
                on_retry(&err, attempt);
                tracing::debug!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    category = %err.category,
                    code = %err.code,
                    "Retryable stage error, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
