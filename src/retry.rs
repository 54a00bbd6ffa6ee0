//! Bounded retry with exponential backoff and jitter.
//!
//! Every outbound call runs through [`RetryPolicy::run`]. For attempt `i` in
//! `0..=max_retries` the operation is invoked; a failure is raised at once if
//! it is the last attempt or the error is not retryable. Otherwise the engine
//! sleeps and tries again:
//!
//! - HTTP 429 with a `Retry-After` hint: `min(retry_after, max_delay)`
//! - anything else retryable: `min(base * 2^i + jitter, max_delay)`, where the
//!   jitter is uniform in `[0, jitter_ratio * base * 2^i]`
//!
//! The error finally raised keeps its kind and records the attempt count.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::LookoutError;

/// Decides whether a failed attempt may be retried.
pub type RetryPredicate = fn(&LookoutError) -> bool;

/// Retry bounds and backoff constants.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each later one.
    pub base_delay: Duration,
    /// Ceiling on any single delay, including server-provided hints.
    pub max_delay: Duration,
    /// Upper bound of the random jitter as a fraction of the exponential delay.
    pub jitter: f64,
    retryable: RetryPredicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1_000), Duration::from_millis(10_000))
    }
}

impl RetryPolicy {
    /// Creates a policy with 10% jitter and the default retryability rules.
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter: 0.1,
            retryable: LookoutError::is_retryable,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Sets the jitter ratio (clamped to `0.0..=1.0`).
    #[must_use]
    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter = ratio.clamp(0.0, 1.0);
        self
    }

    /// Replaces the retryability predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.retryable = predicate;
        self
    }

    /// Returns true if the error may be retried under this policy.
    pub fn is_retryable(&self, error: &LookoutError) -> bool {
        (self.retryable)(error)
    }

    /// Delay to wait after `attempt` (0-based) failed with `error`.
    pub fn delay_for(&self, attempt: u32, error: &LookoutError) -> Duration {
        if error.is_rate_limit() {
            if let Some(retry_after) = error.retry_after() {
                return retry_after.min(self.max_delay);
            }
        }
        self.backoff(attempt)
    }

    /// Exponential delay with jitter for a 0-based attempt number.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let max_ms = self.max_delay.as_millis() as f64;
        let exponential = self.base_delay.as_millis() as f64 * 2f64.powi(attempt.min(62) as i32);
        if exponential >= max_ms {
            return self.max_delay;
        }

        let jitter = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..=exponential * self.jitter)
        } else {
            0.0
        };

        Duration::from_millis((exponential + jitter).min(max_ms) as u64)
    }

    /// Runs `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `operation` receives the 0-based attempt number.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        correlation_id: &str,
        mut f: F,
    ) -> Result<T, LookoutError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, LookoutError>>,
    {
        let mut attempt = 0u32;

        loop {
            match f(attempt).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    let attempts = attempt + 1;
                    if attempt >= self.max_retries || !self.is_retryable(&e) {
                        if attempts > 1 {
                            tracing::debug!(
                                operation = operation,
                                correlation_id = correlation_id,
                                attempts = attempts,
                                "All retry attempts exhausted"
                            );
                        }
                        return Err(e.with_attempts(attempts));
                    }

                    let delay = self.delay_for(attempt, &e);
                    tracing::debug!(
                        operation = operation,
                        correlation_id = correlation_id,
                        attempt = attempts,
                        max_attempts = self.max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
