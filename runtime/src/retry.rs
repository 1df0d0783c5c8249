//! Bounded retry with exponential backoff.
//!
//! Retries are only ever applied to errors the caller classifies as
//! retryable via [`Retryable`]; a business rejection fails immediately
//! no matter how many attempts remain.

use std::time::Duration;
use tokio::time::sleep;

/// Classifies whether an error is worth retrying.
///
/// Transient infrastructure failures (timeouts, unreachable services)
/// are retryable; domain rejections are not.
pub trait Retryable {
    /// Whether a retry could plausibly succeed
    fn is_retryable(&self) -> bool;
}

/// Retry policy: bounded attempts with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first (capped at 3 for
    /// payment-gateway calls per the platform contract)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Policy with the given attempt bound and default delays
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`,
    /// capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable
/// error, or the attempt budget is exhausted.
///
/// # Errors
///
/// Returns the last error observed when attempts run out, or the first
/// non-retryable error immediately.
pub async fn retry<F, Fut, T, E>(policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => {
                tracing::warn!(error = %err, "error is not retryable, failing immediately");
                return Err(err);
            }
            Err(err) if attempt >= policy.max_attempts => {
                tracing::error!(
                    attempt,
                    error = %err,
                    "operation failed, attempt budget exhausted"
                );
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_for(attempt - 1);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (retryable: {})", self.retryable)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    #[test]
    fn delays_grow_exponentially_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(10), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn succeeds_without_retrying() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<u32, TestError> = retry(RetryPolicy::default(), || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<&str, TestError> = retry(policy, || {
            let calls = Arc::clone(&calls_clone);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError { retryable: true })
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempt_budget() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        };
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<(), TestError> = retry(policy, || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError { retryable: true })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn business_errors_fail_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<(), TestError> = retry(RetryPolicy::default(), || {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError { retryable: false })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
