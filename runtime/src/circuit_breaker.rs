//! Circuit breaker for calls to an external dependency.
//!
//! Tracks consecutive failures and stops issuing calls once a threshold
//! is reached, failing fast for a cooldown period instead of piling
//! load on a dependency that is already down.
//!
//! States: `Closed` (normal operation) -> `Open` (reject immediately)
//! -> `HalfOpen` (probe with limited traffic after the cooldown) ->
//! back to `Closed` once enough probes succeed.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Cooldown before an open circuit allows a probe
    pub cooldown: Duration,
    /// Successful probes required to close the circuit again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// Observable state of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Requests pass through normally
    Closed,
    /// Requests are rejected without being attempted
    Open,
    /// Limited probe traffic is allowed to test recovery
    HalfOpen,
}

/// Errors produced by a guarded call.
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    /// The circuit is open; the call was not attempted
    #[error("circuit breaker is open, call rejected")]
    Open,
    /// The call was attempted and failed
    #[error(transparent)]
    Inner(E),
}

impl<E: crate::Retryable> crate::Retryable for BreakerError<E> {
    fn is_retryable(&self) -> bool {
        match self {
            // an open circuit means the dependency is known-bad; back
            // off instead of hammering it
            Self::Open => false,
            Self::Inner(inner) => inner.is_retryable(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    probe_successes: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker guarding calls to one dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a breaker in the closed state.
    #[must_use]
    pub const fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                probe_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Current state, transitioning `Open -> HalfOpen` when the
    /// cooldown has elapsed.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Runs `operation` through the breaker.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::Open`] without calling `operation` when
    /// the circuit is open, or [`BreakerError::Inner`] when the call
    /// itself fails.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire() {
            tracing::warn!("circuit breaker is open, rejecting call");
            return Err(BreakerError::Open);
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(BreakerError::Inner(err))
            }
        }
    }

    /// Forces the breaker back to closed (manual intervention, tests).
    pub fn reset(&self) {
        let mut inner = self.lock();
        tracing::info!("circuit breaker manually reset to CLOSED");
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.probe_successes = 0;
        inner.opened_at = None;
    }

    fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state != BreakerState::Open
    }

    fn refresh(&self, inner: &mut Inner) {
        if inner.state == BreakerState::Open {
            let cooled_down = inner
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.config.cooldown);
            if cooled_down {
                tracing::info!("circuit breaker transitioning OPEN -> HALF_OPEN");
                inner.state = BreakerState::HalfOpen;
                inner.probe_successes = 0;
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => inner.consecutive_failures = 0,
            BreakerState::HalfOpen => {
                inner.probe_successes += 1;
                if inner.probe_successes >= self.config.success_threshold {
                    tracing::info!(
                        probes = inner.probe_successes,
                        "circuit breaker transitioning HALF_OPEN -> CLOSED"
                    );
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    inner.probe_successes = 0;
                    inner.opened_at = None;
                }
            }
            BreakerState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "circuit breaker transitioning CLOSED -> OPEN"
                    );
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::HalfOpen => {
                tracing::warn!("probe failed, circuit breaker transitioning HALF_OPEN -> OPEN");
                inner.state = BreakerState::Open;
                inner.consecutive_failures = 1;
                inner.probe_successes = 0;
                inner.opened_at = Some(Instant::now());
            }
            BreakerState::Open => {
                inner.opened_at = Some(Instant::now());
            }
        }
    }

    #[allow(clippy::unwrap_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock can only be poisoned by a panic while holding it, and
        // nothing here panics while holding the lock.
        self.inner.lock().unwrap()
    }
}
