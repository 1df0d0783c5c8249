//! # TravelMaster Runtime
//!
//! Resilience primitives shared by the collaborators that cross a
//! process boundary (trip inventory, payment gateway): bounded retry
//! with exponential backoff, and a circuit breaker that stops hammering
//! an unavailable dependency.
//!
//! Both primitives are error-type agnostic; callers classify their own
//! errors via the [`retry::Retryable`] trait so business rejections are
//! never retried.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{BreakerError, BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use retry::{Retryable, RetryPolicy, retry};
