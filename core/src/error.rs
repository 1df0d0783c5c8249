//! Error taxonomy for the booking lifecycle.
//!
//! Callers pattern-match on recoverability instead of catching by
//! exception subtype: business violations and not-found are
//! caller-recoverable rejections, concurrency conflicts mean re-read
//! and retry, transient failures may be retried with backoff.

use thiserror::Error;

/// Errors surfaced by booking lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// A domain constraint rejected the operation (4xx-equivalent,
    /// never retried automatically)
    #[error("business rule violated: {0}")]
    BusinessRule(String),

    /// The referenced entity does not exist (404-equivalent)
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up
        entity: &'static str,
        /// Identifier that failed to resolve
        id: String,
    },

    /// A version check failed while persisting; the caller should
    /// re-read and retry the whole operation
    #[error("concurrent modification of booking {id}: expected version {expected}, found {actual}")]
    ConcurrentModification {
        /// Booking whose persist lost the race
        id: String,
        /// Version the write was conditioned on
        expected: u64,
        /// Version actually found in storage
        actual: u64,
    },

    /// Infrastructure failure (collaborator unreachable, timeout);
    /// retryable with backoff up to a bounded attempt count
    #[error("transient failure during {operation}: {reason}")]
    Transient {
        /// The operation that failed
        operation: &'static str,
        /// Underlying cause
        reason: String,
    },
}

impl BookingError {
    /// Shorthand for a business rule violation
    #[must_use]
    pub fn business(message: impl Into<String>) -> Self {
        Self::BusinessRule(message.into())
    }

    /// Shorthand for a not-found lookup
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a transient infrastructure failure
    #[must_use]
    pub fn transient(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Transient {
            operation,
            reason: reason.into(),
        }
    }

    /// Whether the caller may retry the operation (after a fresh read
    /// for concurrency conflicts, with backoff for transient failures)
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentModification { .. } | Self::Transient { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_the_taxonomy() {
        assert!(!BookingError::business("insufficient seats").is_retryable());
        assert!(!BookingError::not_found("booking", "b-1").is_retryable());
        assert!(
            BookingError::ConcurrentModification {
                id: "b-1".into(),
                expected: 1,
                actual: 2,
            }
            .is_retryable()
        );
        assert!(BookingError::transient("reserve_seats", "timeout").is_retryable());
    }
}
