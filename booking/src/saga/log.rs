//! Append-only audit trail of saga step attempts.
//!
//! Every saga step and its outcome is recorded before the saga
//! returns, so a failed saga is diagnosable (and replayable) without
//! re-deriving what already happened. Entries are never mutated after
//! insert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use travelmaster_core::BookingId;

/// Where a saga execution stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaState {
    /// Saga execution began
    Started,
    /// Seats reserved at the trip inventory
    SeatsReserved,
    /// Booking transitioned to `CONFIRMED` and persisted
    BookingConfirmed,
    /// Payment handed to the processor
    PaymentInitiated,
    /// Payment confirmed and applied to the booking
    PaymentCompleted,
    /// Saga finished successfully
    Completed,
    /// A step failed after earlier steps succeeded; compensation is
    /// running
    Compensating,
    /// Saga gave up; the error field says why
    Failed,
}

impl fmt::Display for SagaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Started => "STARTED",
            Self::SeatsReserved => "SEATS_RESERVED",
            Self::BookingConfirmed => "BOOKING_CONFIRMED",
            Self::PaymentInitiated => "PAYMENT_INITIATED",
            Self::PaymentCompleted => "PAYMENT_COMPLETED",
            Self::Completed => "COMPLETED",
            Self::Compensating => "COMPENSATING",
            Self::Failed => "FAILED",
        };
        write!(f, "{name}")
    }
}

/// One recorded saga step attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SagaLogEntry {
    /// Booking the saga runs for
    pub booking_id: BookingId,
    /// Saga state after this step
    pub state: SagaState,
    /// Short machine-friendly step name, e.g. `reserve_seats`
    pub step: String,
    /// Human-readable description of what happened
    pub description: String,
    /// Error text when the step failed
    pub error: Option<String>,
    /// When the entry was recorded
    pub recorded_at: DateTime<Utc>,
}

impl SagaLogEntry {
    /// Builds an entry for a successful step.
    #[must_use]
    pub fn step(
        booking_id: BookingId,
        state: SagaState,
        step: impl Into<String>,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            booking_id,
            state,
            step: step.into(),
            description: description.into(),
            error: None,
            recorded_at: now,
        }
    }

    /// Builds an entry for a failed step.
    #[must_use]
    pub fn failure(
        booking_id: BookingId,
        state: SagaState,
        step: impl Into<String>,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            booking_id,
            state,
            step: step.into(),
            description: String::new(),
            error: Some(error.into()),
            recorded_at: now,
        }
    }
}

/// Append-only saga log.
///
/// Recording is infallible from the orchestrator's point of view;
/// implementations that can fail internally handle it themselves
/// (the saga outcome must never depend on the audit trail).
pub trait SagaLog: Send + Sync {
    /// Appends one entry.
    fn append(&self, entry: SagaLogEntry);

    /// All entries recorded for a booking, in append order.
    fn entries_for(&self, booking_id: BookingId) -> Vec<SagaLogEntry>;
}

/// In-memory append-only log.
#[derive(Debug, Default)]
pub struct InMemorySagaLog {
    entries: Mutex<Vec<SagaLogEntry>>,
}

impl InMemorySagaLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest state recorded for a booking, if any.
    #[must_use]
    pub fn last_state(&self, booking_id: BookingId) -> Option<SagaState> {
        self.lock()
            .iter()
            .rev()
            .find(|entry| entry.booking_id == booking_id)
            .map(|entry| entry.state)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SagaLogEntry>> {
        // a poisoned lock means a writer panicked mid-append; the log
        // holds plain data, continuing is safe
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SagaLog for InMemorySagaLog {
    fn append(&self, entry: SagaLogEntry) {
        self.lock().push(entry);
    }

    fn entries_for(&self, booking_id: BookingId) -> Vec<SagaLogEntry> {
        self.lock()
            .iter()
            .filter(|entry| entry.booking_id == booking_id)
            .cloned()
            .collect()
    }
}
