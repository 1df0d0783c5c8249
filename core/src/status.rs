//! Booking status state machine.
//!
//! A pure lookup over `(current status, event)`. There is no machine
//! instance per booking: each check is evaluated fresh from the
//! booking's persisted status, so concurrent transition attempts from
//! the same source state observe the same rule set. The aggregate's
//! version counter is what actually prevents a double-apply race.
//!
//! Legal transitions:
//!
//! ```text
//! PENDING ──CONFIRM──► CONFIRMED ──PAY──► PAID ──COMPLETE──► COMPLETED
//!    │                     │               │
//!    └──────CANCEL─────────┴────CANCEL─────┴──► CANCELLED
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a booking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    /// Created, awaiting seat reservation
    #[default]
    Pending,
    /// Seats reserved in trip inventory
    Confirmed,
    /// Payment received
    Paid,
    /// Trip took place (terminal)
    Completed,
    /// Cancelled by the user or by compensation (terminal)
    Cancelled,
}

impl BookingStatus {
    /// Whether no further transition is possible from this status
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Paid => "PAID",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{name}")
    }
}

/// Event driving a booking status transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingEvent {
    /// Seats reserved, booking confirmed
    Confirm,
    /// Payment received
    Pay,
    /// Trip took place
    Complete,
    /// Booking cancelled
    Cancel,
}

impl fmt::Display for BookingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Confirm => "CONFIRM",
            Self::Pay => "PAY",
            Self::Complete => "COMPLETE",
            Self::Cancel => "CANCEL",
        };
        write!(f, "{name}")
    }
}

/// Returns the status reached by applying `event` in `status`, or
/// `None` when no transition is defined for the pair.
#[must_use]
pub const fn next_status(status: BookingStatus, event: BookingEvent) -> Option<BookingStatus> {
    use BookingEvent as E;
    use BookingStatus as S;

    match (status, event) {
        (S::Pending, E::Confirm) => Some(S::Confirmed),
        (S::Confirmed, E::Pay) => Some(S::Paid),
        (S::Paid, E::Complete) => Some(S::Completed),
        (S::Pending | S::Confirmed | S::Paid, E::Cancel) => Some(S::Cancelled),
        _ => None,
    }
}

/// Whether applying `event` in `status` is legal.
#[must_use]
pub const fn is_transition_valid(status: BookingStatus, event: BookingEvent) -> bool {
    next_status(status, event).is_some()
}
