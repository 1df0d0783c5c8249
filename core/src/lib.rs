//! # TravelMaster Core
//!
//! Domain model for the TravelMaster booking lifecycle.
//!
//! This crate holds the pure parts of the system: value objects, the
//! booking status state machine, the `Booking` aggregate, the error
//! taxonomy, and the lifecycle events emitted for downstream consumers.
//! Nothing in here performs I/O; collaborators (trip inventory, payment
//! gateway, persistence) are abstracted behind traits in their own
//! crates and injected where needed.
//!
//! ## Core concepts
//!
//! - **State machine**: pure lookup over `(BookingStatus, BookingEvent)`.
//!   The persisted status is the only source of truth; no machine
//!   instance exists per booking.
//! - **Aggregate**: [`booking::Booking`] owns its passengers and
//!   enforces booking-level invariants (cancellable states, paid
//!   states, sufficient payment).
//! - **Error taxonomy**: [`error::BookingError`] distinguishes business
//!   rule violations, not-found lookups, concurrency conflicts, and
//!   transient infrastructure failures so callers can pattern-match on
//!   recoverability.

pub mod booking;
pub mod environment;
pub mod error;
pub mod event;
pub mod status;
pub mod types;

pub use booking::{Booking, Gender, Passenger};
pub use environment::{Clock, SystemClock};
pub use error::BookingError;
pub use event::{EventPublisher, LifecycleEvent, PublishError};
pub use status::{BookingEvent, BookingStatus, is_transition_valid, next_status};
pub use types::{BookingId, BookingReference, Currency, Money, PaymentId, TripId, UserId};
