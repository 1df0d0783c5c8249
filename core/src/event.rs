//! Lifecycle events published for notification and audit consumers.
//!
//! Delivery is fire-and-forget and at-least-once, unordered across
//! bookings; consumers must be idempotent per booking and event type.

use crate::types::{BookingId, BookingReference, Currency, Money, PaymentId, TripId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A booking lifecycle event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// Booking persisted as `PENDING`
    Created {
        /// Booking identifier
        booking_id: BookingId,
        /// Booking reference
        reference: BookingReference,
        /// Owning user
        user_id: UserId,
        /// Booked trip
        trip_id: TripId,
        /// Number of passengers
        passengers: u32,
        /// Total amount due
        total_amount: Money,
        /// Currency of the amount
        currency: Currency,
        /// When the booking was created
        created_at: DateTime<Utc>,
    },
    /// Seats reserved, booking moved to `CONFIRMED`
    Confirmed {
        /// Booking identifier
        booking_id: BookingId,
        /// Booking reference
        reference: BookingReference,
        /// Owning user
        user_id: UserId,
        /// Booked trip
        trip_id: TripId,
        /// When the booking was confirmed
        confirmed_at: DateTime<Utc>,
    },
    /// Payment applied, booking moved to `PAID`
    Paid {
        /// Booking identifier
        booking_id: BookingId,
        /// Booking reference
        reference: BookingReference,
        /// Owning user
        user_id: UserId,
        /// Payment record applied to the booking
        payment_id: PaymentId,
        /// Amount actually paid
        paid_amount: Money,
        /// Currency of the amount
        currency: Currency,
        /// When the payment was applied
        paid_at: DateTime<Utc>,
    },
    /// Booking moved to `CANCELLED`
    Cancelled {
        /// Booking identifier
        booking_id: BookingId,
        /// Booking reference
        reference: BookingReference,
        /// Owning user
        user_id: UserId,
        /// Booked trip
        trip_id: TripId,
        /// Cancellation reason, stored verbatim
        reason: String,
        /// Refund owed, when the booking had been paid
        refund_amount: Option<Money>,
        /// When the booking was cancelled
        cancelled_at: DateTime<Utc>,
    },
    /// Trip took place, booking moved to `COMPLETED`
    Completed {
        /// Booking identifier
        booking_id: BookingId,
        /// Booking reference
        reference: BookingReference,
        /// Owning user
        user_id: UserId,
        /// Booked trip
        trip_id: TripId,
        /// When the booking was completed
        completed_at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    /// Booking this event belongs to
    #[must_use]
    pub const fn booking_id(&self) -> BookingId {
        match self {
            Self::Created { booking_id, .. }
            | Self::Confirmed { booking_id, .. }
            | Self::Paid { booking_id, .. }
            | Self::Cancelled { booking_id, .. }
            | Self::Completed { booking_id, .. } => *booking_id,
        }
    }

    /// Stable event type name, used for consumer idempotency keys
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Created { .. } => "BookingCreated",
            Self::Confirmed { .. } => "BookingConfirmed",
            Self::Paid { .. } => "BookingPaid",
            Self::Cancelled { .. } => "BookingCancelled",
            Self::Completed { .. } => "BookingCompleted",
        }
    }
}

/// Errors from event publishing.
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    /// The event bus rejected or could not accept the event
    #[error("publish failed for {event_type}: {reason}")]
    Failed {
        /// Event type that failed to publish
        event_type: &'static str,
        /// Underlying cause
        reason: String,
    },
}

/// Publisher for lifecycle events.
///
/// Implementations must not block the booking operation on delivery;
/// the service treats publish failures as log-and-continue.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a lifecycle event.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when the event could not be handed off.
    async fn publish(&self, event: LifecycleEvent) -> Result<(), PublishError>;
}
