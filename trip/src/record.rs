//! The authoritative per-trip inventory record.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use travelmaster_core::{BookingReference, Currency, Money, TripId};

/// Trip availability status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TripStatus {
    /// Seats available for booking
    #[default]
    Available,
    /// No seats left; flips back to `Available` when seats are released
    Full,
    /// Trip cancelled by the provider, no reservations accepted
    Cancelled,
    /// Trip already took place
    Completed,
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Available => "AVAILABLE",
            Self::Full => "FULL",
            Self::Cancelled => "CANCELLED",
            Self::Completed => "COMPLETED",
        };
        write!(f, "{name}")
    }
}

/// Read-model snapshot of a trip, as returned to booking callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripSummary {
    /// Trip identifier
    pub id: TripId,
    /// Human-readable trip title
    pub title: String,
    /// Price per seat
    pub price: Money,
    /// Currency of the price
    pub currency: Currency,
    /// Seats currently available
    pub available_seats: u32,
    /// Total seats on the trip
    pub total_seats: u32,
    /// Availability status
    pub status: TripStatus,
}

/// Mutable inventory record for one trip.
///
/// Maintains `0 <= available_seats <= total_seats` and flips status to
/// `FULL` exactly when availability reaches zero (and back when it
/// becomes positive again). All mutation happens through
/// [`Self::reserve`] and [`Self::release`], which the store calls while
/// holding the write lock; that lock is the compare-and-swap boundary.
#[derive(Clone, Debug)]
pub struct TripRecord {
    id: TripId,
    title: String,
    price: Money,
    currency: Currency,
    total_seats: u32,
    available_seats: u32,
    status: TripStatus,
    /// Active reservations keyed by booking reference
    reservations: HashMap<String, u32>,
}

impl TripRecord {
    /// Creates a fully-available trip record.
    #[must_use]
    pub fn new(
        id: TripId,
        title: impl Into<String>,
        price: Money,
        currency: Currency,
        total_seats: u32,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            price,
            currency,
            total_seats,
            available_seats: total_seats,
            status: if total_seats == 0 {
                TripStatus::Full
            } else {
                TripStatus::Available
            },
            reservations: HashMap::new(),
        }
    }

    /// Trip identifier
    #[must_use]
    pub const fn id(&self) -> TripId {
        self.id
    }

    /// Seats currently available
    #[must_use]
    pub const fn available_seats(&self) -> u32 {
        self.available_seats
    }

    /// Total seats on the trip
    #[must_use]
    pub const fn total_seats(&self) -> u32 {
        self.total_seats
    }

    /// Availability status
    #[must_use]
    pub const fn status(&self) -> TripStatus {
        self.status
    }

    /// Marks the trip as cancelled by the provider.
    pub const fn mark_cancelled(&mut self) {
        self.status = TripStatus::Cancelled;
    }

    /// Snapshot for booking callers
    #[must_use]
    pub fn summary(&self) -> TripSummary {
        TripSummary {
            id: self.id,
            title: self.title.clone(),
            price: self.price,
            currency: self.currency,
            available_seats: self.available_seats,
            total_seats: self.total_seats,
            status: self.status,
        }
    }

    /// Seats held under the given reference, if any
    #[must_use]
    pub fn reservation(&self, reference: &BookingReference) -> Option<u32> {
        self.reservations.get(reference.as_str()).copied()
    }

    /// Reserves `seats` under `reference`, check-and-decrement.
    ///
    /// Idempotent per reference: a repeat call with a reference that
    /// already holds a reservation succeeds without taking more seats.
    ///
    /// Returns `Err` with the available count when there are not enough
    /// seats; the record is unchanged in that case.
    pub fn reserve(&mut self, reference: &BookingReference, seats: u32) -> Result<(), ReserveRejection> {
        if self.reservations.contains_key(reference.as_str()) {
            return Ok(());
        }
        match self.status {
            TripStatus::Cancelled | TripStatus::Completed => {
                return Err(ReserveRejection::NotBookable(self.status));
            }
            TripStatus::Available | TripStatus::Full => {}
        }
        if seats == 0 || seats > self.available_seats {
            return Err(ReserveRejection::InsufficientSeats {
                requested: seats,
                available: self.available_seats,
            });
        }
        self.available_seats -= seats;
        self.reservations.insert(reference.as_str().to_string(), seats);
        if self.available_seats == 0 {
            self.status = TripStatus::Full;
        }
        Ok(())
    }

    /// Releases the seats held under `reference`, returning how many
    /// were released (0 when no reservation existed, so releasing
    /// twice is a no-op, never a double-credit).
    ///
    /// Availability is capped at `total_seats`.
    pub fn release(&mut self, reference: &BookingReference) -> u32 {
        let Some(seats) = self.reservations.remove(reference.as_str()) else {
            return 0;
        };
        self.available_seats = (self.available_seats + seats).min(self.total_seats);
        if self.status == TripStatus::Full && self.available_seats > 0 {
            self.status = TripStatus::Available;
        }
        seats
    }
}

/// Why a reservation attempt was rejected by the record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReserveRejection {
    /// Not enough seats left
    InsufficientSeats {
        /// Seats requested
        requested: u32,
        /// Seats actually available
        available: u32,
    },
    /// The trip is not open for booking
    NotBookable(TripStatus),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(total: u32) -> TripRecord {
        TripRecord::new(
            TripId::new(),
            "Moscow - Kazan",
            Money::from_major(500),
            Currency::RUB,
            total,
        )
    }

    fn reference() -> BookingReference {
        BookingReference::generate(Utc::now())
    }

    #[test]
    fn reserve_decrements_and_flips_to_full_at_zero() {
        let mut trip = record(3);
        let first = reference();
        let second = reference();

        assert!(trip.reserve(&first, 2).is_ok());
        assert_eq!(trip.available_seats(), 1);
        assert_eq!(trip.status(), TripStatus::Available);

        assert!(trip.reserve(&second, 1).is_ok());
        assert_eq!(trip.available_seats(), 0);
        assert_eq!(trip.status(), TripStatus::Full);
    }

    #[test]
    fn release_flips_back_to_available() {
        let mut trip = record(2);
        let r = reference();
        trip.reserve(&r, 2).ok();
        assert_eq!(trip.status(), TripStatus::Full);

        assert_eq!(trip.release(&r), 2);
        assert_eq!(trip.available_seats(), 2);
        assert_eq!(trip.status(), TripStatus::Available);
    }

    #[test]
    fn reserve_rejects_when_insufficient_without_mutating() {
        let mut trip = record(3);
        let r = reference();
        let err = trip.reserve(&r, 5).unwrap_err();
        assert_eq!(
            err,
            ReserveRejection::InsufficientSeats {
                requested: 5,
                available: 3
            }
        );
        assert_eq!(trip.available_seats(), 3);
        assert_eq!(trip.reservation(&r), None);
    }

    #[test]
    fn reserve_is_idempotent_per_reference() {
        let mut trip = record(5);
        let r = reference();
        trip.reserve(&r, 2).ok();
        trip.reserve(&r, 2).ok();
        assert_eq!(trip.available_seats(), 3);
        assert_eq!(trip.reservation(&r), Some(2));
    }

    #[test]
    fn release_is_idempotent_and_never_exceeds_total() {
        let mut trip = record(4);
        let r = reference();
        trip.reserve(&r, 3).ok();
        assert_eq!(trip.release(&r), 3);
        assert_eq!(trip.release(&r), 0);
        assert_eq!(trip.available_seats(), 4);
    }

    #[test]
    fn cancelled_trip_rejects_reservations() {
        let mut trip = record(4);
        trip.mark_cancelled();
        let err = trip.reserve(&reference(), 1).unwrap_err();
        assert_eq!(err, ReserveRejection::NotBookable(TripStatus::Cancelled));
    }

    #[test]
    fn zero_seat_reserve_is_rejected() {
        let mut trip = record(4);
        assert!(trip.reserve(&reference(), 0).is_err());
    }
}
