//! Seat inventory contract and its in-memory implementation.

use crate::record::{ReserveRejection, TripRecord, TripStatus, TripSummary};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use travelmaster_core::{BookingReference, TripId};

/// Errors surfaced by the inventory boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    /// No trip with the given identifier
    #[error("trip {0} not found")]
    TripNotFound(TripId),
    /// Not enough seats to satisfy the request
    #[error("requested {requested} seats, only {available} available")]
    InsufficientSeats {
        /// Seats requested
        requested: u32,
        /// Seats actually available
        available: u32,
    },
    /// The trip is not open for booking
    #[error("trip {trip_id} is {status}, not bookable")]
    NotBookable {
        /// Trip identifier
        trip_id: TripId,
        /// Its current status
        status: TripStatus,
    },
    /// The inventory service could not be reached
    #[error("inventory unavailable: {0}")]
    Unavailable(String),
    /// The call did not complete in time; the outcome is unknown and
    /// must be resolved with [`TripInventory::reservation`]
    #[error("inventory call timed out after {0:?}")]
    Timeout(Duration),
}

impl InventoryError {
    /// Whether the failure may clear on its own; a timed-out call has
    /// an unknown outcome and must be resolved by lookup, not retried
    /// blindly.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Seat accounting owned by the trip service.
///
/// `reserve_seats` is idempotent per booking reference: callers that
/// time out repeat the call or consult [`Self::reservation`] without
/// risking double-reservation.
#[async_trait]
pub trait TripInventory: Send + Sync {
    /// Looks up the trip snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TripNotFound`] for an unknown trip.
    async fn trip(&self, trip_id: TripId) -> Result<TripSummary, InventoryError>;

    /// Atomically checks and decrements availability, recording the
    /// reservation under `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::InsufficientSeats`] when the trip
    /// cannot seat the request, [`InventoryError::NotBookable`] when
    /// the trip is cancelled or completed.
    async fn reserve_seats(
        &self,
        trip_id: TripId,
        reference: &BookingReference,
        seats: u32,
    ) -> Result<(), InventoryError>;

    /// Releases the seats held under `reference`, returning how many
    /// were released. Releasing an unknown reference returns 0.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TripNotFound`] for an unknown trip.
    async fn release_seats(
        &self,
        trip_id: TripId,
        reference: &BookingReference,
    ) -> Result<u32, InventoryError>;

    /// Returns the seats held under `reference`, if any; the source of
    /// truth after a timed-out `reserve_seats`.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TripNotFound`] for an unknown trip.
    async fn reservation(
        &self,
        trip_id: TripId,
        reference: &BookingReference,
    ) -> Result<Option<u32>, InventoryError>;
}

/// In-memory inventory; the write lock is the critical section for
/// check-and-decrement.
#[derive(Debug, Default)]
pub struct InMemoryTripInventory {
    trips: RwLock<HashMap<TripId, TripRecord>>,
}

impl InMemoryTripInventory {
    /// Creates an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a trip record.
    pub async fn add_trip(&self, record: TripRecord) {
        self.trips.write().await.insert(record.id(), record);
    }

    /// Marks a trip as provider-cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::TripNotFound`] for an unknown trip.
    pub async fn cancel_trip(&self, trip_id: TripId) -> Result<(), InventoryError> {
        let mut trips = self.trips.write().await;
        let record = trips
            .get_mut(&trip_id)
            .ok_or(InventoryError::TripNotFound(trip_id))?;
        record.mark_cancelled();
        Ok(())
    }
}

#[async_trait]
impl TripInventory for InMemoryTripInventory {
    async fn trip(&self, trip_id: TripId) -> Result<TripSummary, InventoryError> {
        let trips = self.trips.read().await;
        trips
            .get(&trip_id)
            .map(TripRecord::summary)
            .ok_or(InventoryError::TripNotFound(trip_id))
    }

    async fn reserve_seats(
        &self,
        trip_id: TripId,
        reference: &BookingReference,
        seats: u32,
    ) -> Result<(), InventoryError> {
        let mut trips = self.trips.write().await;
        let record = trips
            .get_mut(&trip_id)
            .ok_or(InventoryError::TripNotFound(trip_id))?;
        record
            .reserve(reference, seats)
            .map_err(|rejection| match rejection {
                ReserveRejection::InsufficientSeats {
                    requested,
                    available,
                } => InventoryError::InsufficientSeats {
                    requested,
                    available,
                },
                ReserveRejection::NotBookable(status) => {
                    InventoryError::NotBookable { trip_id, status }
                }
            })?;
        debug!(
            trip_id = %trip_id,
            reference = reference.as_str(),
            seats,
            remaining = record.available_seats(),
            "seats reserved"
        );
        Ok(())
    }

    async fn release_seats(
        &self,
        trip_id: TripId,
        reference: &BookingReference,
    ) -> Result<u32, InventoryError> {
        let mut trips = self.trips.write().await;
        let record = trips
            .get_mut(&trip_id)
            .ok_or(InventoryError::TripNotFound(trip_id))?;
        let released = record.release(reference);
        debug!(
            trip_id = %trip_id,
            reference = reference.as_str(),
            released,
            available = record.available_seats(),
            "seats released"
        );
        Ok(released)
    }

    async fn reservation(
        &self,
        trip_id: TripId,
        reference: &BookingReference,
    ) -> Result<Option<u32>, InventoryError> {
        let trips = self.trips.read().await;
        trips
            .get(&trip_id)
            .map(|record| record.reservation(reference))
            .ok_or(InventoryError::TripNotFound(trip_id))
    }
}
