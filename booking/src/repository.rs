//! Booking persistence with optimistic concurrency.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use travelmaster_core::{Booking, BookingError, BookingId, BookingReference, UserId};

/// Storage for booking aggregates.
///
/// Every update is conditioned on the version read: the stored version
/// must equal the incoming booking's version, otherwise the write is
/// rejected with [`BookingError::ConcurrentModification`] and the
/// caller re-reads and retries. Bookings are never deleted; cancelled
/// bookings stay on record.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Inserts a new booking.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Transient`] when the reference is
    /// already taken; the caller regenerates and retries.
    async fn insert(&self, booking: Booking) -> Result<Booking, BookingError>;

    /// Persists a mutated booking, bumping its version.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::ConcurrentModification`] when the
    /// stored version differs from `booking.version()`, and
    /// [`BookingError::NotFound`] for an unknown id.
    async fn update(&self, booking: Booking) -> Result<Booking, BookingError>;

    /// Looks up a booking by id.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Transient`] when storage is unreachable.
    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, BookingError>;

    /// Looks up a booking by its human-readable reference.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Transient`] when storage is unreachable.
    async fn find_by_reference(
        &self,
        reference: &BookingReference,
    ) -> Result<Option<Booking>, BookingError>;

    /// All bookings owned by a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Transient`] when storage is unreachable.
    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Booking>, BookingError>;
}

/// In-memory repository; the write lock makes version checks atomic
/// with the write itself.
#[derive(Debug, Default)]
pub struct InMemoryBookingRepository {
    bookings: RwLock<HashMap<BookingId, Booking>>,
}

impl InMemoryBookingRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn insert(&self, mut booking: Booking) -> Result<Booking, BookingError> {
        let mut bookings = self.bookings.write().await;
        let reference_taken = bookings
            .values()
            .any(|existing| existing.reference() == booking.reference());
        if reference_taken {
            // unique constraint stands in for the generator; collision
            // is a retryable create conflict
            return Err(BookingError::transient(
                "insert booking",
                format!("reference {} already exists", booking.reference()),
            ));
        }
        booking.set_version(1);
        bookings.insert(booking.id(), booking.clone());
        Ok(booking)
    }

    async fn update(&self, mut booking: Booking) -> Result<Booking, BookingError> {
        let mut bookings = self.bookings.write().await;
        let stored = bookings
            .get(&booking.id())
            .ok_or_else(|| BookingError::not_found("booking", booking.id()))?;
        if stored.version() != booking.version() {
            return Err(BookingError::ConcurrentModification {
                id: booking.id().to_string(),
                expected: booking.version(),
                actual: stored.version(),
            });
        }
        booking.set_version(booking.version() + 1);
        bookings.insert(booking.id(), booking.clone());
        Ok(booking)
    }

    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, BookingError> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn find_by_reference(
        &self,
        reference: &BookingReference,
    ) -> Result<Option<Booking>, BookingError> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .find(|booking| booking.reference() == reference)
            .cloned())
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Booking>, BookingError> {
        let mut bookings: Vec<Booking> = self
            .bookings
            .read()
            .await
            .values()
            .filter(|booking| booking.user_id() == user_id)
            .cloned()
            .collect();
        bookings.sort_by_key(|booking| std::cmp::Reverse(booking.created_at()));
        Ok(bookings)
    }
}
