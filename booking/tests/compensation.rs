//! Creation-saga compensation: a failure between seat reservation and
//! the status-transition persist must release the seats and
//! force-cancel the booking.

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use travelmaster_booking::saga::orchestrator::COMPENSATION_REASON;
use travelmaster_booking::{
    BookingRepository, BookingSagaOrchestrator, BookingService, CreateBookingRequest,
    InMemoryBookingRepository, InMemorySagaLog, SagaLog, SagaState,
};
use travelmaster_core::{
    Booking, BookingError, BookingId, BookingReference, BookingStatus, Clock, Currency, Money,
    TripId, UserId,
};
use travelmaster_payment::{MockPaymentGateway, PaymentProcessor};
use travelmaster_testing::{RecordingPublisher, passenger, test_clock};
use travelmaster_trip::{InMemoryTripInventory, TripInventory, TripRecord};

/// Repository wrapper that fails a scripted number of updates with a
/// transient error, then delegates.
struct FailingRepository {
    inner: InMemoryBookingRepository,
    update_failures: AtomicU32,
}

impl FailingRepository {
    fn failing_updates(count: u32) -> Self {
        Self {
            inner: InMemoryBookingRepository::new(),
            update_failures: AtomicU32::new(count),
        }
    }
}

#[async_trait]
impl BookingRepository for FailingRepository {
    async fn insert(&self, booking: Booking) -> Result<Booking, BookingError> {
        self.inner.insert(booking).await
    }

    async fn update(&self, booking: Booking) -> Result<Booking, BookingError> {
        if self
            .update_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BookingError::transient(
                "update booking",
                "scripted storage outage",
            ));
        }
        self.inner.update(booking).await
    }

    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, BookingError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_reference(
        &self,
        reference: &BookingReference,
    ) -> Result<Option<Booking>, BookingError> {
        self.inner.find_by_reference(reference).await
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Booking>, BookingError> {
        self.inner.find_by_user(user_id).await
    }
}

struct Harness {
    service: BookingService,
    inventory: Arc<InMemoryTripInventory>,
    saga_log: Arc<InMemorySagaLog>,
    trip_id: TripId,
}

async fn harness(update_failures: u32) -> Harness {
    let inventory = Arc::new(InMemoryTripInventory::new());
    let trip = TripRecord::new(
        TripId::new(),
        "Moscow - Sochi",
        Money::from_major(500),
        Currency::RUB,
        10,
    );
    let trip_id = trip.id();
    inventory.add_trip(trip).await;

    let clock: Arc<dyn Clock> = Arc::new(test_clock());
    let repository = Arc::new(FailingRepository::failing_updates(update_failures));
    let gateway = Arc::new(MockPaymentGateway::new());
    let processor = Arc::new(PaymentProcessor::new(gateway, clock.clone()));
    let publisher = Arc::new(RecordingPublisher::new());
    let saga_log = Arc::new(InMemorySagaLog::new());
    let orchestrator = Arc::new(BookingSagaOrchestrator::new(
        repository.clone(),
        inventory.clone(),
        publisher.clone(),
        saga_log.clone(),
        clock.clone(),
    ));
    let service = BookingService::new(
        repository,
        inventory.clone(),
        processor,
        publisher,
        orchestrator,
        clock,
    );
    Harness {
        service,
        inventory,
        saga_log,
        trip_id,
    }
}

fn request(trip_id: TripId, user_id: UserId) -> CreateBookingRequest {
    CreateBookingRequest {
        user_id,
        trip_id,
        passengers: vec![passenger("Anna", "Petrova"), passenger("Ivan", "Petrov")],
        special_requests: None,
    }
}

#[tokio::test]
async fn failed_confirm_persist_releases_seats_and_cancels_the_booking() {
    let h = harness(1).await;
    let user_id = UserId::new();

    let err = h
        .service
        .create_booking(request(h.trip_id, user_id))
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let bookings = h.service.bookings_for_user(user_id).await.unwrap();
    assert_eq!(bookings.len(), 1);
    let booking = &bookings[0];
    assert_eq!(booking.status(), BookingStatus::Cancelled);
    assert_eq!(booking.cancellation_reason(), Some(COMPENSATION_REASON));

    // no seat leak
    assert_eq!(h.inventory.trip(h.trip_id).await.unwrap().available_seats, 10);
    assert_eq!(
        h.inventory
            .reservation(h.trip_id, booking.reference())
            .await
            .unwrap(),
        None
    );

    let states: Vec<SagaState> = h
        .saga_log
        .entries_for(booking.id())
        .into_iter()
        .map(|entry| entry.state)
        .collect();
    assert!(states.contains(&SagaState::SeatsReserved));
    assert!(states.contains(&SagaState::Compensating));
    assert_eq!(states.last().copied(), Some(SagaState::Failed));
}

#[tokio::test]
async fn compensation_survives_a_failing_force_cancel() {
    // both the confirm persist and the compensating cancel persist
    // fail; the caller still gets the original error and the seats
    // still come back
    let h = harness(2).await;
    let user_id = UserId::new();

    let err = h
        .service
        .create_booking(request(h.trip_id, user_id))
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    assert_eq!(h.inventory.trip(h.trip_id).await.unwrap().available_seats, 10);

    let bookings = h.service.bookings_for_user(user_id).await.unwrap();
    let booking = &bookings[0];
    // cancellation could not be persisted, the booking is stuck
    // PENDING and the log records the compensation failure
    assert_eq!(booking.status(), BookingStatus::Pending);
    let failures: Vec<String> = h
        .saga_log
        .entries_for(booking.id())
        .into_iter()
        .filter_map(|entry| entry.error)
        .collect();
    assert!(!failures.is_empty());
}
