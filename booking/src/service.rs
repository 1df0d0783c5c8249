//! Booking lifecycle operations.
//!
//! The service is the public entry point: it validates requests,
//! persists the aggregate, and drives the sagas. Payment processing is
//! a synchronous call into the [`PaymentProcessor`]; the saga log only
//! records the coordination outcome around it.

use crate::repository::BookingRepository;
use crate::saga::orchestrator::BookingSagaOrchestrator;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use travelmaster_core::{
    Booking, BookingError, BookingEvent, BookingId, BookingReference, Clock, EventPublisher,
    LifecycleEvent, Passenger, UserId, is_transition_valid,
};
use travelmaster_payment::{GatewayError, PaymentProcessor, ProcessorError};
use travelmaster_trip::{TripInventory, TripStatus};

/// Attempts at generating a unique booking reference before giving up.
const REFERENCE_ATTEMPTS: u32 = 3;

/// An inbound create-booking request.
#[derive(Clone, Debug)]
pub struct CreateBookingRequest {
    /// User making the booking
    pub user_id: UserId,
    /// Trip to book
    pub trip_id: travelmaster_core::TripId,
    /// Passengers travelling; one seat is reserved per passenger
    pub passengers: Vec<Passenger>,
    /// Free-form special requests, stored verbatim
    pub special_requests: Option<String>,
}

/// Drives the booking lifecycle end to end.
pub struct BookingService {
    repository: Arc<dyn BookingRepository>,
    inventory: Arc<dyn TripInventory>,
    processor: Arc<PaymentProcessor>,
    publisher: Arc<dyn EventPublisher>,
    orchestrator: Arc<BookingSagaOrchestrator>,
    clock: Arc<dyn Clock>,
}

impl BookingService {
    /// Wires the service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn BookingRepository>,
        inventory: Arc<dyn TripInventory>,
        processor: Arc<PaymentProcessor>,
        publisher: Arc<dyn EventPublisher>,
        orchestrator: Arc<BookingSagaOrchestrator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            inventory,
            processor,
            publisher,
            orchestrator,
            clock,
        }
    }

    /// Creates a booking and runs the creation saga.
    ///
    /// The booking is persisted as `PENDING` before the saga runs; a
    /// saga failure leaves it `PENDING` on record (retryable via
    /// [`Self::confirm_booking`]) or `CANCELLED` when compensation
    /// ran. On success the returned booking is `CONFIRMED`.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::BusinessRule`] for an empty passenger
    /// list, a trip that is not bookable, or insufficient seats;
    /// [`BookingError::NotFound`] for an unknown trip; transient
    /// errors propagate from collaborators.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, trip_id = %request.trip_id))]
    pub async fn create_booking(
        &self,
        request: CreateBookingRequest,
    ) -> Result<Booking, BookingError> {
        if request.passengers.is_empty() {
            return Err(BookingError::business(
                "booking must have at least one passenger",
            ));
        }
        let seats = u32::try_from(request.passengers.len())
            .map_err(|_| BookingError::business("too many passengers"))?;

        let trip = self.inventory.trip(request.trip_id).await.map_err(|err| {
            if matches!(err, travelmaster_trip::InventoryError::TripNotFound(_)) {
                BookingError::not_found("trip", request.trip_id)
            } else {
                BookingError::transient("look up trip", err.to_string())
            }
        })?;
        if matches!(trip.status, TripStatus::Cancelled | TripStatus::Completed) {
            return Err(BookingError::business(format!(
                "trip {} is {}, not bookable",
                trip.id, trip.status
            )));
        }

        let total_amount = trip
            .price
            .checked_multiply(seats)
            .ok_or_else(|| BookingError::business("total amount overflows"))?;

        let booking = self.persist_new(&request, total_amount, trip.currency).await?;
        info!(
            booking_id = %booking.id(),
            reference = %booking.reference(),
            total_amount = %total_amount,
            "booking created"
        );

        self.publish(LifecycleEvent::Created {
            booking_id: booking.id(),
            reference: booking.reference().clone(),
            user_id: booking.user_id(),
            trip_id: booking.trip_id(),
            passengers: seats,
            total_amount,
            currency: booking.currency(),
            created_at: booking.created_at(),
        })
        .await;

        self.orchestrator.run_creation_saga(booking.id()).await
    }

    /// Re-runs the creation saga for a booking left `PENDING` by an
    /// earlier failure.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::BusinessRule`] when the booking is past
    /// `PENDING` and not `CONFIRMED`; saga step errors propagate.
    pub async fn confirm_booking(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.orchestrator.run_creation_saga(booking_id).await
    }

    /// Charges the booking total and moves the booking to `PAID`.
    ///
    /// The booking reference is the payment idempotency key: a retried
    /// call after a timeout resolves to the original charge instead of
    /// billing twice. A payment failure leaves the booking `CONFIRMED`
    /// for retry.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::BusinessRule`] when the booking is not
    /// in a payable status or the charge is declined;
    /// [`BookingError::Transient`] for gateway faults worth retrying.
    #[instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn pay_booking(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        let mut booking = self.load(booking_id).await?;
        if !is_transition_valid(booking.status(), BookingEvent::Pay) {
            return Err(BookingError::business(format!(
                "cannot pay booking in status {}",
                booking.status()
            )));
        }

        self.orchestrator.record_payment_initiated(booking_id);
        let charge = self
            .processor
            .create_payment(
                booking_id,
                booking.user_id(),
                booking.reference().as_str(),
                booking.total_amount(),
                booking.currency(),
            )
            .await;

        let payment = match charge {
            Ok(payment) => payment,
            Err(err) => {
                let err = map_processor_error(&err);
                self.orchestrator.record_payment_failed(booking_id, &err);
                warn!(booking_id = %booking_id, error = %err, "payment failed");
                return Err(err);
            }
        };

        booking.mark_as_paid(payment.id(), payment.amount(), self.clock.now())?;
        let paid = self.repository.update(booking).await?;
        self.orchestrator.record_payment_completed(booking_id);
        info!(
            booking_id = %booking_id,
            payment_id = %payment.id(),
            amount = %payment.amount(),
            "booking paid"
        );

        self.publish(LifecycleEvent::Paid {
            booking_id,
            reference: paid.reference().clone(),
            user_id: paid.user_id(),
            payment_id: payment.id(),
            paid_amount: payment.amount(),
            currency: paid.currency(),
            paid_at: self.clock.now(),
        })
        .await;
        Ok(paid)
    }

    /// Cancels a booking, releasing seats and refunding any payment.
    ///
    /// The gateway refund runs before the cancellation saga, while the
    /// payment is still refundable; a refund failure is recorded for
    /// operator follow-up but never blocks the cancellation itself.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::BusinessRule`] when the booking is in a
    /// terminal status.
    #[instrument(skip(self, reason), fields(booking_id = %booking_id))]
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        reason: &str,
    ) -> Result<Booking, BookingError> {
        let booking = self.load(booking_id).await?;
        if !booking.can_be_cancelled() {
            return Err(BookingError::business(format!(
                "cannot cancel booking in status {}",
                booking.status()
            )));
        }

        if booking.is_paid() {
            if let (Some(payment_id), Some(paid_amount)) =
                (booking.payment_id(), booking.paid_amount())
            {
                if let Err(err) = self.processor.refund_payment(payment_id, paid_amount).await {
                    error!(
                        booking_id = %booking_id,
                        payment_id = %payment_id,
                        error = %err,
                        "refund failed during cancellation, needs reconciliation"
                    );
                }
            }
        }

        self.orchestrator
            .run_cancellation_saga(booking_id, reason)
            .await
    }

    /// Marks a `PAID` booking `COMPLETED` once the trip took place.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::BusinessRule`] unless the booking is
    /// `PAID`.
    pub async fn complete_booking(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        let mut booking = self.load(booking_id).await?;
        booking.apply(BookingEvent::Complete, self.clock.now())?;
        let completed = self.repository.update(booking).await?;
        info!(booking_id = %booking_id, "booking completed");

        self.publish(LifecycleEvent::Completed {
            booking_id,
            reference: completed.reference().clone(),
            user_id: completed.user_id(),
            trip_id: completed.trip_id(),
            completed_at: self.clock.now(),
        })
        .await;
        Ok(completed)
    }

    /// Looks up a booking by id.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::NotFound`] for an unknown id.
    pub async fn booking(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.load(booking_id).await
    }

    /// Looks up a booking by its human-readable reference.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::NotFound`] for an unknown reference.
    pub async fn booking_by_reference(
        &self,
        reference: &BookingReference,
    ) -> Result<Booking, BookingError> {
        self.repository
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", reference))
    }

    /// All bookings owned by a user, newest first.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, BookingError> {
        self.repository.find_by_user(user_id).await
    }

    /// Inserts the new booking, regenerating the reference on the
    /// (negligible-probability) unique-constraint collision.
    async fn persist_new(
        &self,
        request: &CreateBookingRequest,
        total_amount: travelmaster_core::Money,
        currency: travelmaster_core::Currency,
    ) -> Result<Booking, BookingError> {
        let mut last_err = None;
        for _ in 0..REFERENCE_ATTEMPTS {
            let now = self.clock.now();
            let mut booking = Booking::new(
                BookingReference::generate(now),
                request.user_id,
                request.trip_id,
                request.passengers.clone(),
                total_amount,
                currency,
                now,
            );
            if let Some(requests) = &request.special_requests {
                booking = booking.with_special_requests(requests.clone());
            }
            match self.repository.insert(booking).await {
                Ok(stored) => return Ok(stored),
                Err(err @ BookingError::Transient { .. }) => {
                    warn!(error = %err, "booking insert conflicted, regenerating reference");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err
            .unwrap_or_else(|| BookingError::transient("insert booking", "no attempt made")))
    }

    async fn load(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.repository
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))
    }

    async fn publish(&self, event: LifecycleEvent) {
        if let Err(err) = self.publisher.publish(event.clone()).await {
            warn!(
                booking_id = %event.booking_id(),
                event_type = event.event_type(),
                error = %err,
                "event publish failed"
            );
        }
    }
}

fn map_processor_error(err: &ProcessorError) -> BookingError {
    match err {
        ProcessorError::Gateway(GatewayError::Declined(reason)) => {
            BookingError::business(format!("payment declined: {reason}"))
        }
        ProcessorError::Gateway(GatewayError::InsufficientFunds) => {
            BookingError::business("payment declined: insufficient funds")
        }
        ProcessorError::NotRetryable(payment_id, status, attempts) => {
            BookingError::business(format!(
                "payment {payment_id} exhausted its attempts ({attempts}, status {status})"
            ))
        }
        other => BookingError::transient("process payment", other.to_string()),
    }
}
