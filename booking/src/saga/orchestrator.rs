//! Sequencing and compensation for booking lifecycle sagas.

use crate::repository::BookingRepository;
use crate::saga::log::{SagaLog, SagaLogEntry, SagaState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use travelmaster_core::{
    Booking, BookingError, BookingEvent, BookingId, BookingStatus, Clock, EventPublisher,
    LifecycleEvent,
};
use travelmaster_trip::{InventoryError, TripInventory};

/// Reason written on a booking force-cancelled by compensation.
pub const COMPENSATION_REASON: &str = "automatic cancellation due to booking process error";

const DEFAULT_INVENTORY_TIMEOUT: Duration = Duration::from_secs(5);

/// Sequences the multi-service effects of booking lifecycle events so
/// that trip inventory and booking state never diverge for longer than
/// one saga step.
///
/// The orchestrator does not retry; retry policy belongs to the caller,
/// using the saga log to decide whether a step already completed.
pub struct BookingSagaOrchestrator {
    repository: Arc<dyn BookingRepository>,
    inventory: Arc<dyn TripInventory>,
    publisher: Arc<dyn EventPublisher>,
    saga_log: Arc<dyn SagaLog>,
    clock: Arc<dyn Clock>,
    inventory_timeout: Duration,
}

impl BookingSagaOrchestrator {
    /// Wires an orchestrator with the default seat-reservation timeout.
    #[must_use]
    pub fn new(
        repository: Arc<dyn BookingRepository>,
        inventory: Arc<dyn TripInventory>,
        publisher: Arc<dyn EventPublisher>,
        saga_log: Arc<dyn SagaLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            inventory,
            publisher,
            saga_log,
            clock,
            inventory_timeout: DEFAULT_INVENTORY_TIMEOUT,
        }
    }

    /// Overrides the bounded timeout applied to every inventory call.
    #[must_use]
    pub const fn with_inventory_timeout(mut self, timeout: Duration) -> Self {
        self.inventory_timeout = timeout;
        self
    }

    /// Runs the creation saga for a booking persisted as `PENDING`:
    /// reserve seats, transition to `CONFIRMED`, persist, publish.
    ///
    /// A failure before seats are reserved aborts without
    /// compensation and leaves the booking `PENDING` for a later
    /// retry. A failure after seats are reserved compensates: seats
    /// are released and the booking is force-cancelled.
    ///
    /// Re-running for an already-`CONFIRMED` booking is a no-op
    /// returning the booking as stored.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failed step; compensation
    /// failures are logged and recorded but never replace it.
    pub async fn run_creation_saga(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        let booking = self.load(booking_id).await?;
        match booking.status() {
            BookingStatus::Pending => {}
            // duplicate retry after the saga already finished
            BookingStatus::Confirmed => return Ok(booking),
            status => {
                return Err(BookingError::business(format!(
                    "cannot run creation saga for booking in status {status}"
                )));
            }
        }

        self.record(
            booking_id,
            SagaState::Started,
            "start",
            "creation saga started",
        );

        let seats = booking.number_of_passengers();
        if let Err(err) = self.reserve_seats(&booking, seats).await {
            self.record_failure(booking_id, "reserve_seats", &err);
            return Err(err);
        }
        self.record(
            booking_id,
            SagaState::SeatsReserved,
            "reserve_seats",
            format!("{seats} seats reserved"),
        );

        match self.confirm_and_persist(booking).await {
            Ok(confirmed) => {
                self.record(
                    booking_id,
                    SagaState::BookingConfirmed,
                    "confirm_booking",
                    "booking transitioned to CONFIRMED",
                );
                self.publish(LifecycleEvent::Confirmed {
                    booking_id,
                    reference: confirmed.reference().clone(),
                    user_id: confirmed.user_id(),
                    trip_id: confirmed.trip_id(),
                    confirmed_at: self.clock.now(),
                })
                .await;
                self.record(
                    booking_id,
                    SagaState::Completed,
                    "complete",
                    "creation saga completed",
                );
                info!(booking_id = %booking_id, "creation saga completed");
                Ok(confirmed)
            }
            Err(err) => {
                // seats are held but the booking could not move to
                // CONFIRMED; undo the reservation and fail the booking
                self.compensate_creation(booking_id).await;
                self.record_failure(booking_id, "confirm_booking", &err);
                Err(err)
            }
        }
    }

    /// Runs the cancellation saga: release seats when the booking had
    /// them, mark the refund owed when it was paid, transition to
    /// `CANCELLED`, persist, publish.
    ///
    /// A seat-release failure is logged and recorded but does not
    /// block the cancellation; refusing it would trap the user's
    /// money.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::BusinessRule`] when the booking is in a
    /// terminal status, and propagates persistence failures.
    pub async fn run_cancellation_saga(
        &self,
        booking_id: BookingId,
        reason: &str,
    ) -> Result<Booking, BookingError> {
        let mut booking = self.load(booking_id).await?;
        if !booking.can_be_cancelled() {
            return Err(BookingError::business(format!(
                "cannot cancel booking in status {}",
                booking.status()
            )));
        }

        // status before any mutation decides which compensations apply
        let entry_status = booking.status();
        self.record(
            booking_id,
            SagaState::Started,
            "start",
            format!("cancellation saga started from {entry_status}"),
        );

        if matches!(entry_status, BookingStatus::Confirmed | BookingStatus::Paid) {
            match self.release_seats(&booking).await {
                Ok(released) => self.record(
                    booking_id,
                    SagaState::Compensating,
                    "release_seats",
                    format!("{released} seats released"),
                ),
                Err(err) => {
                    error!(
                        booking_id = %booking_id,
                        trip_id = %booking.trip_id(),
                        error = %err,
                        "seat release failed during cancellation, needs reconciliation"
                    );
                    self.saga_log.append(SagaLogEntry::failure(
                        booking_id,
                        SagaState::Compensating,
                        "release_seats",
                        err.to_string(),
                        self.clock.now(),
                    ));
                }
            }
        }

        let now = self.clock.now();
        let refund_amount = if booking.is_paid() {
            booking.paid_amount()
        } else {
            None
        };
        if let Some(amount) = refund_amount {
            booking.record_refund(amount, now)?;
        }
        booking.cancel(reason, now)?;
        let cancelled = self.repository.update(booking).await?;

        self.publish(LifecycleEvent::Cancelled {
            booking_id,
            reference: cancelled.reference().clone(),
            user_id: cancelled.user_id(),
            trip_id: cancelled.trip_id(),
            reason: reason.to_string(),
            refund_amount,
            cancelled_at: now,
        })
        .await;
        self.record(
            booking_id,
            SagaState::Completed,
            "complete",
            "cancellation saga completed",
        );
        info!(booking_id = %booking_id, reason, "cancellation saga completed");
        Ok(cancelled)
    }

    /// Records the hand-off of a booking to the payment processor.
    pub fn record_payment_initiated(&self, booking_id: BookingId) {
        self.record(
            booking_id,
            SagaState::PaymentInitiated,
            "initiate_payment",
            "payment handed to processor",
        );
    }

    /// Records a confirmed payment applied to the booking.
    pub fn record_payment_completed(&self, booking_id: BookingId) {
        self.record(
            booking_id,
            SagaState::PaymentCompleted,
            "complete_payment",
            "payment confirmed and applied",
        );
    }

    /// Records a failed payment attempt; the booking keeps its
    /// pre-payment status so the payment can be retried.
    pub fn record_payment_failed(&self, booking_id: BookingId, err: &BookingError) {
        self.record_failure(booking_id, "complete_payment", err);
    }

    async fn reserve_seats(&self, booking: &Booking, seats: u32) -> Result<(), BookingError> {
        let trip_id = booking.trip_id();
        let reference = booking.reference();
        let attempt = tokio::time::timeout(
            self.inventory_timeout,
            self.inventory.reserve_seats(trip_id, reference, seats),
        )
        .await;

        match attempt {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(map_inventory_error(err, "reserve seats")),
            Err(_elapsed) => {
                // unknown outcome; the reservation lookup is the
                // source of truth, never assume failure on timeout
                warn!(
                    booking_id = %booking.id(),
                    trip_id = %trip_id,
                    timeout = ?self.inventory_timeout,
                    "seat reservation timed out, resolving by lookup"
                );
                match self.inventory.reservation(trip_id, reference).await {
                    Ok(Some(held)) => {
                        info!(
                            booking_id = %booking.id(),
                            held,
                            "timed-out reservation had succeeded"
                        );
                        Ok(())
                    }
                    Ok(None) => Err(BookingError::transient(
                        "reserve seats",
                        "reservation call timed out and no reservation was recorded",
                    )),
                    Err(err) => Err(map_inventory_error(err, "reserve seats")),
                }
            }
        }
    }

    async fn release_seats(&self, booking: &Booking) -> Result<u32, BookingError> {
        let attempt = tokio::time::timeout(
            self.inventory_timeout,
            self.inventory
                .release_seats(booking.trip_id(), booking.reference()),
        )
        .await;
        match attempt {
            Ok(Ok(released)) => Ok(released),
            Ok(Err(err)) => Err(map_inventory_error(err, "release seats")),
            // release is idempotent per reference, so a timed-out call
            // can simply be reported as transient and re-driven later
            Err(_elapsed) => Err(BookingError::transient(
                "release seats",
                "seat release timed out before the inventory answered",
            )),
        }
    }

    async fn confirm_and_persist(&self, mut booking: Booking) -> Result<Booking, BookingError> {
        booking.apply(BookingEvent::Confirm, self.clock.now())?;
        self.repository.update(booking).await
    }

    /// Undoes a creation saga whose confirm step failed: seats go
    /// back, the booking is force-cancelled. Failures here are
    /// recorded for operator follow-up, never surfaced: the caller
    /// is already receiving the triggering failure.
    async fn compensate_creation(&self, booking_id: BookingId) {
        self.record(
            booking_id,
            SagaState::Compensating,
            "compensate",
            "confirm step failed after seats were reserved",
        );

        let booking = match self.repository.find_by_id(booking_id).await {
            Ok(Some(booking)) => booking,
            Ok(None) => {
                error!(booking_id = %booking_id, "booking vanished during compensation");
                return;
            }
            Err(err) => {
                error!(
                    booking_id = %booking_id,
                    error = %err,
                    "could not load booking for compensation"
                );
                self.saga_log.append(SagaLogEntry::failure(
                    booking_id,
                    SagaState::Compensating,
                    "compensate",
                    err.to_string(),
                    self.clock.now(),
                ));
                return;
            }
        };

        match self.release_seats(&booking).await {
            Ok(released) => self.record(
                booking_id,
                SagaState::Compensating,
                "release_seats",
                format!("{released} seats released"),
            ),
            Err(err) => {
                error!(
                    booking_id = %booking_id,
                    trip_id = %booking.trip_id(),
                    error = %err,
                    "compensation could not release seats, needs reconciliation"
                );
                self.saga_log.append(SagaLogEntry::failure(
                    booking_id,
                    SagaState::Compensating,
                    "release_seats",
                    err.to_string(),
                    self.clock.now(),
                ));
            }
        }

        if let Err(err) = self.force_cancel(booking).await {
            error!(
                booking_id = %booking_id,
                error = %err,
                "compensation could not cancel the booking"
            );
            self.saga_log.append(SagaLogEntry::failure(
                booking_id,
                SagaState::Compensating,
                "force_cancel",
                err.to_string(),
                self.clock.now(),
            ));
        }
    }

    async fn force_cancel(&self, mut booking: Booking) -> Result<(), BookingError> {
        if !booking.can_be_cancelled() {
            return Ok(());
        }
        booking.cancel(COMPENSATION_REASON, self.clock.now())?;
        self.repository.update(booking).await?;
        Ok(())
    }

    async fn load(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.repository
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))
    }

    async fn publish(&self, event: LifecycleEvent) {
        // fire-and-forget: delivery is at-least-once downstream, a
        // publish failure must not fail the lifecycle operation
        if let Err(err) = self.publisher.publish(event.clone()).await {
            warn!(
                booking_id = %event.booking_id(),
                event_type = event.event_type(),
                error = %err,
                "event publish failed"
            );
        }
    }

    fn record(
        &self,
        booking_id: BookingId,
        state: SagaState,
        step: &str,
        description: impl Into<String>,
    ) {
        self.saga_log.append(SagaLogEntry::step(
            booking_id,
            state,
            step,
            description,
            self.clock.now(),
        ));
    }

    fn record_failure(&self, booking_id: BookingId, step: &str, err: &BookingError) {
        self.saga_log.append(SagaLogEntry::failure(
            booking_id,
            SagaState::Failed,
            step,
            err.to_string(),
            self.clock.now(),
        ));
    }
}

fn map_inventory_error(err: InventoryError, operation: &'static str) -> BookingError {
    match err {
        InventoryError::TripNotFound(trip_id) => BookingError::not_found("trip", trip_id),
        InventoryError::InsufficientSeats {
            requested,
            available,
        } => BookingError::business(format!(
            "insufficient seats: requested {requested}, available {available}"
        )),
        InventoryError::NotBookable { trip_id, status } => {
            BookingError::business(format!("trip {trip_id} is {status}, not bookable"))
        }
        InventoryError::Unavailable(reason) => BookingError::transient(operation, reason),
        InventoryError::Timeout(after) => {
            BookingError::transient(operation, format!("timed out after {after:?}"))
        }
    }
}
