//! The `Booking` aggregate and its owned `Passenger` entities.
//!
//! The aggregate is the enforcement point for booking-level invariants:
//! which states allow cancellation, when a booking counts as paid, and
//! that a payment must cover the total amount. Status only ever changes
//! through [`Booking::apply`], which consults the state machine; the
//! version counter is bumped by the repository on every successful
//! persist and is the authoritative guard against lost updates.

use crate::error::BookingError;
use crate::status::{BookingEvent, BookingStatus, next_status};
use crate::types::{BookingId, BookingReference, Currency, Money, PaymentId, TripId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Passenger gender as captured on travel documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    /// Male
    Male,
    /// Female
    Female,
    /// Unspecified / other
    Other,
}

/// A passenger on a booking. Owned by exactly one [`Booking`]; removed
/// together with it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passenger {
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Date of birth; age is always derived, never stored
    pub date_of_birth: NaiveDate,
    /// Passport number, when required by the trip
    pub passport_number: Option<String>,
    /// Gender
    pub gender: Gender,
    /// Contact email
    pub email: Option<String>,
    /// Contact phone
    pub phone: Option<String>,
}

impl Passenger {
    /// Age in whole years on the given date
    #[must_use]
    pub fn age_at(&self, on: NaiveDate) -> Option<u32> {
        on.years_since(self.date_of_birth)
    }
}

/// The booking aggregate root.
///
/// Created `PENDING` when a booking request is accepted, mutated
/// exclusively via saga-mediated transitions, never physically deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    id: BookingId,
    reference: BookingReference,
    user_id: UserId,
    trip_id: TripId,
    status: BookingStatus,
    total_amount: Money,
    currency: Currency,
    passengers: Vec<Passenger>,
    special_requests: Option<String>,
    payment_id: Option<PaymentId>,
    paid_amount: Option<Money>,
    paid_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    refund_amount: Option<Money>,
    refunded_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl Booking {
    /// Creates a new booking in `PENDING` status.
    #[must_use]
    pub fn new(
        reference: BookingReference,
        user_id: UserId,
        trip_id: TripId,
        passengers: Vec<Passenger>,
        total_amount: Money,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BookingId::new(),
            reference,
            user_id,
            trip_id,
            status: BookingStatus::Pending,
            total_amount,
            currency,
            passengers,
            special_requests: None,
            payment_id: None,
            paid_amount: None,
            paid_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            refund_amount: None,
            refunded_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Attaches free-form special requests
    #[must_use]
    pub fn with_special_requests(mut self, requests: impl Into<String>) -> Self {
        self.special_requests = Some(requests.into());
        self
    }

    /// Booking identifier
    #[must_use]
    pub const fn id(&self) -> BookingId {
        self.id
    }

    /// Human-readable booking reference
    #[must_use]
    pub const fn reference(&self) -> &BookingReference {
        &self.reference
    }

    /// Owning user
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Booked trip
    #[must_use]
    pub const fn trip_id(&self) -> TripId {
        self.trip_id
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> BookingStatus {
        self.status
    }

    /// Total amount due for the booking
    #[must_use]
    pub const fn total_amount(&self) -> Money {
        self.total_amount
    }

    /// Currency of all amounts on this booking
    #[must_use]
    pub const fn currency(&self) -> Currency {
        self.currency
    }

    /// The passengers travelling on this booking
    #[must_use]
    pub fn passengers(&self) -> &[Passenger] {
        &self.passengers
    }

    /// Passenger count; always equals `passengers().len()`
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn number_of_passengers(&self) -> u32 {
        self.passengers.len() as u32
    }

    /// Free-form special requests, if any
    #[must_use]
    pub fn special_requests(&self) -> Option<&str> {
        self.special_requests.as_deref()
    }

    /// Payment record reference, set when the booking was paid
    #[must_use]
    pub const fn payment_id(&self) -> Option<PaymentId> {
        self.payment_id
    }

    /// Amount actually paid, set iff the booking was paid
    #[must_use]
    pub const fn paid_amount(&self) -> Option<Money> {
        self.paid_amount
    }

    /// When the booking was paid
    #[must_use]
    pub const fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    /// When the booking was cancelled
    #[must_use]
    pub const fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    /// Reason given for cancellation
    #[must_use]
    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    /// Refund owed after cancelling a paid booking
    #[must_use]
    pub const fn refund_amount(&self) -> Option<Money> {
        self.refund_amount
    }

    /// When the refund was recorded
    #[must_use]
    pub const fn refunded_at(&self) -> Option<DateTime<Utc>> {
        self.refunded_at
    }

    /// Creation timestamp
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last update timestamp
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Optimistic-concurrency version counter
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Sets the version after a successful conditioned persist.
    ///
    /// Only repositories should call this.
    pub const fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// True iff the booking may still be cancelled
    #[must_use]
    pub const fn can_be_cancelled(&self) -> bool {
        matches!(
            self.status,
            BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::Paid
        )
    }

    /// True iff a payment has been applied (status `PAID` or `COMPLETED`)
    #[must_use]
    pub const fn is_paid(&self) -> bool {
        matches!(self.status, BookingStatus::Paid | BookingStatus::Completed)
    }

    /// Applies a state-machine event, moving the status forward.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::BusinessRule`] when the transition table
    /// defines no transition for the current status and `event`.
    pub fn apply(
        &mut self,
        event: BookingEvent,
        now: DateTime<Utc>,
    ) -> Result<BookingStatus, BookingError> {
        let Some(next) = next_status(self.status, event) else {
            return Err(BookingError::business(format!(
                "no transition from {} on {event}",
                self.status
            )));
        };
        self.status = next;
        self.updated_at = now;
        Ok(next)
    }

    /// Records a successful payment and moves the booking to `PAID`.
    ///
    /// The caller must have validated the `PAY` transition already; this
    /// method re-checks it so the aggregate can never be marked paid
    /// from an illegal state.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::BusinessRule`] when `amount` is below the
    /// total due or the booking is not in a payable status.
    pub fn mark_as_paid(
        &mut self,
        payment_id: PaymentId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        if amount < self.total_amount {
            return Err(BookingError::business(format!(
                "insufficient payment amount: required {}, received {amount}",
                self.total_amount
            )));
        }
        self.apply(BookingEvent::Pay, now)?;
        self.payment_id = Some(payment_id);
        self.paid_amount = Some(amount);
        self.paid_at = Some(now);
        Ok(())
    }

    /// Cancels the booking, storing the reason verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::BusinessRule`] when the booking is in a
    /// terminal status. Callers checking [`Self::can_be_cancelled`]
    /// first never hit this.
    pub fn cancel(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        if !self.can_be_cancelled() {
            return Err(BookingError::business(format!(
                "cannot cancel booking in status {}",
                self.status
            )));
        }
        self.apply(BookingEvent::Cancel, now)?;
        self.cancelled_at = Some(now);
        self.cancellation_reason = Some(reason.into());
        Ok(())
    }

    /// Records the refund owed after cancelling a paid booking.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::BusinessRule`] when no prior payment
    /// exists to refund.
    pub fn record_refund(&mut self, amount: Money, now: DateTime<Utc>) -> Result<(), BookingError> {
        if self.paid_amount.is_none() {
            return Err(BookingError::business(
                "no payment exists to refund".to_string(),
            ));
        }
        self.refund_amount = Some(amount);
        self.refunded_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn passenger(first: &str) -> Passenger {
        Passenger {
            first_name: first.to_string(),
            last_name: "Ivanova".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 6, 15).unwrap(),
            passport_number: Some("4509 123456".to_string()),
            gender: Gender::Female,
            email: Some("anna@example.com".to_string()),
            phone: None,
        }
    }

    fn test_booking(passenger_count: usize) -> Booking {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        let passengers = (0..passenger_count)
            .map(|i| passenger(&format!("P{i}")))
            .collect::<Vec<_>>();
        let total = Money::from_major(500).multiply(
            u32::try_from(passenger_count).unwrap(),
        );
        Booking::new(
            BookingReference::generate(now),
            UserId::new(),
            TripId::new(),
            passengers,
            total,
            Currency::RUB,
            now,
        )
    }

    #[test]
    fn new_booking_is_pending_with_derived_passenger_count() {
        let booking = test_booking(2);
        assert_eq!(booking.status(), BookingStatus::Pending);
        assert_eq!(booking.number_of_passengers(), 2);
        assert_eq!(booking.version(), 0);
        assert_eq!(booking.total_amount(), Money::from_major(1000));
    }

    #[test]
    fn mark_as_paid_rejects_insufficient_amount() {
        let mut booking = test_booking(2);
        let now = booking.created_at();
        booking.apply(BookingEvent::Confirm, now).unwrap();

        let err = booking
            .mark_as_paid(PaymentId::new(), Money::from_major(999), now)
            .unwrap_err();
        assert!(matches!(err, BookingError::BusinessRule(_)));
        assert_eq!(booking.status(), BookingStatus::Confirmed);
        assert_eq!(booking.paid_amount(), None);
    }

    #[test]
    fn mark_as_paid_accepts_exact_and_overpayment() {
        for amount in [Money::from_major(1000), Money::from_major(1500)] {
            let mut booking = test_booking(2);
            let now = booking.created_at();
            booking.apply(BookingEvent::Confirm, now).unwrap();
            booking.mark_as_paid(PaymentId::new(), amount, now).unwrap();

            assert_eq!(booking.status(), BookingStatus::Paid);
            assert_eq!(booking.paid_amount(), Some(amount));
            assert!(booking.is_paid());
        }
    }

    #[test]
    fn mark_as_paid_rejects_pending_booking() {
        let mut booking = test_booking(1);
        let now = booking.created_at();
        let err = booking
            .mark_as_paid(PaymentId::new(), Money::from_major(500), now)
            .unwrap_err();
        assert!(matches!(err, BookingError::BusinessRule(_)));
    }

    #[test]
    fn cancellable_statuses_match_the_contract() {
        let mut booking = test_booking(1);
        let now = booking.created_at();
        assert!(booking.can_be_cancelled()); // PENDING

        booking.apply(BookingEvent::Confirm, now).unwrap();
        assert!(booking.can_be_cancelled()); // CONFIRMED

        booking
            .mark_as_paid(PaymentId::new(), Money::from_major(500), now)
            .unwrap();
        assert!(booking.can_be_cancelled()); // PAID

        booking.apply(BookingEvent::Complete, now).unwrap();
        assert!(!booking.can_be_cancelled()); // COMPLETED
    }

    #[test]
    fn cancel_stores_reason_verbatim_and_rejects_terminal_states() {
        let mut booking = test_booking(1);
        let now = booking.created_at();
        booking.cancel("changed my plans", now).unwrap();

        assert_eq!(booking.status(), BookingStatus::Cancelled);
        assert_eq!(booking.cancellation_reason(), Some("changed my plans"));
        assert!(booking.cancelled_at().is_some());

        let err = booking.cancel("again", now).unwrap_err();
        assert!(matches!(err, BookingError::BusinessRule(_)));
    }

    #[test]
    fn record_refund_requires_prior_payment() {
        let mut booking = test_booking(1);
        let now = booking.created_at();
        let err = booking
            .record_refund(Money::from_major(500), now)
            .unwrap_err();
        assert!(matches!(err, BookingError::BusinessRule(_)));
    }

    #[test]
    fn passenger_age_is_derived() {
        let p = passenger("Anna");
        let on = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
        assert_eq!(p.age_at(on), Some(34));
        let after_birthday = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert_eq!(p.age_at(after_birthday), Some(35));
    }
}
