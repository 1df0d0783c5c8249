//! The payment record tracked per booking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use travelmaster_core::{BookingId, Currency, Money, PaymentId, UserId};

/// Maximum processing attempts for a single payment.
pub const MAX_RETRY_COUNT: u32 = 3;

/// Lifecycle of a payment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Created, not yet sent to the gateway
    #[default]
    Pending,
    /// Sent to the gateway, awaiting outcome
    Processing,
    /// Charged successfully
    Success,
    /// The gateway declined or the attempt budget ran out
    Failed,
    /// Charged, then refunded in full or in part
    Refunded,
    /// Abandoned before any charge
    Cancelled,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{name}")
    }
}

/// One payment attempt chain for a booking.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    booking_id: BookingId,
    user_id: UserId,
    amount: Money,
    currency: Currency,
    status: PaymentStatus,
    /// Gateway-side transaction identifier, set on success
    transaction_id: Option<String>,
    /// Masked card details captured from the gateway receipt
    card_last_four: Option<String>,
    card_brand: Option<String>,
    failure_reason: Option<String>,
    retry_count: u32,
    refund_amount: Option<Money>,
    refunded_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Creates a pending payment for a booking.
    #[must_use]
    pub fn new(
        booking_id: BookingId,
        user_id: UserId,
        amount: Money,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            booking_id,
            user_id,
            amount,
            currency,
            status: PaymentStatus::Pending,
            transaction_id: None,
            card_last_four: None,
            card_brand: None,
            failure_reason: None,
            retry_count: 0,
            refund_amount: None,
            refunded_at: None,
            created_at: now,
            completed_at: None,
        }
    }

    /// Payment identifier
    #[must_use]
    pub const fn id(&self) -> PaymentId {
        self.id
    }

    /// Booking this payment belongs to
    #[must_use]
    pub const fn booking_id(&self) -> BookingId {
        self.booking_id
    }

    /// Paying user
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Amount to charge
    #[must_use]
    pub const fn amount(&self) -> Money {
        self.amount
    }

    /// Currency of the charge
    #[must_use]
    pub const fn currency(&self) -> Currency {
        self.currency
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> PaymentStatus {
        self.status
    }

    /// Gateway transaction identifier, if charged
    #[must_use]
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    /// Last four digits of the charged card, if known
    #[must_use]
    pub fn card_last_four(&self) -> Option<&str> {
        self.card_last_four.as_deref()
    }

    /// Why the last attempt failed, if it did
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Attempts made so far
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Refunded amount, if a refund was issued
    #[must_use]
    pub const fn refund_amount(&self) -> Option<Money> {
        self.refund_amount
    }

    /// A payment can be refunded exactly once, and only after a
    /// successful charge.
    #[must_use]
    pub const fn can_be_refunded(&self) -> bool {
        matches!(self.status, PaymentStatus::Success) && self.refund_amount.is_none()
    }

    /// Whether another processing attempt is allowed.
    #[must_use]
    pub const fn can_be_retried(&self) -> bool {
        matches!(self.status, PaymentStatus::Pending | PaymentStatus::Failed)
            && self.retry_count < MAX_RETRY_COUNT
    }

    /// Marks the payment as in flight at the gateway and burns one
    /// attempt from the budget.
    pub const fn begin_attempt(&mut self) {
        self.status = PaymentStatus::Processing;
        self.retry_count += 1;
    }

    /// Records a successful charge.
    pub fn complete(
        &mut self,
        transaction_id: String,
        card_last_four: Option<String>,
        card_brand: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.status = PaymentStatus::Success;
        self.transaction_id = Some(transaction_id);
        self.card_last_four = card_last_four;
        self.card_brand = card_brand;
        self.failure_reason = None;
        self.completed_at = Some(now);
    }

    /// Records a failed attempt.
    pub fn fail(&mut self, reason: String, now: DateTime<Utc>) {
        self.status = PaymentStatus::Failed;
        self.failure_reason = Some(reason);
        self.completed_at = Some(now);
    }

    /// Records an issued refund. Callers check [`Self::can_be_refunded`]
    /// first.
    pub const fn record_refund(&mut self, amount: Money, now: DateTime<Utc>) {
        self.status = PaymentStatus::Refunded;
        self.refund_amount = Some(amount);
        self.refunded_at = Some(now);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn payment() -> Payment {
        Payment::new(
            BookingId::new(),
            UserId::new(),
            Money::from_major(1000),
            Currency::RUB,
            Utc::now(),
        )
    }

    #[test]
    fn fresh_payment_is_pending_and_retryable() {
        let p = payment();
        assert_eq!(p.status(), PaymentStatus::Pending);
        assert!(p.can_be_retried());
        assert!(!p.can_be_refunded());
    }

    #[test]
    fn attempt_budget_is_capped() {
        let mut p = payment();
        let now = Utc::now();
        for _ in 0..MAX_RETRY_COUNT {
            assert!(p.can_be_retried());
            p.begin_attempt();
            p.fail("card declined".into(), now);
        }
        assert_eq!(p.retry_count(), MAX_RETRY_COUNT);
        assert!(!p.can_be_retried());
    }

    #[test]
    fn refund_allowed_once_after_success() {
        let mut p = payment();
        let now = Utc::now();
        p.begin_attempt();
        p.complete("txn-1".into(), Some("4242".into()), Some("VISA".into()), now);
        assert!(p.can_be_refunded());

        p.record_refund(Money::from_major(1000), now);
        assert_eq!(p.status(), PaymentStatus::Refunded);
        assert!(!p.can_be_refunded());
    }

    #[test]
    fn success_clears_failure_reason() {
        let mut p = payment();
        let now = Utc::now();
        p.begin_attempt();
        p.fail("timeout".into(), now);
        p.begin_attempt();
        p.complete("txn-2".into(), None, None, now);
        assert_eq!(p.failure_reason(), None);
        assert_eq!(p.transaction_id(), Some("txn-2"));
    }
}
