//! Payment orchestration around the gateway.
//!
//! Every gateway call goes through a circuit breaker and a bounded
//! retry. Creation is idempotent by booking reference: the reference is
//! the gateway-side idempotency key, so a timed-out charge that is
//! retried resolves to the original transaction instead of billing
//! twice.

use crate::gateway::{GatewayError, PaymentGateway};
use crate::record::{Payment, PaymentStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use travelmaster_core::{BookingId, Clock, Currency, Money, PaymentId, UserId};
use travelmaster_runtime::{BreakerError, CircuitBreaker, CircuitBreakerConfig, RetryPolicy, retry};

/// Failures surfaced by the processor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessorError {
    /// No payment with the given identifier
    #[error("payment {0} not found")]
    NotFound(PaymentId),
    /// The payment's attempt budget is spent or its status forbids a
    /// retry
    #[error("payment {0} cannot be retried (status {1}, {2} attempts)")]
    NotRetryable(PaymentId, PaymentStatus, u32),
    /// The payment was never charged, or was already refunded
    #[error("payment {0} cannot be refunded")]
    NotRefundable(PaymentId),
    /// Refund larger than the original charge
    #[error("refund of {requested} exceeds charge of {charged}")]
    RefundExceedsCharge {
        /// Amount asked to refund
        requested: Money,
        /// Amount originally charged
        charged: Money,
    },
    /// The breaker is open; the gateway was not called
    #[error("payment gateway circuit is open")]
    CircuitOpen,
    /// The gateway rejected or failed the call
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ProcessorError {
    /// Whether the caller may try again later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::CircuitOpen => true,
            Self::Gateway(err) => {
                matches!(err, GatewayError::Timeout | GatewayError::Unavailable(_))
            }
            _ => false,
        }
    }
}

impl From<BreakerError<GatewayError>> for ProcessorError {
    fn from(err: BreakerError<GatewayError>) -> Self {
        match err {
            BreakerError::Open => Self::CircuitOpen,
            BreakerError::Inner(inner) => Self::Gateway(inner),
        }
    }
}

#[derive(Debug, Default)]
struct ProcessorState {
    payments: HashMap<PaymentId, Payment>,
    /// Booking reference per payment, the gateway idempotency key
    references: HashMap<PaymentId, String>,
    by_reference: HashMap<String, PaymentId>,
}

/// Owns payment records and the resilience policy around the gateway.
pub struct PaymentProcessor {
    gateway: Arc<dyn PaymentGateway>,
    breaker: CircuitBreaker,
    retry_policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    state: RwLock<ProcessorState>,
}

impl PaymentProcessor {
    /// Creates a processor with the default breaker and a 3-attempt
    /// retry budget per gateway call.
    #[must_use]
    pub fn new(gateway: Arc<dyn PaymentGateway>, clock: Arc<dyn Clock>) -> Self {
        Self {
            gateway,
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            retry_policy: RetryPolicy::with_max_attempts(3),
            clock,
            state: RwLock::new(ProcessorState::default()),
        }
    }

    /// Looks up a payment by id.
    pub async fn payment(&self, payment_id: PaymentId) -> Option<Payment> {
        self.state.read().await.payments.get(&payment_id).cloned()
    }

    /// Looks up the payment created for a booking reference.
    pub async fn payment_for_reference(&self, reference: &str) -> Option<Payment> {
        let state = self.state.read().await;
        let id = state.by_reference.get(reference)?;
        state.payments.get(id).cloned()
    }

    /// Charges the booking amount, creating the payment record.
    ///
    /// Idempotent per `reference`: if a payment for the reference
    /// already succeeded, the existing record is returned without
    /// touching the gateway.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::Gateway`] when the charge is rejected
    /// and [`ProcessorError::CircuitOpen`] when the breaker refuses the
    /// call; both leave a `FAILED` record behind for later retry.
    pub async fn create_payment(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        reference: &str,
        amount: Money,
        currency: Currency,
    ) -> Result<Payment, ProcessorError> {
        let payment_id = {
            let mut state = self.state.write().await;
            if let Some(existing_id) = state.by_reference.get(reference).copied() {
                let existing = state
                    .payments
                    .get(&existing_id)
                    .cloned()
                    .ok_or(ProcessorError::NotFound(existing_id))?;
                if existing.status() == PaymentStatus::Success {
                    return Ok(existing);
                }
                // a prior attempt is on record; route through the
                // retry path so the attempt budget is honored
                existing_id
            } else {
                let payment = Payment::new(booking_id, user_id, amount, currency, self.clock.now());
                let id = payment.id();
                state.payments.insert(id, payment);
                state.references.insert(id, reference.to_string());
                state.by_reference.insert(reference.to_string(), id);
                id
            }
        };
        self.attempt_charge(payment_id).await
    }

    /// Re-attempts a failed payment.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::NotRetryable`] once the 3-attempt
    /// budget is spent or the payment already succeeded.
    pub async fn retry_payment(&self, payment_id: PaymentId) -> Result<Payment, ProcessorError> {
        self.attempt_charge(payment_id).await
    }

    /// Refunds a successful payment, once.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::NotRefundable`] unless the payment is
    /// `SUCCESS` with no prior refund, and
    /// [`ProcessorError::RefundExceedsCharge`] when `amount` is larger
    /// than what was charged.
    pub async fn refund_payment(
        &self,
        payment_id: PaymentId,
        amount: Money,
    ) -> Result<Payment, ProcessorError> {
        let transaction_id = {
            let state = self.state.read().await;
            let payment = state
                .payments
                .get(&payment_id)
                .ok_or(ProcessorError::NotFound(payment_id))?;
            if !payment.can_be_refunded() {
                return Err(ProcessorError::NotRefundable(payment_id));
            }
            if amount > payment.amount() {
                return Err(ProcessorError::RefundExceedsCharge {
                    requested: amount,
                    charged: payment.amount(),
                });
            }
            payment
                .transaction_id()
                .map(str::to_string)
                .ok_or(ProcessorError::NotRefundable(payment_id))?
        };

        let gateway = Arc::clone(&self.gateway);
        let breaker = &self.breaker;
        let outcome = retry(self.retry_policy, || {
            let gateway = Arc::clone(&gateway);
            let transaction_id = transaction_id.clone();
            async move {
                breaker
                    .call(|| gateway.refund_payment(&transaction_id, amount))
                    .await
            }
        })
        .await;

        match outcome {
            Ok(()) => {
                let mut state = self.state.write().await;
                let payment = state
                    .payments
                    .get_mut(&payment_id)
                    .ok_or(ProcessorError::NotFound(payment_id))?;
                payment.record_refund(amount, self.clock.now());
                info!(payment_id = %payment_id, amount = %amount, "payment refunded");
                Ok(payment.clone())
            }
            Err(err) => {
                warn!(payment_id = %payment_id, error = %err, "refund failed");
                Err(err.into())
            }
        }
    }

    async fn attempt_charge(&self, payment_id: PaymentId) -> Result<Payment, ProcessorError> {
        let (reference, amount, currency) = {
            let mut state = self.state.write().await;
            let reference = state
                .references
                .get(&payment_id)
                .cloned()
                .ok_or(ProcessorError::NotFound(payment_id))?;
            let payment = state
                .payments
                .get_mut(&payment_id)
                .ok_or(ProcessorError::NotFound(payment_id))?;
            if !payment.can_be_retried() {
                return Err(ProcessorError::NotRetryable(
                    payment_id,
                    payment.status(),
                    payment.retry_count(),
                ));
            }
            payment.begin_attempt();
            (reference, payment.amount(), payment.currency())
        };

        let gateway = Arc::clone(&self.gateway);
        let breaker = &self.breaker;
        let outcome = retry(self.retry_policy, || {
            let gateway = Arc::clone(&gateway);
            let reference = reference.clone();
            async move {
                breaker
                    .call(|| gateway.process_payment(&reference, amount, currency))
                    .await
            }
        })
        .await;

        let mut state = self.state.write().await;
        let payment = state
            .payments
            .get_mut(&payment_id)
            .ok_or(ProcessorError::NotFound(payment_id))?;
        match outcome {
            Ok(receipt) => {
                payment.complete(
                    receipt.transaction_id,
                    receipt.card_last_four,
                    receipt.card_brand,
                    self.clock.now(),
                );
                info!(
                    payment_id = %payment_id,
                    reference,
                    amount = %amount,
                    "payment charged"
                );
                Ok(payment.clone())
            }
            Err(err) => {
                payment.fail(err.to_string(), self.clock.now());
                warn!(
                    payment_id = %payment_id,
                    reference,
                    attempt = payment.retry_count(),
                    error = %err,
                    "payment attempt failed"
                );
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::gateway::MockPaymentGateway;
    use travelmaster_core::SystemClock;

    fn processor(gateway: Arc<MockPaymentGateway>) -> PaymentProcessor {
        PaymentProcessor::new(gateway, Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn successful_charge_completes_the_record() {
        let gateway = Arc::new(MockPaymentGateway::new());
        let processor = processor(Arc::clone(&gateway));

        let payment = processor
            .create_payment(
                BookingId::new(),
                UserId::new(),
                "TM-20250101120000-AAAA",
                Money::from_major(1000),
                Currency::RUB,
            )
            .await
            .unwrap();

        assert_eq!(payment.status(), PaymentStatus::Success);
        assert_eq!(payment.card_last_four(), Some("4242"));
        assert_eq!(gateway.charge_count(), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_within_the_call() {
        let gateway = Arc::new(MockPaymentGateway::new());
        gateway.push_failure(GatewayError::Timeout);
        gateway.push_failure(GatewayError::Unavailable("503".into()));
        let processor = processor(Arc::clone(&gateway));

        let payment = processor
            .create_payment(
                BookingId::new(),
                UserId::new(),
                "TM-20250101120000-BBBB",
                Money::from_major(1000),
                Currency::RUB,
            )
            .await
            .unwrap();

        assert_eq!(payment.status(), PaymentStatus::Success);
        assert_eq!(gateway.charge_count(), 1);
    }

    #[tokio::test]
    async fn decline_fails_immediately_without_retry() {
        let gateway = Arc::new(MockPaymentGateway::new());
        gateway.push_failure(GatewayError::Declined("do not honor".into()));
        let processor = processor(Arc::clone(&gateway));

        let err = processor
            .create_payment(
                BookingId::new(),
                UserId::new(),
                "TM-20250101120000-CCCC",
                Money::from_major(1000),
                Currency::RUB,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessorError::Gateway(GatewayError::Declined(_))));
        assert!(!err.is_retryable());
        assert_eq!(gateway.charge_count(), 0);

        let record = processor
            .payment_for_reference("TM-20250101120000-CCCC")
            .await
            .unwrap();
        assert_eq!(record.status(), PaymentStatus::Failed);
        assert!(record.failure_reason().is_some());
    }

    #[tokio::test]
    async fn repeated_create_after_success_does_not_bill_again() {
        let gateway = Arc::new(MockPaymentGateway::new());
        let processor = processor(Arc::clone(&gateway));
        let booking_id = BookingId::new();
        let user_id = UserId::new();

        let first = processor
            .create_payment(
                booking_id,
                user_id,
                "TM-20250101120000-DDDD",
                Money::from_major(500),
                Currency::RUB,
            )
            .await
            .unwrap();
        let second = processor
            .create_payment(
                booking_id,
                user_id,
                "TM-20250101120000-DDDD",
                Money::from_major(500),
                Currency::RUB,
            )
            .await
            .unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(gateway.charge_count(), 1);
    }

    #[tokio::test]
    async fn manual_retry_budget_is_exhausted_after_three_failed_attempts() {
        let gateway = Arc::new(MockPaymentGateway::new());
        // each processor-level attempt sees one terminal decline
        for _ in 0..3 {
            gateway.push_failure(GatewayError::Declined("do not honor".into()));
        }
        let processor = processor(Arc::clone(&gateway));

        let err = processor
            .create_payment(
                BookingId::new(),
                UserId::new(),
                "TM-20250101120000-EEEE",
                Money::from_major(500),
                Currency::RUB,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Gateway(_)));
        let payment_id = processor
            .payment_for_reference("TM-20250101120000-EEEE")
            .await
            .unwrap()
            .id();

        assert!(processor.retry_payment(payment_id).await.is_err());
        assert!(processor.retry_payment(payment_id).await.is_err());

        let err = processor.retry_payment(payment_id).await.unwrap_err();
        assert!(matches!(err, ProcessorError::NotRetryable(_, _, 3)));
    }

    #[tokio::test]
    async fn refund_is_allowed_once_and_capped_at_the_charge() {
        let gateway = Arc::new(MockPaymentGateway::new());
        let processor = processor(Arc::clone(&gateway));
        let payment = processor
            .create_payment(
                BookingId::new(),
                UserId::new(),
                "TM-20250101120000-FFFF",
                Money::from_major(1000),
                Currency::RUB,
            )
            .await
            .unwrap();

        let err = processor
            .refund_payment(payment.id(), Money::from_major(2000))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::RefundExceedsCharge { .. }));

        let refunded = processor
            .refund_payment(payment.id(), Money::from_major(1000))
            .await
            .unwrap();
        assert_eq!(refunded.status(), PaymentStatus::Refunded);
        assert_eq!(refunded.refund_amount(), Some(Money::from_major(1000)));

        let err = processor
            .refund_payment(payment.id(), Money::from_major(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::NotRefundable(_)));
        assert_eq!(gateway.refunds().len(), 1);
    }

    #[tokio::test]
    async fn transient_refund_failure_is_retried_within_the_call() {
        let gateway = Arc::new(MockPaymentGateway::new());
        let processor = processor(Arc::clone(&gateway));
        let payment = processor
            .create_payment(
                BookingId::new(),
                UserId::new(),
                "TM-20250101120000-GGGG",
                Money::from_major(1000),
                Currency::RUB,
            )
            .await
            .unwrap();

        gateway.push_failure(GatewayError::Timeout);
        let refunded = processor
            .refund_payment(payment.id(), Money::from_major(1000))
            .await
            .unwrap();

        assert_eq!(refunded.status(), PaymentStatus::Refunded);
        assert_eq!(gateway.refunds().len(), 1);
    }
}
