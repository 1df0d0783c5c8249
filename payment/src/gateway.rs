//! External payment gateway contract and the test double.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use travelmaster_core::{Currency, Money};
use travelmaster_runtime::Retryable;

/// Failures at the gateway boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The issuer declined the charge; retrying will not help
    #[error("payment declined: {0}")]
    Declined(String),
    /// Not enough funds on the card
    #[error("insufficient funds")]
    InsufficientFunds,
    /// No transaction with the given identifier
    #[error("transaction {0} not found")]
    TransactionNotFound(String),
    /// The gateway did not answer in time
    #[error("gateway timed out")]
    Timeout,
    /// The gateway is down or overloaded
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

impl Retryable for GatewayError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable(_))
    }
}

/// Gateway-side state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayPaymentStatus {
    /// Charged, not refunded
    Charged,
    /// Charged and since refunded
    Refunded,
}

/// What the gateway returns for a successful charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayReceipt {
    /// Gateway-side transaction identifier
    pub transaction_id: String,
    /// Last four digits of the charged card
    pub card_last_four: Option<String>,
    /// Card brand, e.g. "VISA"
    pub card_brand: Option<String>,
}

/// The external payment provider.
///
/// `reference` is the idempotency key: charging the same reference
/// twice returns the original receipt instead of billing again.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges `amount` against the customer, keyed by `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Declined`] or
    /// [`GatewayError::InsufficientFunds`] for terminal rejections, and
    /// [`GatewayError::Timeout`] / [`GatewayError::Unavailable`] for
    /// transient faults worth retrying.
    async fn process_payment(
        &self,
        reference: &str,
        amount: Money,
        currency: Currency,
    ) -> Result<GatewayReceipt, GatewayError>;

    /// Refunds `amount` of a prior charge.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::TransactionNotFound`] for an unknown
    /// transaction.
    async fn refund_payment(
        &self,
        transaction_id: &str,
        amount: Money,
    ) -> Result<(), GatewayError>;

    /// Looks up the gateway-side state of a transaction; the source of
    /// truth when a charge or refund call had an unknown outcome.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::TransactionNotFound`] for an unknown
    /// transaction.
    async fn payment_status(
        &self,
        transaction_id: &str,
    ) -> Result<GatewayPaymentStatus, GatewayError>;
}

/// Scripted outcome for one [`MockPaymentGateway`] call.
#[derive(Debug, Clone)]
enum ScriptedOutcome {
    Approve,
    Fail(GatewayError),
}

/// In-process gateway double with scriptable failures.
///
/// Outcomes are consumed in order; once the script is exhausted every
/// call is approved. Charges are idempotent by reference, matching the
/// real provider's contract.
#[derive(Debug, Default)]
pub struct MockPaymentGateway {
    state: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<ScriptedOutcome>,
    charges: Vec<(String, GatewayReceipt)>,
    refunds: Vec<(String, Money)>,
    next_transaction: u64,
}

impl MockPaymentGateway {
    /// Creates a gateway that approves everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a failure for the next unscripted call.
    pub fn push_failure(&self, error: GatewayError) {
        self.lock().script.push_back(ScriptedOutcome::Fail(error));
    }

    /// Queues an approval, useful between scripted failures.
    pub fn push_approval(&self) {
        self.lock().script.push_back(ScriptedOutcome::Approve);
    }

    /// Number of charges actually billed (idempotent repeats excluded).
    #[must_use]
    pub fn charge_count(&self) -> usize {
        self.lock().charges.len()
    }

    /// Refunds issued so far, as (transaction, amount) pairs.
    #[must_use]
    pub fn refunds(&self) -> Vec<(String, Money)> {
        self.lock().refunds.clone()
    }

    #[allow(clippy::unwrap_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // test double, a poisoned lock means a test already panicked
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn process_payment(
        &self,
        reference: &str,
        _amount: Money,
        _currency: Currency,
    ) -> Result<GatewayReceipt, GatewayError> {
        let mut state = self.lock();
        if let Some((_, receipt)) = state.charges.iter().find(|(r, _)| r == reference) {
            return Ok(receipt.clone());
        }
        if let Some(ScriptedOutcome::Fail(error)) = state.script.pop_front() {
            return Err(error);
        }
        state.next_transaction += 1;
        let receipt = GatewayReceipt {
            transaction_id: format!("TXN-{:08}", state.next_transaction),
            card_last_four: Some("4242".to_string()),
            card_brand: Some("VISA".to_string()),
        };
        state
            .charges
            .push((reference.to_string(), receipt.clone()));
        Ok(receipt)
    }

    async fn refund_payment(
        &self,
        transaction_id: &str,
        amount: Money,
    ) -> Result<(), GatewayError> {
        let mut state = self.lock();
        if let Some(ScriptedOutcome::Fail(error)) = state.script.pop_front() {
            return Err(error);
        }
        let known = state
            .charges
            .iter()
            .any(|(_, receipt)| receipt.transaction_id == transaction_id);
        if !known {
            return Err(GatewayError::TransactionNotFound(
                transaction_id.to_string(),
            ));
        }
        state.refunds.push((transaction_id.to_string(), amount));
        Ok(())
    }

    async fn payment_status(
        &self,
        transaction_id: &str,
    ) -> Result<GatewayPaymentStatus, GatewayError> {
        let state = self.lock();
        let charged = state
            .charges
            .iter()
            .any(|(_, receipt)| receipt.transaction_id == transaction_id);
        if !charged {
            return Err(GatewayError::TransactionNotFound(
                transaction_id.to_string(),
            ));
        }
        let refunded = state.refunds.iter().any(|(id, _)| id == transaction_id);
        Ok(if refunded {
            GatewayPaymentStatus::Refunded
        } else {
            GatewayPaymentStatus::Charged
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeat_charge_on_same_reference_bills_once() {
        let gateway = MockPaymentGateway::new();
        let first = gateway
            .process_payment("BK-1", Money::from_major(100), Currency::RUB)
            .await
            .unwrap();
        let second = gateway
            .process_payment("BK-1", Money::from_major(100), Currency::RUB)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(gateway.charge_count(), 1);
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let gateway = MockPaymentGateway::new();
        gateway.push_failure(GatewayError::Timeout);

        let err = gateway
            .process_payment("BK-2", Money::from_major(100), Currency::RUB)
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Timeout);
        assert!(err.is_retryable());

        gateway
            .process_payment("BK-2", Money::from_major(100), Currency::RUB)
            .await
            .unwrap();
        assert_eq!(gateway.charge_count(), 1);
    }

    #[tokio::test]
    async fn payment_status_reflects_charges_and_refunds() {
        let gateway = MockPaymentGateway::new();
        let receipt = gateway
            .process_payment("BK-3", Money::from_major(100), Currency::RUB)
            .await
            .unwrap();

        assert_eq!(
            gateway.payment_status(&receipt.transaction_id).await.unwrap(),
            GatewayPaymentStatus::Charged
        );

        gateway
            .refund_payment(&receipt.transaction_id, Money::from_major(100))
            .await
            .unwrap();
        assert_eq!(
            gateway.payment_status(&receipt.transaction_id).await.unwrap(),
            GatewayPaymentStatus::Refunded
        );

        let err = gateway.payment_status("TXN-UNKNOWN").await.unwrap_err();
        assert!(matches!(err, GatewayError::TransactionNotFound(_)));
    }

    #[tokio::test]
    async fn refund_of_unknown_transaction_is_rejected() {
        let gateway = MockPaymentGateway::new();
        let err = gateway
            .refund_payment("TXN-MISSING", Money::from_major(50))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::TransactionNotFound(_)));
        assert!(!err.is_retryable());
    }
}
