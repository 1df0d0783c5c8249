//! Payment processing for bookings.
//!
//! The [`PaymentProcessor`] owns the resilience policy around the
//! external gateway: calls go through a circuit breaker and a bounded
//! retry, and payment creation is idempotent by reference so a retried
//! charge never bills twice.

pub mod gateway;
pub mod processor;
pub mod record;

pub use gateway::{
    GatewayError, GatewayPaymentStatus, GatewayReceipt, MockPaymentGateway, PaymentGateway,
};
pub use processor::{PaymentProcessor, ProcessorError};
pub use record::{Payment, PaymentStatus};
