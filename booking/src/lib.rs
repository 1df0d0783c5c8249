//! Booking lifecycle orchestration.
//!
//! Creating a booking commits seat inventory and money across
//! independently-owned resources without a distributed transaction.
//! The [`saga::BookingSagaOrchestrator`] sequences those effects and
//! compensates on partial failure; the [`service::BookingService`] is
//! the public entry point that validates requests, persists the
//! aggregate, and drives the sagas.

pub mod repository;
pub mod saga;
pub mod service;

pub use repository::{BookingRepository, InMemoryBookingRepository};
pub use saga::log::{InMemorySagaLog, SagaLog, SagaLogEntry, SagaState};
pub use saga::orchestrator::BookingSagaOrchestrator;
pub use service::{BookingService, CreateBookingRequest};
