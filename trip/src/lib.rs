//! # TravelMaster Trip Inventory
//!
//! The trip-inventory collaborator consumed by the booking saga. It
//! owns the one piece of mutable state shared across bookings: per-trip
//! seat counters.
//!
//! Seat accounting is check-and-decrement inside a single critical
//! section per trip record, so two concurrent reservations can never
//! jointly oversell a trip. Reservations are keyed by booking
//! reference, which makes a retried reserve idempotent and lets a
//! caller resolve a timed-out reserve by looking the reservation up
//! instead of guessing.

pub mod inventory;
pub mod record;

pub use inventory::{InMemoryTripInventory, InventoryError, TripInventory};
pub use record::{TripRecord, TripStatus, TripSummary};
