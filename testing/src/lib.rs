//! Test doubles and fixtures shared across the workspace.
//!
//! Production code never depends on this crate; it exists so
//! integration tests can inject deterministic clocks, recording
//! publishers, and misbehaving inventory collaborators without each
//! test reinventing them.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use travelmaster_core::{
    BookingReference, Clock, EventPublisher, Gender, LifecycleEvent, Passenger, PublishError,
    TripId,
};
use travelmaster_trip::{InventoryError, TripInventory, TripSummary};

fn recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A clock pinned to a known instant, advanced explicitly.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock pinned to `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = recover(&self.now);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *recover(&self.now)
    }
}

/// A clock pinned to 2025-01-01 12:00:00 UTC.
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).single().unwrap_or_default())
}

/// Publisher that records every event and can be scripted to fail.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<LifecycleEvent>>,
    failures_remaining: AtomicU32,
}

impl RecordingPublisher {
    /// Creates a publisher that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` publish calls fail.
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Everything published so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        recover(&self.events).clone()
    }

    /// Event types published so far, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        recover(&self.events)
            .iter()
            .map(LifecycleEvent::event_type)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: LifecycleEvent) -> Result<(), PublishError> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(PublishError::Failed {
                event_type: event.event_type(),
                reason: "scripted failure".to_string(),
            });
        }
        recover(&self.events).push(event);
        Ok(())
    }
}

/// Inventory wrapper that fails reservation calls until its failure
/// budget is spent, then delegates.
pub struct FlakyInventory<I> {
    inner: Arc<I>,
    failures_remaining: AtomicU32,
}

impl<I: TripInventory> FlakyInventory<I> {
    /// Wraps `inner`, failing the first `failures` reserve calls.
    #[must_use]
    pub fn new(inner: Arc<I>, failures: u32) -> Self {
        Self {
            inner,
            failures_remaining: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl<I: TripInventory> TripInventory for FlakyInventory<I> {
    async fn trip(&self, trip_id: TripId) -> Result<TripSummary, InventoryError> {
        self.inner.trip(trip_id).await
    }

    async fn reserve_seats(
        &self,
        trip_id: TripId,
        reference: &BookingReference,
        seats: u32,
    ) -> Result<(), InventoryError> {
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(InventoryError::Unavailable(
                "scripted inventory outage".to_string(),
            ));
        }
        self.inner.reserve_seats(trip_id, reference, seats).await
    }

    async fn release_seats(
        &self,
        trip_id: TripId,
        reference: &BookingReference,
    ) -> Result<u32, InventoryError> {
        self.inner.release_seats(trip_id, reference).await
    }

    async fn reservation(
        &self,
        trip_id: TripId,
        reference: &BookingReference,
    ) -> Result<Option<u32>, InventoryError> {
        self.inner.reservation(trip_id, reference).await
    }
}

/// Inventory wrapper whose reserve call never returns, for exercising
/// the bounded-timeout path. When `apply_before_stall` is set the
/// reservation is recorded before the call hangs, so a follow-up
/// lookup sees it succeeded.
pub struct StallingInventory<I> {
    inner: Arc<I>,
    stall: StalledCall,
}

enum StalledCall {
    ReserveApplied,
    ReserveDropped,
    Release,
}

impl<I: TripInventory> StallingInventory<I> {
    /// Reserve calls hang after the reservation took effect.
    #[must_use]
    pub fn applying(inner: Arc<I>) -> Self {
        Self {
            inner,
            stall: StalledCall::ReserveApplied,
        }
    }

    /// Reserve calls hang without touching the inventory.
    #[must_use]
    pub fn dropping(inner: Arc<I>) -> Self {
        Self {
            inner,
            stall: StalledCall::ReserveDropped,
        }
    }

    /// Release calls hang; everything else delegates.
    #[must_use]
    pub fn releasing(inner: Arc<I>) -> Self {
        Self {
            inner,
            stall: StalledCall::Release,
        }
    }
}

#[async_trait]
impl<I: TripInventory> TripInventory for StallingInventory<I> {
    async fn trip(&self, trip_id: TripId) -> Result<TripSummary, InventoryError> {
        self.inner.trip(trip_id).await
    }

    async fn reserve_seats(
        &self,
        trip_id: TripId,
        reference: &BookingReference,
        seats: u32,
    ) -> Result<(), InventoryError> {
        match self.stall {
            StalledCall::ReserveApplied => {
                self.inner.reserve_seats(trip_id, reference, seats).await?;
            }
            StalledCall::ReserveDropped => {}
            StalledCall::Release => {
                return self.inner.reserve_seats(trip_id, reference, seats).await;
            }
        }
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn release_seats(
        &self,
        trip_id: TripId,
        reference: &BookingReference,
    ) -> Result<u32, InventoryError> {
        if matches!(self.stall, StalledCall::Release) {
            std::future::pending::<()>().await;
        }
        self.inner.release_seats(trip_id, reference).await
    }

    async fn reservation(
        &self,
        trip_id: TripId,
        reference: &BookingReference,
    ) -> Result<Option<u32>, InventoryError> {
        self.inner.reservation(trip_id, reference).await
    }
}

/// A plausible adult passenger for fixtures.
#[must_use]
pub fn passenger(first_name: &str, last_name: &str) -> Passenger {
    Passenger {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 6, 15).unwrap_or_default(),
        passport_number: Some(format!("75 {:07}", first_name.len() * 1_000_001)),
        gender: Gender::Other,
        email: Some(format!(
            "{}.{}@example.com",
            first_name.to_lowercase(),
            last_name.to_lowercase()
        )),
        phone: Some("+7 900 000-00-00".to_string()),
    }
}
