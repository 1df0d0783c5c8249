//! Injected dependencies shared by all lifecycle components.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability.
///
/// Production code uses [`SystemClock`]; tests inject a fixed clock so
/// timestamps (and generated booking references) are deterministic.
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// System clock backed by `Utc::now()`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
