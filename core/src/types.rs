//! Value objects shared across the booking lifecycle.
//!
//! Identifiers are UUID newtypes; money is fixed-point minor units
//! (kopecks/cents) to keep floating point out of financial arithmetic.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a booking
    BookingId
}

uuid_id! {
    /// Unique identifier for a trip, owned by the trip inventory
    TripId
}

uuid_id! {
    /// Unique identifier for a user, owned by the user service
    UserId
}

uuid_id! {
    /// Unique identifier for a payment record
    PaymentId
}

// ============================================================================
// Booking reference
// ============================================================================

const REFERENCE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Human-readable booking reference in the form `TM-<YYYYMMDDHHMMSS>-<4 chars>`.
///
/// The generator does not enforce uniqueness; a storage-level unique
/// constraint turns the (negligible-probability) collision into a
/// retryable create conflict.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingReference(String);

impl BookingReference {
    /// Generates a reference stamped with the given time.
    #[must_use]
    pub fn generate(now: DateTime<Utc>) -> Self {
        Self::generate_with(now, &mut rand::thread_rng())
    }

    /// Generates a reference using the supplied RNG (deterministic in tests).
    #[must_use]
    pub fn generate_with<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> Self {
        let suffix: String = (0..4)
            .map(|_| REFERENCE_ALPHABET[rng.gen_range(0..REFERENCE_ALPHABET.len())] as char)
            .collect();
        Self(format!("TM-{}-{suffix}", now.format("%Y%m%d%H%M%S")))
    }

    /// Wraps a reference that already exists (e.g. read back from storage)
    #[must_use]
    pub fn from_string(reference: String) -> Self {
        Self(reference)
    }

    /// Returns the reference as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Currency
// ============================================================================

/// ISO 4217 style three-letter currency code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency([u8; 3]);

impl Currency {
    /// Russian ruble
    pub const RUB: Self = Self(*b"RUB");
    /// US dollar
    pub const USD: Self = Self(*b"USD");
    /// Euro
    pub const EUR: Self = Self(*b"EUR");

    /// Builds a currency from a three-letter code.
    ///
    /// Returns `None` unless the code is exactly three ASCII uppercase
    /// letters.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let bytes = code.as_bytes();
        if bytes.len() == 3 && bytes.iter().all(u8::is_ascii_uppercase) {
            Some(Self([bytes[0], bytes[1], bytes[2]]))
        } else {
            None
        }
    }

    /// Returns the three-letter code
    #[must_use]
    pub fn code(&self) -> &str {
        // Construction guarantees ASCII uppercase.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Money (minor units to avoid floating point errors)
// ============================================================================

/// A monetary amount in minor units (kopecks, cents).
///
/// All arithmetic is checked; the panicking variants exist for the few
/// places where overflow is a programming error rather than input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates an amount from minor units
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Creates an amount from major units (e.g. whole rubles)
    ///
    /// # Panics
    ///
    /// Panics if `major * 100` overflows. Use [`Self::checked_from_major`]
    /// for non-panicking conversion.
    #[must_use]
    #[allow(clippy::panic)]
    pub const fn from_major(major: u64) -> Self {
        match major.checked_mul(100) {
            Some(minor) => Self(minor),
            None => panic!("Money::from_major overflow"),
        }
    }

    /// Creates an amount from major units with overflow checking
    #[must_use]
    pub const fn checked_from_major(major: u64) -> Option<Self> {
        match major.checked_mul(100) {
            Some(minor) => Some(Self(minor)),
            None => None,
        }
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.0
    }

    /// Whether the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(minor) => Some(Self(minor)),
            None => None,
        }
    }

    /// Subtracts `other`, returning `None` if the result would be negative
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        if self.0 >= other.0 {
            Some(Self(self.0 - other.0))
        } else {
            None
        }
    }

    /// Multiplies by a seat/passenger count with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(minor) => Some(Self(minor)),
            None => None,
        }
    }

    /// Multiplies by a seat/passenger count
    ///
    /// # Panics
    ///
    /// Panics on overflow. Use [`Self::checked_multiply`] for
    /// non-panicking multiplication.
    #[must_use]
    #[allow(clippy::panic)]
    pub const fn multiply(self, quantity: u32) -> Self {
        match self.checked_multiply(quantity) {
            Some(result) => result,
            None => panic!("Money::multiply overflow"),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn money_display_uses_two_decimals() {
        assert_eq!(Money::from_minor(100_000).to_string(), "1000.00");
        assert_eq!(Money::from_minor(50_007).to_string(), "500.07");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn money_checked_sub_refuses_negative() {
        let a = Money::from_major(10);
        let b = Money::from_major(20);
        assert_eq!(a.checked_sub(b), None);
        assert_eq!(b.checked_sub(a), Some(Money::from_major(10)));
    }

    #[test]
    fn currency_codes_round_trip() {
        assert_eq!(Currency::from_code("RUB"), Some(Currency::RUB));
        assert_eq!(Currency::RUB.code(), "RUB");
        assert_eq!(Currency::from_code("rub"), None);
        assert_eq!(Currency::from_code("RUBL"), None);
    }

    #[test]
    fn booking_reference_format() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let reference = BookingReference::generate_with(now, &mut rng);

        let text = reference.as_str();
        assert!(text.starts_with("TM-20250314092653-"), "got {text}");

        let suffix = &text["TM-20250314092653-".len()..];
        assert_eq!(suffix.len(), 4);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
    }

    proptest! {
        #[test]
        fn money_multiply_matches_addition(minor in 0u64..1_000_000, quantity in 1u32..50) {
            let unit = Money::from_minor(minor);
            let mut sum = Money::ZERO;
            for _ in 0..quantity {
                sum = sum.checked_add(unit).unwrap();
            }
            prop_assert_eq!(unit.checked_multiply(quantity), Some(sum));
        }
    }
}
