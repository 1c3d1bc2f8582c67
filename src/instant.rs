//! Monotonic instants and signed durations.
//!
//! A custom [`Instant`] (rather than `std::time::Instant`) is required because
//! simulated mode must be able to manufacture arbitrary instants that were
//! never produced by the platform clock. Every instant in this crate, real or
//! simulated, is a nanosecond offset from a single process-wide epoch so that
//! values from both modes remain totally ordered and comparable.

use std::ops::{Add, Sub};
use std::sync::OnceLock;
use std::time::Instant as StdInstant;

/// A monotonic point in time with nanosecond precision, totally ordered.
///
/// Subtracting two instants yields a [`Duration`]. There is no `now()` method
/// here deliberately — reading the current instant always goes through
/// [`crate::now`], which is the one function that knows which driver mode is
/// active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(pub(crate) i64);

impl Instant {
    pub(crate) const fn from_nanos(nanos: i64) -> Self {
        Instant(nanos)
    }

    pub(crate) const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Returns the later of two instants.
    pub fn max(self, other: Self) -> Self {
        if self.0 >= other.0 { self } else { other }
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;
    fn add(self, rhs: Duration) -> Instant {
        Instant(self.0.saturating_add(rhs.0))
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;
    fn sub(self, rhs: Instant) -> Duration {
        Duration(self.0.saturating_sub(rhs.0))
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;
    fn sub(self, rhs: Duration) -> Instant {
        Instant(self.0.saturating_sub(rhs.0))
    }
}

/// A signed interval between two [`Instant`]s, in nanoseconds.
///
/// Zero and negative durations are legal: arming a [`crate::Scheduler`] with
/// one collapses to "fire immediately" semantics rather than being rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(i64);

impl Duration {
    pub const ZERO: Duration = Duration(0);

    pub const fn from_nanos(nanos: i64) -> Self {
        Duration(nanos)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Duration(millis.saturating_mul(1_000_000))
    }

    pub const fn from_secs(secs: i64) -> Self {
        Duration(secs.saturating_mul(1_000_000_000))
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Whether this duration is positive (`> 0`), the one requirement
    /// `Scheduler::every` imposes on its argument.
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl From<std::time::Duration> for Duration {
    fn from(d: std::time::Duration) -> Self {
        // A std Duration can't exceed i64::MAX nanos in any realistic input;
        // saturate rather than panic on pathological callers.
        Duration(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl TryFrom<Duration> for std::time::Duration {
    type Error = ();

    /// Negative durations have no `std::time::Duration` representation.
    fn try_from(d: Duration) -> Result<Self, Self::Error> {
        if d.0 < 0 {
            Err(())
        } else {
            Ok(std::time::Duration::from_nanos(d.0 as u64))
        }
    }
}

impl Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0.saturating_add(rhs.0))
    }
}

/// Anchor tying our nanosecond-offset [`Instant`] space to the platform clock,
/// captured lazily on first use (real mode's epoch, and the baseline that
/// `enter_test_mode` freezes simulated time to).
pub(crate) fn platform_anchor() -> StdInstant {
    static ANCHOR: OnceLock<StdInstant> = OnceLock::new();
    *ANCHOR.get_or_init(StdInstant::now)
}

/// The platform monotonic instant, expressed in our `Instant` space.
pub(crate) fn platform_now() -> Instant {
    Instant::from_nanos(platform_anchor().elapsed().as_nanos() as i64)
}

/// Converts one of our instants back into a `std::time::Instant`, for handing
/// to `tokio::time::sleep_until` in real mode. Instants at or before "now" map
/// to the platform's current instant rather than underflowing.
pub(crate) fn to_std_instant(instant: Instant) -> StdInstant {
    let anchor = platform_anchor();
    if instant.0 <= 0 {
        return anchor;
    }
    anchor
        .checked_add(std::time::Duration::from_nanos(instant.0 as u64))
        .unwrap_or_else(StdInstant::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_add_and_subtract_instants() {
        let a = Instant::from_nanos(1_000);
        let b = a + Duration::from_nanos(500);
        assert_eq!(b.as_nanos(), 1_500);
        assert_eq!((b - a).as_nanos(), 500);
    }

    #[test]
    fn negative_duration_is_not_positive() {
        assert!(!Duration::from_nanos(-1).is_positive());
        assert!(!Duration::ZERO.is_positive());
        assert!(Duration::from_nanos(1).is_positive());
    }

    #[test]
    fn instant_max_picks_later() {
        let a = Instant::from_nanos(10);
        let b = Instant::from_nanos(20);
        assert_eq!(a.max(b), b);
        assert_eq!(b.max(a), b);
    }

    #[test]
    fn std_duration_round_trip() {
        let std_d = std::time::Duration::from_millis(250);
        let d: Duration = std_d.into();
        assert_eq!(d.as_nanos(), 250_000_000);
        let back: std::time::Duration = d.try_into().unwrap();
        assert_eq!(back, std_d);
    }

    #[test]
    fn negative_duration_has_no_std_representation() {
        let d = Duration::from_millis(-5);
        let back: Result<std::time::Duration, ()> = d.try_into();
        assert!(back.is_err());
    }
}
