//! Clock abstraction (component A).
//!
//! Mirrors the teacher's `mofa_kernel::scheduler::Clock` trait — a thin
//! seam that lets time reads be swapped out in tests — generalized from
//! wall-clock milliseconds to the nanosecond [`Instant`] space shared by
//! real and simulated mode.

use crate::instant::{self, Instant};

/// Provides the current instant. Injected so that driver internals never
/// call `Instant::platform_now` directly; production code only ever reads
/// time through [`crate::now`].
pub(crate) trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The real clock: the platform monotonic instant.
pub(crate) struct RealClock;

impl Clock for RealClock {
    fn now(&self) -> Instant {
        instance_now()
    }
}

fn instance_now() -> Instant {
    instant::platform_now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_clock_is_monotonic() {
        let clock = RealClock;
        let t1 = clock.now();
        let t2 = clock.now();
        assert!(t2 >= t1, "clock went backwards: {:?} > {:?}", t1, t2);
    }
}
