//! The driver (component E): the process-wide mode singleton and the
//! `now/enter_test_mode/next_tick/advance_by/pause/resume` control surface.
//!
//! The driver mirrors the teacher's pattern of a lazily-constructed,
//! lock-guarded process singleton (`once_cell` + a single lock covering all
//! mutable state) rather than a true `static mut` — see
//! `mofa_foundation::scheduler::CronScheduler`, which holds its schedule map
//! behind one `tokio::sync::RwLock`. Here the guarded state is the mode
//! enum itself plus, in simulated mode, the registry and pause bookkeeping.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::instant::{platform_now, Duration, Instant};
use crate::registry::Registry;

/// The driver mode a freshly-constructed [`crate::Scheduler`] binds to.
/// Cloning `Simulated` clones the `Arc<Registry>`, not the registry itself.
pub(crate) enum DriverMode {
    Real,
    Simulated(Arc<Registry>),
}

struct SimulatedState {
    registry: Arc<Registry>,
    now: Instant,
    paused: bool,
    paused_at: Instant,
}

enum Mode {
    Real,
    Simulated(SimulatedState),
}

static DRIVER: Lazy<Mutex<Mode>> = Lazy::new(|| Mutex::new(Mode::Real));

/// The mode a newly-constructed scheduler should bind to, captured at
/// construction time (see `Scheduler::new`'s doc comment on why the binding
/// is fixed rather than dynamic).
pub(crate) fn current_mode() -> DriverMode {
    match &*DRIVER.lock() {
        Mode::Real => DriverMode::Real,
        Mode::Simulated(s) => DriverMode::Simulated(s.registry.clone()),
    }
}

/// Returns the current instant: the platform monotonic clock in real mode,
/// or the driver's virtual instant in simulated mode. The one function every
/// time read in this crate funnels through (spec.md §4.1).
pub fn now() -> Instant {
    match &*DRIVER.lock() {
        Mode::Real => platform_now(),
        Mode::Simulated(s) => s.now,
    }
}

/// Switches the process to simulated mode and resets it: a fresh, empty
/// registry, virtual time frozen at the current platform instant, and no
/// pause in effect. Schedulers created before this call are orphaned (no
/// longer reachable from any registry, so they never fire again) — spec.md
/// §8 scenario 6, §9.
pub fn enter_test_mode() {
    let mut guard = DRIVER.lock();
    *guard = Mode::Simulated(SimulatedState {
        registry: Arc::new(Registry::new()),
        now: platform_now(),
        paused: false,
        paused_at: platform_now(),
    });
    tracing::debug!("entered test mode: registry reset, virtual clock frozen");
}

fn simulated_misuse(op: &str) -> ! {
    tracing::error!(op, "simulated-mode-only operation called in real mode");
    panic!("pendulum::{op} is only valid in simulated mode — call enter_test_mode() first");
}

/// Advances virtual time to the earliest armed, non-deferred-excluded
/// scheduler's effective due instant and fires everything tied there — or
/// returns `now()` unchanged if nothing is armed. Simulated mode only.
///
/// # Panics
///
/// Panics if the driver is in real mode.
pub fn next_tick() -> Instant {
    let mut guard = DRIVER.lock();
    let sim = match &mut *guard {
        Mode::Simulated(s) => s,
        Mode::Real => simulated_misuse("next_tick"),
    };

    match sim.registry.earliest_due(sim.now) {
        None => sim.now,
        Some(batch) => {
            sim.now = batch.effective_at;
            if sim.paused {
                for s in &batch.schedulers {
                    s.defer(batch.effective_at);
                }
            } else {
                for s in &batch.schedulers {
                    s.fire(batch.effective_at);
                }
            }
            sim.now
        }
    }
}

/// Advances virtual time by `d`, firing every scheduler whose effective due
/// instant falls at or before the target along the way (recomputing the
/// due-set after each batch, since a rearmed periodic may re-enter earlier
/// than the target). Simulated mode only.
///
/// # Panics
///
/// Panics if the driver is in real mode.
pub fn advance_by(d: Duration) -> Instant {
    let mut guard = DRIVER.lock();
    let sim = match &mut *guard {
        Mode::Simulated(s) => s,
        Mode::Real => simulated_misuse("advance_by"),
    };

    // A negative or zero duration still processes anything already due at
    // the current instant, consistent with the "collapse to fire
    // immediately" rule for durations elsewhere in this crate. Clamp up to
    // `now` so a negative `d` fires what's due without regressing the
    // virtual clock (spec.md §8's "monotonic virtual clock" property).
    let target = (sim.now + d).max(sim.now);

    loop {
        match sim.registry.earliest_due(sim.now) {
            Some(batch) if batch.effective_at <= target => {
                sim.now = batch.effective_at;
                if sim.paused {
                    for s in &batch.schedulers {
                        s.defer(batch.effective_at);
                    }
                } else {
                    for s in &batch.schedulers {
                        s.fire(batch.effective_at);
                    }
                }
            }
            _ => {
                sim.now = target;
                return sim.now;
            }
        }
    }
}

/// Pauses virtual time delivery: `next_tick`/`advance_by` still move `now`
/// forward, but no fire is posted to any channel until `resume()`.
/// Idempotent if already paused. Simulated mode only.
///
/// # Panics
///
/// Panics if the driver is in real mode.
pub fn pause() {
    let mut guard = DRIVER.lock();
    let sim = match &mut *guard {
        Mode::Simulated(s) => s,
        Mode::Real => simulated_misuse("pause"),
    };
    if sim.paused {
        return;
    }
    sim.paused = true;
    sim.paused_at = sim.now;
    tracing::debug!(at = sim.now.as_nanos(), "driver paused");
}

/// Resumes virtual time delivery: every scheduler that accrued a deferred
/// fire while paused receives exactly one post, at the resume instant, and
/// (if periodic) is re-armed for `resume_instant + period`. Idempotent if
/// not currently paused. Simulated mode only.
///
/// # Panics
///
/// Panics if the driver is in real mode.
pub fn resume() {
    let mut guard = DRIVER.lock();
    let sim = match &mut *guard {
        Mode::Simulated(s) => s,
        Mode::Real => simulated_misuse("resume"),
    };
    if !sim.paused {
        return;
    }
    sim.paused = false;
    let resume_at = sim.now;
    sim.registry.for_each_live(|s| s.resume_if_deferred(resume_at));
    tracing::debug!(at = resume_at.as_nanos(), "driver resumed");
}

// Any test anywhere in this crate that touches the driver singleton (directly
// here, or indirectly via `Scheduler::new` branching on `driver::current_mode`
// in `scheduler::tests`) must serialize on this lock — otherwise one test's
// `enter_test_mode()`/`Mode::Real` swap races another's. `serial` is emulated
// with a crate-local mutex rather than pulling in the `serial_test` crate,
// since this is the only concern that needs it.
#[cfg(test)]
pub(crate) static TEST_LOCK: Mutex<()> = Mutex::new(());
