//! The scheduler (component C): the public `after/at/every/stop/tick`
//! contract, plus the real-mode background timer task and the bookkeeping
//! the simulated-mode driver needs to fire it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;

use crate::config::SchedulerConfig;
use crate::driver::{self, DriverMode};
use crate::fire::FireChannel;
use crate::instant::{to_std_instant, Duration, Instant};

/// Stable identity used as the tie-break key across schedulers sharing a
/// `next_fire` instant (spec.md §3/§4.4).
pub(crate) type SubscriptionId = u64;

fn next_subscription_id() -> SubscriptionId {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

struct SchedulerState {
    next_fire: Option<Instant>,
    period: Option<Duration>,
    /// Set while the driver is paused and this scheduler has an undelivered
    /// fire owed to it; cleared by `resume()`. See SPEC_FULL.md §4.4.
    deferred: bool,
}

impl SchedulerState {
    fn idle() -> Self {
        SchedulerState { next_fire: None, period: None, deferred: false }
    }
}

/// The shared, reference-counted scheduler state. A [`Scheduler`] handle
/// wraps an `Arc<SchedulerInner>`; the registry (simulated mode) or the
/// real-mode background task hold only a [`Weak`] back-reference, so the
/// last `Scheduler` handle being dropped is what actually tears things down
/// (spec.md §5's resource policy).
pub(crate) struct SchedulerInner {
    id: SubscriptionId,
    state: Mutex<SchedulerState>,
    fire: FireChannel,
    /// Wakes the real-mode background task when `after/at/every/stop` change
    /// `next_fire` out from under a sleep already in progress.
    rearm: Notify,
}

impl SchedulerInner {
    fn new(id: SubscriptionId, config: SchedulerConfig) -> Arc<Self> {
        Arc::new(SchedulerInner {
            id,
            state: Mutex::new(SchedulerState::idle()),
            fire: FireChannel::new(config.max_queued_waiters),
            rearm: Notify::new(),
        })
    }

    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn peek_next_fire(&self) -> Option<Instant> {
        self.state.lock().unwrap().next_fire
    }

    /// Arms (or re-arms) the scheduler. `period = None` means one-shot.
    pub(crate) fn arm(&self, next_fire: Instant, period: Option<Duration>) {
        let mut state = self.state.lock().unwrap();
        state.next_fire = Some(next_fire);
        state.period = period;
        state.deferred = false;
        drop(state);
        self.rearm.notify_one();
    }

    fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.next_fire = None;
        state.period = None;
        state.deferred = false;
        drop(state);
        self.rearm.notify_one();
    }

    /// Normal (unpaused) fire at `at`: posts to the channel and, if
    /// periodic, re-arms for `at + period`.
    pub(crate) fn fire(&self, at: Instant) {
        let mut state = self.state.lock().unwrap();
        state.next_fire = state.period.map(|p| at + p);
        state.deferred = false;
        drop(state);
        tracing::debug!(id = self.id, at = at.as_nanos(), "scheduler fired");
        self.fire.post(at);
    }

    /// Paused-mode "fire": marks the scheduler as owing a resume-time fire
    /// and silently advances `next_fire` by one period (if periodic) so the
    /// driver keeps making progress across further `next_tick`/`advance_by`
    /// calls, without delivering anything to consumers yet.
    pub(crate) fn defer(&self, at: Instant) {
        let mut state = self.state.lock().unwrap();
        state.deferred = true;
        state.next_fire = state.period.map(|p| at + p);
        tracing::debug!(id = self.id, at = at.as_nanos(), "scheduler fire deferred by pause");
    }

    /// At `resume()`: delivers the one fire this scheduler owes, if any.
    pub(crate) fn resume_if_deferred(&self, resume_at: Instant) {
        let mut state = self.state.lock().unwrap();
        if !state.deferred {
            return;
        }
        state.deferred = false;
        state.next_fire = state.period.map(|p| resume_at + p);
        drop(state);
        tracing::debug!(id = self.id, at = resume_at.as_nanos(), "deferred fire delivered at resume");
        self.fire.post(resume_at);
    }

    async fn recv_fire(&self) -> Instant {
        self.fire.recv().await
    }
}

/// Runs the real-mode background timer for one scheduler until its last
/// strong handle is dropped. Grounded in the teacher's
/// `CronScheduler::spawn_schedule_task`, which loops a `tokio::select!`
/// between a timer source and a cancellation signal; here the "timer
/// source" is `sleep_until(next_fire)` and "cancellation" is either
/// `stop()` (next_fire becomes `None`, so the task parks on `rearm`
/// instead) or the handle being dropped (the `Weak` fails to upgrade).
async fn run_real_timer(weak: Weak<SchedulerInner>) {
    loop {
        let inner = match weak.upgrade() {
            Some(inner) => inner,
            None => return,
        };
        let target = inner.state.lock().unwrap().next_fire;
        match target {
            None => {
                let notified = inner.rearm.notified();
                drop(inner);
                notified.await;
            }
            Some(t) => {
                let now = crate::now();
                let effective = t.max(now);
                let sleep = tokio::time::sleep_until(to_std_instant(effective).into());
                let notified = inner.rearm.notified();
                tokio::select! {
                    _ = sleep => {
                        let still_current = inner.state.lock().unwrap().next_fire == Some(t);
                        if still_current {
                            inner.fire(effective);
                        }
                        // else: superseded by a concurrent arm/stop while we slept.
                    }
                    _ = notified => {
                        // Re-read state on the next loop iteration.
                    }
                }
            }
        }
    }
}

/// A one-shot or periodic timing object (component C).
///
/// `Scheduler` is a cheap, cloneable handle: cloning shares the same
/// underlying fire channel and schedule, it does not create a second
/// independent timer. Dropping every clone deregisters the scheduler from
/// the driver (simulated mode) or stops its background task (real mode).
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

impl Scheduler {
    /// Creates an idle scheduler and binds it to whichever driver mode is
    /// active right now. The binding is fixed at construction time: a
    /// scheduler created under `Real` keeps using its background timer task
    /// even if the process later calls `enter_test_mode`, and a scheduler
    /// created under `Simulated` is tied to that simulation's registry (it
    /// becomes orphaned, per spec.md §8 scenario 6, if that registry is
    /// later replaced by a fresh `enter_test_mode` call).
    pub fn new() -> Self {
        Scheduler::with_config(SchedulerConfig::default())
    }

    /// Like [`Scheduler::new`], with tunables overridden — see
    /// [`SchedulerConfig`].
    pub fn with_config(config: SchedulerConfig) -> Self {
        let id = next_subscription_id();
        let inner = SchedulerInner::new(id, config);

        match driver::current_mode() {
            DriverMode::Real => {
                tokio::spawn(run_real_timer(Arc::downgrade(&inner)));
            }
            DriverMode::Simulated(registry) => {
                registry.register(id, Arc::downgrade(&inner));
            }
        }

        tracing::debug!(id, "scheduler created");
        Scheduler { inner }
    }

    /// Arms a one-shot fire at `now() + d`. Replaces any prior arming.
    /// `d <= 0` collapses to "fire at the next driver step".
    pub fn after(&self, d: Duration) -> &Self {
        self.at(crate::now() + d)
    }

    /// Arms a one-shot fire at `t`. If `t <= now()`, fires on the next
    /// driver step (see the effective-instant clamp, SPEC_FULL.md §9).
    /// Replaces any prior arming.
    pub fn at(&self, t: Instant) -> &Self {
        self.inner.arm(t, None);
        self
    }

    /// Arms a periodic fire every `p`, starting at `now() + p`. Replaces
    /// any prior arming.
    ///
    /// # Panics
    ///
    /// Panics if `p` is not strictly positive — spec.md §4.4 treats
    /// `every(p <= 0)` as a programmer error to be rejected loudly, not a
    /// silently-busy-spinning schedule.
    pub fn every(&self, p: Duration) -> &Self {
        assert!(
            p.is_positive(),
            "Scheduler::every requires a strictly positive period, got {} ns",
            p.as_nanos()
        );
        self.inner.arm(crate::now() + p, Some(p));
        self
    }

    /// Disarms the scheduler. Clears `next_fire` and `period`; a fire
    /// already sitting in the channel's slot is left for the consumer to
    /// read (spec.md's explicit choice, SPEC_FULL.md §9). Idempotent.
    pub fn stop(&self) -> &Self {
        self.inner.stop();
        self
    }

    /// Returns a consumer endpoint for this scheduler's fires.
    ///
    /// Each call returns an independent endpoint sharing the same
    /// underlying single-slot channel: if several are blocked in `recv()`
    /// concurrently, each post hands off to exactly one of them (oldest
    /// first) before falling back to coalescing (spec.md §4.2).
    pub fn tick(&self) -> Ticks {
        Ticks { inner: self.inner.clone() }
    }
}

/// The consumer endpoint for a [`Scheduler`]'s fires.
///
/// Dropping a `Ticks` while it is suspended in [`Ticks::recv`] simply
/// cancels that wait; the producer notices the receiver is gone and moves
/// on to the next waiter (or the slot) without erroring.
pub struct Ticks {
    inner: Arc<SchedulerInner>,
}

impl Ticks {
    /// Waits for the next fire and returns the instant it was posted at.
    /// There is no timeout; layer one with `tokio::time::timeout` if needed
    /// (spec.md §5).
    pub async fn recv(&mut self) -> Instant {
        self.inner.recv_fire().await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    // `Scheduler::new` branches on `driver::current_mode()`, so these tests
    // touch the same process-global driver singleton as `driver::tests` and
    // `tests/seed_scenarios.rs`. Share their lock and pin the mode with
    // `enter_test_mode()` up front so a concurrently-running `driver::tests`
    // case can't leave the singleton in `Mode::Real` (or a foreign
    // `Mode::Simulated` registry) underneath these.
    fn lock() -> parking_lot::MutexGuard<'static, ()> {
        crate::driver::TEST_LOCK.lock()
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let _guard = lock();
        crate::driver::enter_test_mode();
        let s = Scheduler::new();
        s.every(Duration::from_secs(1));
        s.stop();
        s.stop();
        assert!(s.inner.peek_next_fire().is_none());
    }

    #[tokio::test]
    async fn every_rejects_non_positive_period() {
        let _guard = lock();
        crate::driver::enter_test_mode();
        let s = Scheduler::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            s.every(Duration::ZERO);
        }));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stop_does_not_clear_a_pending_slot_entry() {
        let _guard = lock();
        crate::driver::enter_test_mode();
        let s = Scheduler::new();
        s.inner.fire(crate::now());
        s.stop();
        let mut ticks = s.tick();
        let got = tokio::time::timeout(std::time::Duration::from_millis(50), ticks.recv()).await;
        assert!(got.is_ok(), "a fire already in the slot must survive stop()");
    }

    #[tokio::test]
    async fn clone_shares_the_same_schedule() {
        let _guard = lock();
        crate::driver::enter_test_mode();
        let a = Scheduler::new();
        let b = a.clone();
        b.every(Duration::from_secs(5));
        assert_eq!(a.inner.peek_next_fire(), b.inner.peek_next_fire());
    }
}
