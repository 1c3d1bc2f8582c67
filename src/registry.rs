//! The timing registry (component D): the process-wide set of live
//! schedulers in simulated mode, ordered for earliest-first selection.
//!
//! Holds only [`Weak`] references — grounded in spec.md §5/§9's resource
//! policy ("the registry holds weak references when possible so that
//! dropping a Scheduler handle deregisters it from the driver"). Dead
//! entries are pruned lazily, on the next scan, rather than eagerly.

use std::sync::{Arc, Mutex, Weak};

use crate::instant::Instant;
use crate::scheduler::{SchedulerInner, SubscriptionId};

struct RegistryEntry {
    id: SubscriptionId,
    scheduler: Weak<SchedulerInner>,
}

/// A group of schedulers tied for the earliest effective due instant.
pub(crate) struct DueBatch {
    pub(crate) effective_at: Instant,
    pub(crate) schedulers: Vec<Arc<SchedulerInner>>,
}

#[derive(Default)]
pub(crate) struct Registry {
    entries: Mutex<Vec<RegistryEntry>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Registry::default()
    }

    pub(crate) fn register(&self, id: SubscriptionId, scheduler: Weak<SchedulerInner>) {
        self.entries.lock().unwrap().push(RegistryEntry { id, scheduler });
    }

    /// Prunes dead entries and calls `f` once per live, still-armed
    /// scheduler. Used by `resume()`, which must visit every deferred
    /// scheduler regardless of whether it is currently "due".
    pub(crate) fn for_each_live(&self, mut f: impl FnMut(Arc<SchedulerInner>)) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| match e.scheduler.upgrade() {
            Some(arc) => {
                f(arc);
                true
            }
            None => false,
        });
    }

    /// Finds the minimum *effective* due instant (`max(next_fire, now)`,
    /// see spec.md §9's clamp) across all armed schedulers, and returns
    /// every scheduler tied at that instant, tie-broken by subscription id
    /// for reproducible iteration order. Returns `None` if no scheduler is
    /// armed.
    pub(crate) fn earliest_due(&self, now: Instant) -> Option<DueBatch> {
        let mut entries = self.entries.lock().unwrap();
        let mut live = Vec::with_capacity(entries.len());
        entries.retain(|e| match e.scheduler.upgrade() {
            Some(arc) => {
                if let Some(next_fire) = arc.peek_next_fire() {
                    live.push((e.id, next_fire.max(now), arc));
                }
                true
            }
            None => false,
        });
        drop(entries);

        let min_t = live.iter().map(|(_, t, _)| *t).min()?;
        let mut batch: Vec<_> = live.into_iter().filter(|(_, t, _)| *t == min_t).collect();
        batch.sort_by_key(|(id, _, _)| *id);
        Some(DueBatch {
            effective_at: min_t,
            schedulers: batch.into_iter().map(|(_, _, arc)| arc).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instant::Duration;
    use crate::scheduler::test_support;
    use std::sync::Arc;

    #[test]
    fn dead_weak_refs_are_pruned_on_scan() {
        let registry = Registry::new();
        {
            let s = test_support::new_detached(1);
            registry.register(1, Arc::downgrade(&s));
            test_support::arm_for_test(&s, Instant::from_nanos(10), Some(Duration::from_secs(10)));
            assert!(registry.earliest_due(Instant::from_nanos(0)).is_some());
        }
        // `s` dropped; the weak ref is now dead and should be pruned away.
        assert!(registry.earliest_due(Instant::from_nanos(0)).is_none());
    }

    #[test]
    fn earliest_due_ties_break_by_subscription_id() {
        let registry = Registry::new();
        let a = test_support::new_detached(5);
        let b = test_support::new_detached(2);
        test_support::arm_for_test(&a, Instant::from_nanos(100), None);
        test_support::arm_for_test(&b, Instant::from_nanos(100), None);
        registry.register(5, Arc::downgrade(&a));
        registry.register(2, Arc::downgrade(&b));

        let batch = registry.earliest_due(Instant::from_nanos(0)).unwrap();
        assert_eq!(batch.effective_at, Instant::from_nanos(100));
        assert_eq!(batch.schedulers.len(), 2);
    }

    #[test]
    fn effective_instant_clamps_to_now_for_stale_next_fire() {
        let registry = Registry::new();
        let a = test_support::new_detached(1);
        test_support::arm_for_test(&a, Instant::from_nanos(-50), None);
        registry.register(1, Arc::downgrade(&a));

        let batch = registry.earliest_due(Instant::from_nanos(1_000)).unwrap();
        assert_eq!(batch.effective_at, Instant::from_nanos(1_000));
    }
}
