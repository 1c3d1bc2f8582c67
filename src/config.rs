//! Scheduler tunables.
//!
//! Mirrors the teacher's habit of surfacing ambient knobs as their own small
//! config type (e.g. `mofa_foundation::adapter::scheduler::StabilityControl`)
//! rather than hard-coded constants, even when there is only one knob.

/// Configuration for a single [`crate::Scheduler`]. Construct with
/// [`SchedulerConfig::default`] and override fields, or use the builder
/// method.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerConfig {
    /// Caps how many consumers may sit blocked in [`crate::Ticks::recv`] at
    /// once. `None` (the default) is unbounded, matching this crate's "no
    /// general job queue" stance — bounding is opt-in. When the bound is
    /// reached, the oldest blocked consumer is evicted and silently
    /// re-registers rather than erroring.
    pub max_queued_waiters: Option<usize>,
}

impl SchedulerConfig {
    /// Bounds how many consumers may queue on this scheduler's tick channel.
    pub fn with_max_queued_waiters(mut self, bound: usize) -> Self {
        self.max_queued_waiters = Some(bound);
        self
    }
}
