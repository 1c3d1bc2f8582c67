//! A virtualizable timing and scheduling core.
//!
//! `pendulum` gives a process one `after`/`at`/`every`/`stop` scheduling API
//! that, in production, rides real OS timers, and in tests, rides a
//! deterministic virtual clock that only moves when the test tells it to.
//! Nothing in application code needs to change between the two: a
//! [`Scheduler`] binds to whichever mode is active the moment it is
//! constructed, and every instant read in this crate funnels through
//! [`now`].
//!
//! # Modes
//!
//! The process starts in *real* mode. A test harness calls
//! [`enter_test_mode`] once, up front, to switch to *simulated* mode, after
//! which [`now`] stops tracking the OS clock and only advances when the test
//! calls [`next_tick`] or [`advance_by`]. [`pause`] and [`resume`] let a test
//! freeze delivery (but not the clock) to exercise backlog behavior.
//!
//! # Example
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! pendulum::enter_test_mode();
//!
//! let heartbeat = pendulum::Scheduler::new();
//! heartbeat.every(pendulum::Duration::from_secs(30));
//!
//! let mut ticks = heartbeat.tick();
//! pendulum::next_tick();
//! let fired_at = ticks.recv().await;
//! assert_eq!(fired_at, pendulum::now());
//! # }
//! ```

mod clock;
mod config;
mod driver;
mod fire;
mod instant;
mod registry;
mod scheduler;

pub use config::SchedulerConfig;
pub use driver::{advance_by, enter_test_mode, now, pause, resume};
pub use instant::{Duration, Instant};
pub use scheduler::{Scheduler, Ticks};

// `next_tick` is re-exported under its own line so its doc link target
// resolves without ambiguity against `scheduler::Scheduler::tick`.
pub use driver::next_tick;
