//! Deterministic, logical-time event scheduling.
//!
//! `vtsched` drives time-dependent code without touching the wall clock:
//! callers register actions at virtual due times, then advance a simulated
//! clock to execute them in causal order. Hours of simulated latency
//! collapse into microseconds of real execution, which is what makes
//! time-based pipelines assertable inside ordinary tests and simulations.
//!
//! # Ordering contract
//!
//! - items run in `(due time, insertion sequence)` order, so equal due
//!   times replay in the order they were scheduled
//! - the clock only moves forward, jumping to each item's due time
//! - cancellation is lazy: a flagged item never runs, and the queue sheds
//!   it on the next traversal
//! - periodic work is an emulation: every tick schedules its successor one
//!   period after its own due time
//!
//! # Example
//!
//! ```
//! use vtsched::VirtualTimeScheduler;
//!
//! let mut sched = VirtualTimeScheduler::new();
//! sched.schedule_relative(500, |s| {
//!     assert_eq!(s.clock(), 500);
//! });
//! sched.start();
//! assert_eq!(sched.clock(), 500);
//! ```
//!
//! Execution is single-threaded and cooperative: every operation runs to
//! completion on the caller's call frame, and one scheduler instance owns
//! its queue and clock exclusively.

pub mod cancel;
pub mod error;
mod periodic;
pub mod queue;
pub mod scheduler;
pub mod time;

pub use cancel::Cancellation;
pub use error::{Error, Result};
pub use queue::{EventQueue, ScheduledItem, Seq};
pub use scheduler::VirtualTimeScheduler;
pub use time::{MillisDomain, TimeDomain};
