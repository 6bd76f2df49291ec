//! Cancellation handles for scheduled work.

use std::cell::Cell;
use std::rc::Rc;

/// Cloneable cancellation handle over a once-settable flag.
///
/// Cancellation is cooperative and lazy: [`cancel`](Self::cancel) flips the
/// shared flag and returns immediately; the owning scheduler skips and
/// discards flagged items the next time its queue is traversed. Flipping
/// the flag after the work has already run has no effect.
///
/// The flag is a plain `Rc<Cell<bool>>` — the scheduler is single-threaded
/// by design, so there is nothing to synchronize.
#[derive(Debug, Clone)]
pub struct Cancellation {
    flag: Rc<Cell<bool>>,
}

impl Cancellation {
    /// Create a live handle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Rc::new(Cell::new(false)),
        }
    }

    /// A pre-completed handle, used as the placeholder return value for
    /// work with nothing left to cancel. It reports itself cancelled and
    /// cancelling it again is a no-op.
    #[must_use]
    pub fn empty() -> Self {
        let handle = Self::new();
        handle.flag.set(true);
        handle
    }

    /// Set the flag. Idempotent.
    pub fn cancel(&self) {
        if !self.flag.replace(true) {
            tracing::trace!(event = "sched.cancel", "cancellation requested");
        }
    }

    /// Whether the flag has been set.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.get()
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}
