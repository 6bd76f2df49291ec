//! Virtual-time scheduler: the run loop and clock-advancement operations.
//!
//! # Invariants
//!
//! - **I1 (causal order):** items run in `(due, seq)` order; equal due
//!   times run in the order they were scheduled
//! - **I2 (monotone clock):** the clock never moves backward while a loop
//!   dispatches; it jumps forward to each item's due time
//! - **I3 (lazy cancellation):** a cancelled item never runs; its physical
//!   removal waits for the next queue traversal
//! - **I4 (single loop):** `running` acts as a re-entrancy lock; nested
//!   `start`/`advance_to` calls are no-ops, not undefined behavior
//!
//! # Precondition
//!
//! Actions must not invoke clock-advancing operations (`start`,
//! `advance_to`, `advance_by`, `sleep`) on the scheduler that is driving
//! them. The re-entrancy guard demotes `start`/`advance_to`/`advance_by`
//! violations to traced no-ops; `sleep` from inside an action is simply
//! unsupported.

use crate::cancel::Cancellation;
use crate::error::{Error, Result};
use crate::queue::{EventQueue, ScheduledItem, Seq};
use crate::time::{MillisDomain, TimeDomain};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// A scheduler that runs work at caller-controlled virtual times.
///
/// Scheduling calls register work and return immediately; nothing executes
/// until one of the clock-advance operations ([`start`](Self::start),
/// [`advance_to`](Self::advance_to), [`advance_by`](Self::advance_by))
/// pops the queue in causal order on the caller's own call frame.
pub struct VirtualTimeScheduler<T: TimeDomain = MillisDomain> {
    domain: Rc<T>,
    clock: T::Absolute,
    queue: EventQueue<T>,
    seq: Seq,
    running: bool,
}

impl VirtualTimeScheduler<MillisDomain> {
    /// Millisecond-domain scheduler starting at virtual time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_domain(MillisDomain, 0)
    }
}

impl Default for VirtualTimeScheduler<MillisDomain> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeDomain> VirtualTimeScheduler<T> {
    /// Create a scheduler over a custom time domain, starting at `initial`.
    #[must_use]
    pub fn with_domain(domain: T, initial: T::Absolute) -> Self {
        Self {
            domain: Rc::new(domain),
            clock: initial,
            queue: EventQueue::new(),
            seq: Seq::default(),
            running: false,
        }
    }

    /// Current virtual time.
    #[must_use]
    pub fn clock(&self) -> T::Absolute {
        self.clock.clone()
    }

    /// Current virtual time as a wall-clock-like value, for reporting.
    #[must_use]
    pub fn now_wall(&self) -> DateTime<Utc> {
        self.domain.to_wall(&self.clock)
    }

    /// The time domain supplying ordering and arithmetic.
    #[must_use]
    pub fn domain(&self) -> &T {
        &self.domain
    }

    /// True exactly while a run loop (`start` or `advance_to`) dispatches.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Number of physically queued items, cancelled ones included.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Whether any items are physically queued.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Due time of the next non-cancelled item, if any.
    #[must_use]
    pub fn next_due(&self) -> Option<T::Absolute> {
        self.queue.next_due()
    }

    /// Schedule `action` at an absolute virtual time, threading `state`
    /// through to the invocation. The fundamental scheduling primitive —
    /// every other `schedule_*` call lowers onto this one.
    ///
    /// Returns the item's cancellation handle; cancelling it before the
    /// item runs guarantees the action never executes.
    pub fn schedule_absolute_with_state<S, F>(
        &mut self,
        state: S,
        due: T::Absolute,
        action: F,
    ) -> Cancellation
    where
        S: 'static,
        F: FnOnce(&mut Self, S) -> Cancellation + 'static,
    {
        let seq = self.seq.bump();
        let item = ScheduledItem::new(
            Rc::clone(&self.domain),
            due,
            seq,
            Box::new(move |sched| action(sched, state)),
        );
        let handle = item.handle();
        tracing::trace!(
            event = "sched.item.enqueue",
            %seq,
            due = ?item.due(),
            "item scheduled"
        );
        self.queue.enqueue(item);
        handle
    }

    /// Schedule `action` after a relative delay from the current clock.
    pub fn schedule_relative_with_state<S, F>(
        &mut self,
        state: S,
        delay: T::Relative,
        action: F,
    ) -> Cancellation
    where
        S: 'static,
        F: FnOnce(&mut Self, S) -> Cancellation + 'static,
    {
        let due = self.domain.add(&self.clock, &delay);
        self.schedule_absolute_with_state(state, due, action)
    }

    /// State-free convenience: run `action` at an absolute virtual time.
    pub fn schedule_absolute<F>(&mut self, due: T::Absolute, action: F) -> Cancellation
    where
        F: FnOnce(&mut Self) + 'static,
    {
        self.schedule_absolute_with_state((), due, move |sched, ()| {
            action(sched);
            Cancellation::empty()
        })
    }

    /// State-free convenience: run `action` after a relative delay.
    pub fn schedule_relative<F>(&mut self, delay: T::Relative, action: F) -> Cancellation
    where
        F: FnOnce(&mut Self) + 'static,
    {
        let due = self.domain.add(&self.clock, &delay);
        self.schedule_absolute(due, action)
    }

    /// Schedule at the current clock. The item still queues behind earlier
    /// work due at the same time.
    pub fn schedule_now<F>(&mut self, action: F) -> Cancellation
    where
        F: FnOnce(&mut Self) + 'static,
    {
        let due = self.clock.clone();
        self.schedule_absolute(due, action)
    }

    /// Schedule after a real-duration delay, converted into the domain's
    /// relative unit via [`TimeDomain::to_relative`].
    pub fn schedule_after<F>(&mut self, wait: Duration, action: F) -> Cancellation
    where
        F: FnOnce(&mut Self) + 'static,
    {
        let delay = self.domain.to_relative(wait);
        self.schedule_relative(delay, action)
    }

    /// Pop cancelled items off the front of the queue. This is where lazy
    /// deletion is realized.
    fn drain_cancelled(&mut self) {
        while self.queue.peek_min().is_some_and(ScheduledItem::is_cancelled) {
            if let Some(item) = self.queue.dequeue_min() {
                tracing::trace!(
                    event = "sched.item.drop_cancelled",
                    seq = %item.seq(),
                    "discarded cancelled item"
                );
            }
        }
    }

    /// Jump the clock forward to `due` if it is later than the current
    /// clock. Never moves it backward.
    fn catch_up(&mut self, due: &T::Absolute) {
        if self.domain.compare(due, &self.clock) == Ordering::Greater {
            tracing::trace!(event = "sched.clock.advance", to = ?due, "clock jumped to due time");
            self.clock = due.clone();
        }
    }

    /// Run queued work in causal order until the queue drains or
    /// [`stop`](Self::stop) is called. Actions may schedule further items
    /// (including at the current clock); the loop keeps going until no
    /// work remains, so unbounded recurring work needs an external bound —
    /// use [`advance_to`](Self::advance_to) for that.
    ///
    /// No-op if a run loop is already active.
    pub fn start(&mut self) {
        if self.running {
            tracing::debug!(event = "sched.start.reentrant", "run loop already active; ignoring");
            return;
        }
        self.running = true;
        tracing::debug!(event = "sched.run.begin", pending = self.queue.len(), "run loop started");
        while self.running {
            self.drain_cancelled();
            let Some(item) = self.queue.dequeue_min() else {
                break;
            };
            self.catch_up(item.due());
            item.invoke(self);
        }
        self.running = false;
        tracing::debug!(event = "sched.run.end", clock = ?self.clock, "run loop stopped");
    }

    /// Stop the active run loop; the currently executing action still
    /// completes. Idempotent, and a no-op when idle.
    pub fn stop(&mut self) {
        if self.running {
            tracing::debug!(event = "sched.stop", "stop requested");
        }
        self.running = false;
    }

    /// Run all items due at or before `time`, then land the clock exactly
    /// on `time` — even when nothing was due on the way there.
    ///
    /// Fails with [`Error::OutOfRange`] if `time` is earlier than the
    /// clock; a no-op if equal. Called re-entrantly from inside an action
    /// it returns `Ok` without advancing (see the module precondition).
    pub fn advance_to(&mut self, time: T::Absolute) -> Result<()> {
        match self.domain.compare(&time, &self.clock) {
            Ordering::Less => return Err(Error::OutOfRange { op: "advance_to" }),
            Ordering::Equal => return Ok(()),
            Ordering::Greater => {}
        }
        if self.running {
            tracing::debug!(
                event = "sched.advance.reentrant",
                "advance_to from inside a run loop; ignoring"
            );
            return Ok(());
        }
        self.running = true;
        tracing::debug!(event = "sched.advance.begin", target = ?time, "advancing clock");
        while self.running {
            self.drain_cancelled();
            let eligible = self
                .queue
                .peek_min()
                .is_some_and(|item| self.domain.compare(item.due(), &time) != Ordering::Greater);
            if !eligible {
                break;
            }
            let item = self.queue.dequeue_min().expect("peeked");
            self.catch_up(item.due());
            item.invoke(self);
        }
        self.running = false;
        self.clock = time;
        tracing::debug!(event = "sched.advance.end", clock = ?self.clock, "clock advanced");
        Ok(())
    }

    /// Advance the clock by a relative delta, running everything due on
    /// the way. Fails with [`Error::OutOfRange`] for a negative effective
    /// delta; a no-op for zero.
    pub fn advance_by(&mut self, delta: T::Relative) -> Result<()> {
        let target = self.domain.add(&self.clock, &delta);
        match self.domain.compare(&target, &self.clock) {
            Ordering::Less => Err(Error::OutOfRange { op: "advance_by" }),
            Ordering::Equal => Ok(()),
            Ordering::Greater => self.advance_to(target),
        }
    }

    /// Fast-forward the clock without running any queued work — for
    /// skipping a span known to contain none. Fails with
    /// [`Error::OutOfRange`] unless the delta moves the clock strictly
    /// forward.
    pub fn sleep(&mut self, delta: T::Relative) -> Result<()> {
        let target = self.domain.add(&self.clock, &delta);
        if self.domain.compare(&target, &self.clock) != Ordering::Greater {
            return Err(Error::OutOfRange { op: "sleep" });
        }
        tracing::debug!(event = "sched.sleep", to = ?target, "clock fast-forwarded");
        self.clock = target;
        Ok(())
    }
}

impl<T: TimeDomain> fmt::Debug for VirtualTimeScheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualTimeScheduler")
            .field("clock", &self.clock)
            .field("pending", &self.queue.len())
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}
