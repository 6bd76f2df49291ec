//! Periodic scheduling emulated through self-rescheduling one-shot items.
//!
//! There is no native repeating timer: every tick schedules its successor
//! at `tick_due + period`, so repetition stays purely clock-driven and the
//! cadence never drifts, even when a run loop jumps the clock across
//! several periods at once.

use crate::cancel::Cancellation;
use crate::scheduler::VirtualTimeScheduler;
use crate::time::TimeDomain;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared state for one periodic chain. Every tick observes `handle`
/// before running or rescheduling; `state` threads the caller's value from
/// tick to tick.
struct Chain<S, F> {
    handle: Cancellation,
    state: RefCell<Option<S>>,
    step: RefCell<F>,
}

impl<T: TimeDomain> VirtualTimeScheduler<T> {
    /// Run `step` every `period` of virtual time, threading a state value
    /// through successive ticks. The first tick fires one period after the
    /// current clock.
    ///
    /// The returned handle cancels the chain: the next tick to observe the
    /// flag neither runs `step` nor reschedules. At most one such inert
    /// tick can still be queued after `cancel` — it is harmless.
    pub fn schedule_periodic_with_state<S, F>(
        &mut self,
        state: S,
        period: T::Relative,
        step: F,
    ) -> Cancellation
    where
        S: 'static,
        F: FnMut(S) -> S + 'static,
    {
        let chain = Rc::new(Chain {
            handle: Cancellation::new(),
            state: RefCell::new(Some(state)),
            step: RefCell::new(step),
        });
        let handle = chain.handle.clone();
        let first_due = self.domain().add(&self.clock(), &period);
        tracing::trace!(event = "sched.periodic.begin", first_due = ?first_due, "periodic chain started");
        schedule_tick(self, chain, period, first_due);
        handle
    }

    /// State-free periodic convenience.
    pub fn schedule_periodic<F>(&mut self, period: T::Relative, mut step: F) -> Cancellation
    where
        F: FnMut() + 'static,
    {
        self.schedule_periodic_with_state((), period, move |()| step())
    }
}

/// Enqueue one tick of a periodic chain at `due`. The tick applies the
/// state transition, then re-enters here for the next period.
fn schedule_tick<T, S, F>(
    sched: &mut VirtualTimeScheduler<T>,
    chain: Rc<Chain<S, F>>,
    period: T::Relative,
    due: T::Absolute,
) where
    T: TimeDomain,
    S: 'static,
    F: FnMut(S) -> S + 'static,
{
    let tick_due = due.clone();
    // The chain's own flag is the cancellation surface; the per-item
    // handle is deliberately dropped.
    let _ = sched.schedule_absolute_with_state((), due, move |sched, ()| {
        if chain.handle.is_cancelled() {
            tracing::trace!(event = "sched.periodic.halt", "periodic chain cancelled; tick inert");
            return Cancellation::empty();
        }
        let taken = chain.state.borrow_mut().take();
        if let Some(state) = taken {
            let next = (&mut *chain.step.borrow_mut())(state);
            chain.state.borrow_mut().replace(next);
        }
        // Next tick is anchored on this tick's due time, not the clock.
        let next_due = sched.domain().add(&tick_due, &period);
        schedule_tick(sched, chain, period, next_due);
        Cancellation::empty()
    });
}
