//! Pending-work queue: scheduled items ordered by due time, then insertion.
//!
//! The queue is an ordered multiset keyed by `(due, seq)`. Equal due times
//! resolve by insertion sequence, which is what makes execution traces
//! reproducible. Cancelled items stay physically queued until a traversal
//! reaches them; only their flag changes, so cancellation never perturbs
//! the heap.

use crate::cancel::Cancellation;
use crate::scheduler::VirtualTimeScheduler;
use crate::time::TimeDomain;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::rc::Rc;

/// Monotonically increasing insertion sequence; the tie-break key for items
/// due at the same virtual time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seq(u64);

impl Seq {
    /// Raw counter value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Issue the current value and advance the counter.
    pub(crate) const fn bump(&mut self) -> Self {
        let issued = *self;
        self.0 += 1;
        issued
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// One-shot boxed action. Runs against the scheduler that owns the item and
/// returns a handle covering whatever nested work it scheduled.
pub(crate) type BoxedAction<T> = Box<dyn FnOnce(&mut VirtualTimeScheduler<T>) -> Cancellation>;

/// A unit of pending work: a due time, an insertion sequence, a cancellation
/// flag, and the action to run.
///
/// Items are created by the scheduler's `schedule_*` calls, enter the
/// [`EventQueue`] immediately, and leave it either by being invoked or by
/// being lazily discarded once cancelled. They are never reused.
pub struct ScheduledItem<T: TimeDomain> {
    domain: Rc<T>,
    due: T::Absolute,
    seq: Seq,
    cancel: Cancellation,
    action: Option<BoxedAction<T>>,
}

impl<T: TimeDomain> ScheduledItem<T> {
    pub(crate) fn new(domain: Rc<T>, due: T::Absolute, seq: Seq, action: BoxedAction<T>) -> Self {
        Self {
            domain,
            due,
            seq,
            cancel: Cancellation::new(),
            action: Some(action),
        }
    }

    /// Virtual time at which this item becomes eligible to run.
    #[must_use]
    pub fn due(&self) -> &T::Absolute {
        &self.due
    }

    /// Insertion sequence.
    #[must_use]
    pub const fn seq(&self) -> Seq {
        self.seq
    }

    /// A handle that cancels this item if invoked before it runs.
    #[must_use]
    pub fn handle(&self) -> Cancellation {
        self.cancel.clone()
    }

    /// Once cancelled, an item is inert forever.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run the action at most once. Cancelled items are skipped here even
    /// if a traversal missed them.
    pub(crate) fn invoke(mut self, sched: &mut VirtualTimeScheduler<T>) {
        if self.cancel.is_cancelled() {
            return;
        }
        if let Some(action) = self.action.take() {
            tracing::trace!(
                event = "sched.item.invoke",
                seq = %self.seq,
                due = ?self.due,
                "invoking scheduled item"
            );
            // The returned handle covers work the action scheduled for
            // later; this item has already left the queue, so nothing here
            // retains it.
            let _ = action(sched);
        }
    }
}

impl<T: TimeDomain> fmt::Debug for ScheduledItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledItem")
            .field("due", &self.due)
            .field("seq", &self.seq)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

// Key order is (due, seq) ascending, with due compared through the domain's
// comparator. The heap wraps items in `Reverse` to get a min-heap.
impl<T: TimeDomain> PartialEq for ScheduledItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq && self.domain.compare(&self.due, &other.due) == Ordering::Equal
    }
}

impl<T: TimeDomain> Eq for ScheduledItem<T> {}

impl<T: TimeDomain> PartialOrd for ScheduledItem<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeDomain> Ord for ScheduledItem<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.domain
            .compare(&self.due, &other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Priority queue of pending scheduled items, keyed by `(due, seq)`.
pub struct EventQueue<T: TimeDomain> {
    heap: BinaryHeap<Reverse<ScheduledItem<T>>>,
}

impl<T: TimeDomain> EventQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    /// Insert an item. O(log n).
    pub fn enqueue(&mut self, item: ScheduledItem<T>) {
        self.heap.push(Reverse(item));
    }

    /// The item with the smallest `(due, seq)` key, cancelled or not.
    ///
    /// Callers must drain cancelled items off the front before trusting the
    /// result; the scheduler's run loop does exactly that.
    #[must_use]
    pub fn peek_min(&self) -> Option<&ScheduledItem<T>> {
        self.heap.peek().map(|Reverse(item)| item)
    }

    /// Remove and return the minimum item. O(log n).
    pub fn dequeue_min(&mut self) -> Option<ScheduledItem<T>> {
        self.heap.pop().map(|Reverse(item)| item)
    }

    /// Number of physically queued items, cancelled ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Earliest due time among non-cancelled items, if any.
    #[must_use]
    pub fn next_due(&self) -> Option<T::Absolute> {
        let mut earliest: Option<&ScheduledItem<T>> = None;
        for Reverse(item) in &self.heap {
            if item.is_cancelled() {
                continue;
            }
            let better = earliest
                .is_none_or(|best| item.domain.compare(&item.due, &best.due) == Ordering::Less);
            if better {
                earliest = Some(item);
            }
        }
        earliest.map(|item| item.due.clone())
    }
}

impl<T: TimeDomain> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeDomain> fmt::Debug for EventQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("len", &self.heap.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::MillisDomain;

    fn item(due: u64, seq: Seq) -> ScheduledItem<MillisDomain> {
        ScheduledItem::new(
            Rc::new(MillisDomain),
            due,
            seq,
            Box::new(|_| Cancellation::empty()),
        )
    }

    #[test]
    fn seq_bump_issues_then_advances() {
        let mut seq = Seq::default();
        assert_eq!(seq.bump().value(), 0);
        assert_eq!(seq.bump().value(), 1);
        assert_eq!(seq.value(), 2);
    }

    #[test]
    fn seq_display_format() {
        assert_eq!(format!("{}", Seq::default()), "seq:0");
    }

    #[test]
    fn item_order_is_due_then_seq() {
        let a = item(100, Seq(0));
        let b = item(200, Seq(1));
        assert!(a < b);

        // Same due time: earlier seq wins.
        let c = item(100, Seq(5));
        let d = item(100, Seq(10));
        assert!(c < d);
    }

    #[test]
    fn item_equality_ignores_action() {
        let a = item(100, Seq(5));
        let b = item(100, Seq(5));
        assert_eq!(a, b);
    }

    #[test]
    fn dequeue_yields_min_key_order() {
        let mut queue = EventQueue::new();
        queue.enqueue(item(300, Seq(0)));
        queue.enqueue(item(100, Seq(1)));
        queue.enqueue(item(100, Seq(2)));
        queue.enqueue(item(200, Seq(3)));

        let order: Vec<(u64, u64)> = std::iter::from_fn(|| queue.dequeue_min())
            .map(|i| (*i.due(), i.seq().value()))
            .collect();
        assert_eq!(order, vec![(100, 1), (100, 2), (200, 3), (300, 0)]);
    }

    #[test]
    fn peek_min_does_not_remove() {
        let mut queue = EventQueue::new();
        queue.enqueue(item(50, Seq(0)));
        assert_eq!(queue.peek_min().map(|i| *i.due()), Some(50));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn empty_queue_yields_nothing() {
        let mut queue: EventQueue<MillisDomain> = EventQueue::new();
        assert!(queue.is_empty());
        assert!(queue.peek_min().is_none());
        assert!(queue.dequeue_min().is_none());
        assert!(queue.next_due().is_none());
    }

    #[test]
    fn cancelled_items_stay_queued_but_invisible_to_next_due() {
        let mut queue = EventQueue::new();
        let first = item(100, Seq(0));
        let handle = first.handle();
        queue.enqueue(first);
        queue.enqueue(item(200, Seq(1)));

        assert_eq!(queue.next_due(), Some(100));
        handle.cancel();
        // Physically still present (lazy deletion), logically absent.
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.next_due(), Some(200));
    }

    #[test]
    fn next_due_none_when_all_cancelled() {
        let mut queue = EventQueue::new();
        let only = item(100, Seq(0));
        only.handle().cancel();
        queue.enqueue(only);
        assert_eq!(queue.next_due(), None);
    }
}
