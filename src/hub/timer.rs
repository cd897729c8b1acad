//! Timer heap for deadline management.
//!
//! A min-heap of timer ids ordered by deadline. Cancellation is lazy: the
//! owning hub forgets the timer's action and the heap entry is skipped when
//! popped, or dropped early by [`TimerHeap::retain`].

use super::TimerId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct TimerEntry {
    deadline: Instant,
    /// Ids increase monotonically, so equal deadlines fire in arming order.
    id: TimerId,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first)
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A min-heap of timers ordered by deadline.
#[derive(Debug, Default)]
pub struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
}

impl TimerHeap {
    /// Creates a new empty timer heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries, including cancelled ones not yet dropped.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true if the heap is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Adds a timer with the given deadline.
    pub fn insert(&mut self, id: TimerId, deadline: Instant) {
        self.heap.push(TimerEntry { deadline, id });
    }

    /// Returns the earliest deadline, if any.
    #[must_use]
    pub fn peek_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.deadline)
    }

    /// Removes and returns the earliest timer.
    pub fn pop(&mut self) -> Option<(TimerId, Instant)> {
        self.heap.pop().map(|e| (e.id, e.deadline))
    }

    /// Keeps only the timers for which `live` returns true.
    ///
    /// Returns the number of entries dropped.
    pub fn retain(&mut self, mut live: impl FnMut(TimerId) -> bool) -> usize {
        let before = self.heap.len();
        self.heap.retain(|e| live(e.id));
        before - self.heap.len()
    }

    /// Clears all timers.
    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
