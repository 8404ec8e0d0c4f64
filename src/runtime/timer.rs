//! Timer heap for deferred callbacks.
//!
//! A min-heap of `(deadline, id)` pairs. Callbacks live beside the heap in
//! the [`Core`](super::Core). Cancelled ids are remembered until their entry
//! reaches the top of the heap, or until they make up half of it, at which
//! point the heap is rebuilt without them.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Instant;

/// Identifier of a deferred callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// A timer entry in the heap.
#[derive(Debug, Clone, Eq, PartialEq)]
struct TimerEntry {
    deadline: Instant,
    id: TimerId,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap; equal deadlines fire in insertion order.
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
    cancelled: HashSet<TimerId>,
    next_id: u64,
}

impl TimerHeap {
    /// Creates a new empty timer heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len().saturating_sub(self.cancelled.len())
    }

    /// Returns true if no live timers remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a timer with the given deadline, returning its id.
    pub fn insert(&mut self, deadline: Instant) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.heap.push(TimerEntry { deadline, id });
        id
    }

    /// Cancels a live timer. Must be called at most once per id, before the
    /// timer is popped.
    pub fn cancel(&mut self, id: TimerId) {
        self.cancelled.insert(id);
        if self.cancelled.len() * 2 >= self.heap.len() {
            let cancelled = std::mem::take(&mut self.cancelled);
            self.heap.retain(|e| !cancelled.contains(&e.id));
        }
    }

    /// Returns the earliest live deadline, if any.
    pub fn peek_deadline(&mut self) -> Option<Instant> {
        while let Some((id, deadline)) = self.heap.peek().map(|e| (e.id, e.deadline)) {
            if !self.cancelled.remove(&id) {
                return Some(deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Pops all live timers that have expired (deadline <= now), earliest
    /// first.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<TimerId> {
        let mut expired = Vec::new();
        while self.heap.peek().is_some_and(|e| e.deadline <= now) {
            if let Some(entry) = self.heap.pop() {
                if !self.cancelled.remove(&entry.id) {
                    expired.push(entry.id);
                }
            }
        }
        expired
    }

    /// Removes every timer, returning live ids in deadline order.
    pub fn drain(&mut self) -> Vec<TimerId> {
        let cancelled = std::mem::take(&mut self.cancelled);
        let mut entries = std::mem::take(&mut self.heap).into_sorted_vec();
        // `into_sorted_vec` is ascending by `Ord`, which is reversed here.
        entries.reverse();
        entries
            .into_iter()
            .map(|e| e.id)
            .filter(|id| !cancelled.contains(id))
            .collect()
    }
}
