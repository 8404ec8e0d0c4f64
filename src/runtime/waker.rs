//! Waker implementation with deduplication.
//!
//! Wakers must be `Send + Sync`, so woken task ids are collected behind a
//! mutex even though the [`Core`](super::Core) itself is single-threaded. A
//! wake that arrives while the loop is parked in the reactor interrupts the
//! poll.
//!
//! Note: This implementation uses safe Rust only (no unsafe).

use super::task::TaskId;
use parking_lot::Mutex;
use polling::Poller;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Wake, Waker};

/// Shared state for the waker system.
#[derive(Debug)]
pub struct WakerState {
    /// Tasks that have been woken since the last drain.
    woken: Mutex<Vec<TaskId>>,
    /// Set while the loop is blocked in the reactor.
    parked: AtomicBool,
    poller: Arc<Poller>,
}

impl WakerState {
    /// Creates a new waker state bound to the reactor's poller.
    #[must_use]
    pub fn new(poller: Arc<Poller>) -> Self {
        Self {
            woken: Mutex::new(Vec::new()),
            parked: AtomicBool::new(false),
            poller,
        }
    }

    /// Creates a waker for a specific task.
    #[must_use]
    pub fn waker_for(self: &Arc<Self>, task: TaskId) -> Waker {
        Waker::from(Arc::new(TaskWaker {
            state: Arc::clone(self),
            task,
        }))
    }

    /// Drains all woken tasks in wake order.
    pub fn drain_woken(&self) -> Vec<TaskId> {
        std::mem::take(&mut *self.woken.lock())
    }

    /// Returns true if any tasks have been woken.
    #[must_use]
    pub fn has_woken(&self) -> bool {
        !self.woken.lock().is_empty()
    }

    /// Marks the loop as parked (or not) in the reactor.
    pub fn set_parked(&self, parked: bool) {
        self.parked.store(parked, Ordering::SeqCst);
    }

    fn wake(&self, task: TaskId) {
        {
            let mut woken = self.woken.lock();
            if woken.contains(&task) {
                return;
            }
            woken.push(task);
        }
        if self.parked.load(Ordering::SeqCst) {
            // A failed notify only delays the wake until the next timeout.
            let _ = self.poller.notify();
        }
    }
}

/// A waker for a specific task.
struct TaskWaker {
    state: Arc<WakerState>,
    task: TaskId,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.state.wake(self.task);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.state.wake(self.task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> Arc<WakerState> {
        Arc::new(WakerState::new(Arc::new(
            Poller::new().expect("failed to create poller"),
        )))
    }

    #[test]
    fn wake_and_drain() {
        let state = state();
        let waker = state.waker_for(TaskId::new(1));

        waker.wake_by_ref();

        assert!(state.has_woken());
        assert_eq!(state.drain_woken(), vec![TaskId::new(1)]);
        assert!(state.drain_woken().is_empty());
    }

    #[test]
    fn dedup_multiple_wakes() {
        let state = state();
        let waker = state.waker_for(TaskId::new(1));

        waker.wake_by_ref();
        waker.wake_by_ref();
        waker.wake();

        assert_eq!(state.drain_woken().len(), 1);
    }

    #[test]
    fn wake_order_preserved() {
        let state = state();
        for n in [3, 1, 2] {
            state.waker_for(TaskId::new(n)).wake();
        }
        assert_eq!(
            state.drain_woken(),
            vec![TaskId::new(3), TaskId::new(1), TaskId::new(2)]
        );
    }
}
