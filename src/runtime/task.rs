//! Task storage for the single-threaded core.
//!
//! A task is a boxed `!Send` future. While a task is being polled its future
//! is checked out of the table so that the poll may freely spawn, wake or
//! dispose without holding a borrow.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// A boxed, pinned, non-`Send` future.
pub type LocalBoxFuture<T> = Pin<Box<dyn Future<Output = T> + 'static>>;

/// Identifier of a spawned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Creates a task id from a raw counter value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

enum Slot {
    Idle(LocalBoxFuture<()>),
    Running,
}

/// Table of live tasks.
#[derive(Default)]
pub struct TaskTable {
    tasks: HashMap<TaskId, Slot>,
    next_id: u64,
}

impl TaskTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a task, returning its id.
    pub fn insert(&mut self, future: LocalBoxFuture<()>) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.insert(id, Slot::Idle(future));
        id
    }

    /// Checks a task's future out for polling.
    ///
    /// Returns `None` if the task finished, was dropped, or is already being
    /// polled (a task that wakes itself during its own poll).
    pub fn checkout(&mut self, id: TaskId) -> Option<LocalBoxFuture<()>> {
        let slot = self.tasks.get_mut(&id)?;
        match std::mem::replace(slot, Slot::Running) {
            Slot::Idle(future) => Some(future),
            Slot::Running => None,
        }
    }

    /// Returns a still-pending future after a poll.
    ///
    /// Ignored if the task was removed while it was checked out.
    pub fn checkin(&mut self, id: TaskId, future: LocalBoxFuture<()>) {
        if let Some(slot) = self.tasks.get_mut(&id) {
            *slot = Slot::Idle(future);
        }
    }

    /// Removes a finished task.
    pub fn remove(&mut self, id: TaskId) {
        self.tasks.remove(&id);
    }

    /// Returns the number of live tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if there are no live tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Takes every stored future out of the table.
    ///
    /// The caller drops them outside of any borrow on the table.
    pub fn take_all(&mut self) -> Vec<LocalBoxFuture<()>> {
        std::mem::take(&mut self.tasks)
            .into_values()
            .filter_map(|slot| match slot {
                Slot::Idle(future) => Some(future),
                Slot::Running => None,
            })
            .collect()
    }
}

impl fmt::Debug for TaskTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskTable")
            .field("len", &self.tasks.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}
