//! Coalescing of concurrent requests for the same operation.

use super::event::Event;
use crate::cont::{Cont, Receiver};
use crate::error::Result;
use crate::runtime::Core;
use std::fmt;

/// Runs at most one instance of an action at a time.
///
/// Every [`call`](Self::call) made while an instance is in flight shares
/// that instance's outcome. A call made after the outcome was delivered
/// starts a new instance.
///
/// ```ignore
/// let flush = Singleton::new(core.clone(), Cont::new(|| do_flush()));
/// let a = flush.call();
/// let b = flush.call(); // coalesced with `a`
/// ```
pub struct Singleton<T> {
    core: Core,
    action: Cont<T>,
    done: Event<Result<T>>,
}

impl<T: Clone + 'static> Singleton<T> {
    /// Wraps `action`, spawning instances on `core`.
    pub fn new(core: Core, action: Cont<T>) -> Self {
        Self {
            core,
            action,
            done: Event::new(),
        }
    }

    /// Requests the action's outcome, starting an instance if none is
    /// in flight.
    ///
    /// The returned receiver may be dropped to request the action in the
    /// background.
    pub fn call(&self) -> Receiver<Result<T>> {
        let outcome = self.done.next();
        if self.done.pending_count() == 1 {
            self.launch();
        }
        outcome
    }

    /// [`call`](Self::call) as a continuation.
    pub fn call_cont(&self) -> Cont<T> {
        let this = self.clone();
        Cont::new(move || this.call())
    }

    /// Returns true while an instance is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.done.pending_count() > 0
    }

    fn launch(&self) {
        tracing::trace!("singleton action started");
        let run = self.action.start();
        let done = self.done.clone();
        self.core.spawn(async move {
            let outcome = run.await;
            let waiters = done.fire(outcome);
            tracing::trace!(waiters, "singleton action settled");
        });
    }
}

impl<T> Clone for Singleton<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            action: self.action.clone(),
            done: self.done.clone(),
        }
    }
}

impl<T> fmt::Debug for Singleton<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Singleton")
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
