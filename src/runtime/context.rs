//! Thread-local stack of entered cores.
//!
//! Entering a [`Core`] pushes it; dropping the returned [`EnterGuard`] pops
//! it again, so the most recently entered core is the current one and a
//! nested loop restores its parent when it finishes.

use super::Core;
use std::cell::RefCell;
use std::marker::PhantomData;

thread_local! {
    /// Cores entered on the current thread, innermost last.
    static CORE_STACK: RefCell<Vec<Core>> = const { RefCell::new(Vec::new()) };
}

/// Returns the innermost entered core on this thread.
pub(crate) fn current() -> Option<Core> {
    CORE_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Returns how many cores are entered on this thread.
pub(crate) fn depth() -> usize {
    CORE_STACK.with(|stack| stack.borrow().len())
}

pub(crate) fn enter(core: Core) -> EnterGuard {
    CORE_STACK.with(|stack| stack.borrow_mut().push(core));
    EnterGuard {
        depth: depth(),
        _not_send: PhantomData,
    }
}

/// Restores the previously current core when dropped.
#[derive(Debug)]
#[must_use = "the core is only current while the guard is alive"]
pub struct EnterGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let popped = CORE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(stack.len(), self.depth, "core guards dropped out of order");
            stack.pop()
        });
        // Dropped outside the borrow: the core may own tasks whose drop
        // consults the stack.
        drop(popped);
    }
}
