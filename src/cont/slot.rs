//! Single-value hand-off between a callback and an awaiting task.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

struct SlotState<T> {
    value: Option<T>,
    waker: Option<Waker>,
}

/// Creates a connected sender/receiver pair.
pub(crate) fn slot<T>() -> (Sender<T>, Receiver<T>) {
    let state = Rc::new(RefCell::new(SlotState {
        value: None,
        waker: None,
    }));
    (
        Sender {
            state: Rc::clone(&state),
        },
        Receiver { state },
    )
}

/// Filling half of a slot.
pub(crate) struct Sender<T> {
    state: Rc<RefCell<SlotState<T>>>,
}

impl<T> Sender<T> {
    /// Stores the value and wakes the receiver.
    pub(crate) fn send(self, value: T) {
        let waker = {
            let mut state = self.state.borrow_mut();
            state.value = Some(value);
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Future resolving with a value delivered by a callback.
///
/// The value can also be inspected without suspending via
/// [`is_ready`](Self::is_ready) and [`try_take`](Self::try_take).
#[must_use = "futures do nothing unless polled"]
pub struct Receiver<T> {
    state: Rc<RefCell<SlotState<T>>>,
}

impl<T> Receiver<T> {
    /// Returns true if the value has been delivered and not yet taken.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.borrow().value.is_some()
    }

    /// Takes the value if it has been delivered.
    pub fn try_take(&mut self) -> Option<T> {
        self.state.borrow_mut().value.take()
    }
}

impl<T> Future for Receiver<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut state = self.state.borrow_mut();
        match state.value.take() {
            Some(value) => Poll::Ready(value),
            None => {
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("ready", &self.is_ready())
            .finish()
    }
}
