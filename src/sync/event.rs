//! One-shot subscriber lists.
//!
//! An [`Event`] collects one-shot callbacks and invokes each of them once
//! on the next [`fire`](Event::fire). Subscribers added while a fire is in
//! progress wait for the following fire.

use crate::cont::{slot, Receiver};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type Subscriber<T> = Box<dyn FnOnce(T)>;

/// A list of one-shot subscribers notified together.
///
/// # Example
///
/// ```ignore
/// let done = Event::new();
/// done.subscribe_once(|value: u32| println!("got {value}"));
/// assert_eq!(done.fire(7), 1);
/// assert_eq!(done.pending_count(), 0);
/// ```
pub struct Event<T> {
    subscribers: Rc<RefCell<Vec<Subscriber<T>>>>,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Rc::clone(&self.subscribers),
        }
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self {
            subscribers: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<T: Clone + 'static> Event<T> {
    /// Creates an event with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for the next fire.
    pub fn subscribe_once(&self, subscriber: impl FnOnce(T) + 'static) {
        self.subscribers.borrow_mut().push(Box::new(subscriber));
    }

    /// Future resolving with the value of the next fire.
    ///
    /// The subscription is made immediately, not on first poll.
    pub fn next(&self) -> Receiver<T> {
        let (tx, rx) = slot();
        self.subscribe_once(move |value| tx.send(value));
        rx
    }

    /// Number of subscribers waiting for the next fire.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Invokes every current subscriber with `value`, in subscription
    /// order, and returns how many were notified.
    pub fn fire(&self, value: T) -> usize {
        let subscribers = std::mem::take(&mut *self.subscribers.borrow_mut());
        let count = subscribers.len();
        for subscriber in subscribers {
            subscriber(value.clone());
        }
        count
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("pending", &self.subscribers.borrow().len())
            .finish()
    }
}
