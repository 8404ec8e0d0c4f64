//! Sleep and yield futures.

use crate::error::{Error, Result};
use crate::runtime::{Core, TimerId};
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct SleepState {
    result: Option<Result<()>>,
    waker: Option<Waker>,
}

#[derive(Debug)]
struct Registration {
    timer: TimerId,
    state: Rc<RefCell<SleepState>>,
}

/// A future that completes once its deadline has passed.
///
/// The deadline is registered with the core's deferred queue on first poll.
/// If the core is disposed before the deadline, the sleep fails with a
/// cancellation error. Dropping an unfinished sleep forgets its timer.
///
/// # Example
///
/// ```ignore
/// use pretzel::time::sleep;
/// use std::time::Duration;
///
/// sleep(Duration::from_millis(100)).await?;
/// ```
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Sleep {
    core: Option<Core>,
    deadline: Instant,
    registration: Option<Registration>,
}

impl Sleep {
    /// Sleep on `core` until `deadline`.
    pub fn until(core: Core, deadline: Instant) -> Self {
        Self {
            core: Some(core),
            deadline,
            registration: None,
        }
    }

    /// Sleep on `core` for `duration`.
    pub fn after(core: Core, duration: Duration) -> Self {
        Self::until(core, Instant::now() + duration)
    }

    /// Returns the deadline.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Returns true if the deadline has passed.
    #[must_use]
    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Time left until the deadline, zero once elapsed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn register(core: &Core, deadline: Instant, waker: &Waker) -> Registration {
        let state = Rc::new(RefCell::new(SleepState {
            result: None,
            waker: Some(waker.clone()),
        }));
        let fired = Rc::clone(&state);
        let timer = core.call_at(deadline, move |result| {
            let waker = {
                let mut state = fired.borrow_mut();
                state.result = Some(result);
                state.waker.take()
            };
            if let Some(waker) = waker {
                waker.wake();
            }
        });
        Registration { timer, state }
    }
}

impl Future for Sleep {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(registration) = &this.registration {
            let mut state = registration.state.borrow_mut();
            return match state.result.take() {
                Some(result) => Poll::Ready(result),
                None => {
                    state.waker = Some(cx.waker().clone());
                    Poll::Pending
                }
            };
        }

        let Some(core) = &this.core else {
            return Poll::Ready(Err(Error::internal("sleep polled outside of a core")));
        };
        if core.is_disposed() {
            return Poll::Ready(Err(Error::cancelled("core disposed")));
        }
        let registration = Self::register(core, this.deadline, cx.waker());
        // A disposed core resolves the callback synchronously.
        let settled = registration.state.borrow_mut().result.take();
        if let Some(result) = settled {
            return Poll::Ready(result);
        }
        this.registration = Some(registration);
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let (Some(core), Some(registration)) = (&self.core, &self.registration) {
            if registration.state.borrow().result.is_none() {
                core.cancel_timer(registration.timer);
            }
        }
    }
}

/// Sleep on the current core for `duration`.
///
/// Fails with an internal error if polled while no core is entered.
pub fn sleep(duration: Duration) -> Sleep {
    sleep_until(Instant::now() + duration)
}

/// Sleep on the current core until `deadline`.
pub fn sleep_until(deadline: Instant) -> Sleep {
    Sleep {
        core: Core::current(),
        deadline,
        registration: None,
    }
}

/// Future that suspends once, resuming on the next tick.
#[derive(Debug, Default)]
#[must_use = "futures do nothing unless polled"]
pub struct YieldNow {
    yielded: bool,
}

impl YieldNow {
    /// Creates a fresh yield point.
    pub const fn new() -> Self {
        Self { yielded: false }
    }
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Yield to the scheduler, resuming on the next tick.
pub fn schedule() -> YieldNow {
    YieldNow::new()
}
