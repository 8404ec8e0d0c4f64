//! Timeout wrapper for futures.

use super::sleep::{sleep_until, Sleep};
use crate::error::{Error, Result};
use crate::runtime::Core;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Races a future against a deadline.
///
/// Resolves with the future's output, or fails with a cancellation error
/// once the deadline passes. The inner future is dropped with the wrapper.
#[must_use = "futures do nothing unless polled"]
pub struct TimeoutFuture<F> {
    future: Pin<Box<F>>,
    sleep: Sleep,
    duration: Duration,
}

impl<F: Future> TimeoutFuture<F> {
    /// Wraps `future` with a deadline on `core`.
    pub fn new(core: Core, duration: Duration, future: F) -> Self {
        Self {
            future: Box::pin(future),
            sleep: Sleep::after(core, duration),
            duration,
        }
    }

    /// Returns the deadline.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.sleep.deadline()
    }
}

impl<F> std::fmt::Debug for TimeoutFuture<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutFuture")
            .field("sleep", &self.sleep)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

impl<F: Future> Future for TimeoutFuture<F> {
    type Output = Result<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Poll::Ready(output) = this.future.as_mut().poll(cx) {
            return Poll::Ready(Ok(output));
        }
        match Pin::new(&mut this.sleep).poll(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Err(Error::cancelled(format!(
                "timed out after {:?}",
                this.duration
            )))),
            Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Wraps `future` with a deadline on the current core.
pub fn timeout<F: Future>(duration: Duration, future: F) -> TimeoutFuture<F> {
    TimeoutFuture {
        future: Box::pin(future),
        sleep: sleep_until(Instant::now() + duration),
        duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::IntoFuture;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn completes_before_deadline() {
        init_test("completes_before_deadline");
        let core = Core::new().expect("core");
        let result = core
            .block_on(async { timeout(Duration::from_secs(5), async { 7 }).await })
            .expect("block_on");
        assert_eq!(result.expect("in time"), 7);
        crate::test_complete!("completes_before_deadline");
    }

    #[test]
    fn fails_after_deadline() {
        init_test("fails_after_deadline");
        let core = Core::new().expect("core");
        let handle = core.clone();
        let result = core
            .block_on(async move {
                TimeoutFuture::new(
                    handle.clone(),
                    Duration::from_millis(5),
                    handle.sleep(Duration::from_secs(60)).into_future(),
                )
                .await
            })
            .expect("block_on");
        let err = result.expect_err("timed out");
        crate::assert_with_log!(err.is_cancelled(), "cancelled", true, err.is_cancelled());
        crate::test_complete!("fails_after_deadline");
    }
}
