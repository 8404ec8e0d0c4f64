//! Readiness reactor for file descriptors.
//!
//! The reactor is the part of the [`Core`](super::Core) loop that blocks: one
//! call to [`Reactor::poll`] waits for descriptor readiness, a wake
//! notification, or the timeout computed from the nearest deferred deadline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Reactor                           │
//! │  ┌─────────────┐   ┌──────────────────────────────────┐  │
//! │  │   Poller    │   │  sources: HashMap<RawFd, Source> │  │
//! │  │  (polling)  │   │   reader / writer waiters        │  │
//! │  └─────────────┘   └──────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Registrations are oneshot: a delivered event disarms the descriptor and
//! the reactor re-arms whatever interest is still waited on. At most one
//! reader and one writer wait per descriptor, matching the stream invariant
//! of one read and one write in flight.

use polling::{Event as PollEvent, Poller};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::sync::Arc;
use std::task::Waker;
use std::time::Duration;

/// Readiness direction a task waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    /// The descriptor can be read without blocking.
    Readable,
    /// The descriptor can be written without blocking.
    Writable,
}

/// A parked waiter: woken and flagged ready when its event arrives.
#[derive(Debug)]
struct Waiter {
    waker: Waker,
    ready: Rc<Cell<bool>>,
}

impl Waiter {
    fn fire(self) -> Waker {
        self.ready.set(true);
        self.waker
    }
}

#[derive(Debug, Default)]
struct Source {
    reader: Option<Waiter>,
    writer: Option<Waiter>,
    added: bool,
}

impl Source {
    fn poll_event(&self, fd: RawFd) -> PollEvent {
        let key = fd_key(fd);
        match (self.reader.is_some(), self.writer.is_some()) {
            (true, true) => PollEvent::all(key),
            (true, false) => PollEvent::readable(key),
            (false, true) => PollEvent::writable(key),
            (false, false) => PollEvent::none(key),
        }
    }
}

#[allow(clippy::cast_sign_loss)]
fn fd_key(fd: RawFd) -> usize {
    fd as usize
}

#[allow(clippy::cast_possible_wrap)]
fn key_fd(key: usize) -> RawFd {
    key as RawFd
}

/// Readiness reactor built on the `polling` crate.
pub struct Reactor {
    poller: Arc<Poller>,
    sources: RefCell<HashMap<RawFd, Source>>,
    events: RefCell<Vec<PollEvent>>,
}

impl Reactor {
    /// Creates a reactor with room for `capacity` events per poll.
    pub fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poller: Arc::new(Poller::new()?),
            sources: RefCell::new(HashMap::new()),
            events: RefCell::new(Vec::with_capacity(capacity.max(1))),
        })
    }

    /// Returns the shared poller (used by wakers to interrupt a poll).
    #[must_use]
    pub fn poller(&self) -> Arc<Poller> {
        Arc::clone(&self.poller)
    }

    /// Parks `waker` until `fd` is ready for `interest`.
    ///
    /// `ready` is set to true right before the waker is woken. A previous
    /// waiter for the same direction is replaced.
    pub fn register(
        &self,
        fd: RawFd,
        interest: Interest,
        waker: Waker,
        ready: Rc<Cell<bool>>,
    ) -> io::Result<()> {
        let mut sources = self.sources.borrow_mut();
        let source = sources.entry(fd).or_default();
        let waiter = Some(Waiter { waker, ready });
        match interest {
            Interest::Readable => source.reader = waiter,
            Interest::Writable => source.writer = waiter,
        }
        let event = source.poll_event(fd);
        if source.added {
            self.poller.modify(fd, event)?;
        } else {
            self.poller.add(fd, event)?;
            source.added = true;
        }
        tracing::trace!(fd, ?interest, "registered readiness waiter");
        Ok(())
    }

    /// Forgets `fd`, waking any parked waiters so they observe the failure.
    pub fn deregister(&self, fd: RawFd) {
        let removed = self.sources.borrow_mut().remove(&fd);
        if let Some(source) = removed {
            if source.added {
                // The descriptor may already be closed, which removes it from
                // the poller implicitly.
                let _ = self.poller.delete(fd);
            }
            for waiter in [source.reader, source.writer].into_iter().flatten() {
                waiter.fire().wake();
            }
            tracing::trace!(fd, "deregistered descriptor");
        }
    }

    /// Returns the number of descriptors with a parked waiter.
    #[must_use]
    pub fn waiting_count(&self) -> usize {
        self.sources
            .borrow()
            .values()
            .filter(|s| s.reader.is_some() || s.writer.is_some())
            .count()
    }

    /// Blocks until readiness, a notification, or `timeout`.
    ///
    /// Wakes the waiters of every ready descriptor and returns how many
    /// waiters were woken.
    pub fn poll(&self, timeout: Option<Duration>) -> io::Result<usize> {
        let mut events = self.events.borrow_mut();
        events.clear();
        match self.poller.wait(&mut events, timeout) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(0),
            Err(err) => return Err(err),
        }

        let mut wakers = Vec::new();
        {
            let mut sources = self.sources.borrow_mut();
            for event in events.iter() {
                let fd = key_fd(event.key);
                let Some(source) = sources.get_mut(&fd) else {
                    continue;
                };
                if event.readable {
                    wakers.extend(source.reader.take().map(Waiter::fire));
                }
                if event.writable {
                    wakers.extend(source.writer.take().map(Waiter::fire));
                }
                if source.reader.is_some() || source.writer.is_some() {
                    self.poller.modify(fd, source.poll_event(fd))?;
                }
            }
        }
        drop(events);

        let count = wakers.len();
        for waker in wakers {
            waker.wake();
        }
        Ok(count)
    }

    /// Interrupts a blocking [`poll`](Self::poll).
    pub fn wake(&self) -> io::Result<()> {
        self.poller.notify()
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("sources", &self.sources.borrow().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn poll_times_out_without_sources() {
        let reactor = Reactor::new(8).expect("reactor");
        let woken = reactor
            .poll(Some(Duration::from_millis(1)))
            .expect("poll");
        assert_eq!(woken, 0);
    }

    #[test]
    fn readable_event_wakes_reader() {
        let reactor = Reactor::new(8).expect("reactor");
        let (a, mut b) = UnixStream::pair().expect("pair");
        a.set_nonblocking(true).expect("nonblocking");

        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let ready = Rc::new(Cell::new(false));
        reactor
            .register(
                a.as_raw_fd(),
                Interest::Readable,
                Waker::from(Arc::clone(&counter)),
                Rc::clone(&ready),
            )
            .expect("register");
        assert_eq!(reactor.waiting_count(), 1);

        b.write_all(b"x").expect("write");
        let woken = reactor.poll(Some(Duration::from_secs(1))).expect("poll");

        assert_eq!(woken, 1);
        assert!(ready.get());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(reactor.waiting_count(), 0);

        reactor.deregister(a.as_raw_fd());
    }

    #[test]
    fn deregister_wakes_parked_waiters() {
        let reactor = Reactor::new(8).expect("reactor");
        let (a, _b) = UnixStream::pair().expect("pair");

        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let ready = Rc::new(Cell::new(false));
        reactor
            .register(
                a.as_raw_fd(),
                Interest::Readable,
                Waker::from(Arc::clone(&counter)),
                Rc::clone(&ready),
            )
            .expect("register");

        reactor.deregister(a.as_raw_fd());
        assert!(ready.get());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wake_interrupts_poll() {
        let reactor = Reactor::new(8).expect("reactor");
        reactor.wake().expect("wake");
        // Returns promptly instead of blocking for the full timeout.
        let start = std::time::Instant::now();
        reactor.poll(Some(Duration::from_secs(5))).expect("poll");
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
