//! The cooperative scheduler.
//!
//! A [`Core`] owns a FIFO ready queue of callbacks, a deadline-ordered queue
//! of deferred callbacks and a readiness [`Reactor`]. One tick of the loop:
//!
//! 1. Runs every callback that was in the ready queue when the tick started.
//!    Work queued during the tick (spawns, wakes, `call_soon`) runs on the
//!    next tick.
//! 2. Blocks in the reactor until the nearest deferred deadline, descriptor
//!    readiness, or a wake. With no deferred work the block is indefinite.
//! 3. Moves elapsed deferred callbacks and woken tasks into the ready queue.
//!
//! Tasks are plain `!Send` futures; their wakers enqueue a "poll task"
//! callback. Everything runs on the thread that drives the core.
//!
//! Disposal is terminal: pending deferred callbacks receive a cancellation
//! failure, and tasks woken by that failure are polled one last time so the
//! awaiting code sees it. The rest of the ready queue and all other tasks
//! are dropped without running, and a blocked loop wakes immediately.

use super::config::CoreConfig;
use super::context::{self, EnterGuard};
use super::reactor::{Interest, Reactor};
use super::task::{LocalBoxFuture, TaskId, TaskTable};
use super::timer::{TimerHeap, TimerId};
use super::waker::WakerState;
use crate::cont::Cont;
use crate::error::{Error, Result};
use crate::time::{Sleep, YieldNow};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Callback run from the deferred queue.
type TimerCallback = Box<dyn FnOnce(Result<()>)>;

enum Runnable {
    Poll(TaskId),
    Call(Box<dyn FnOnce()>),
}

struct CoreInner {
    config: CoreConfig,
    ready: RefCell<VecDeque<Runnable>>,
    tasks: RefCell<TaskTable>,
    timers: RefCell<TimerHeap>,
    callbacks: RefCell<HashMap<TimerId, TimerCallback>>,
    wakers: Arc<WakerState>,
    reactor: Reactor,
    disposed: Cell<bool>,
    ticks: Cell<u64>,
}

/// Handle to a single-threaded cooperative scheduler.
///
/// Cloning is cheap; all clones drive the same queues.
#[derive(Clone)]
pub struct Core {
    inner: Rc<CoreInner>,
}

impl Core {
    /// Creates a core with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(CoreConfig::default())
    }

    /// Creates a core from the given configuration.
    pub fn with_config(mut config: CoreConfig) -> Result<Self> {
        config.normalize();
        let reactor = Reactor::new(config.events_capacity)?;
        let wakers = Arc::new(WakerState::new(reactor.poller()));
        Ok(Self {
            inner: Rc::new(CoreInner {
                config,
                ready: RefCell::new(VecDeque::new()),
                tasks: RefCell::new(TaskTable::new()),
                timers: RefCell::new(TimerHeap::new()),
                callbacks: RefCell::new(HashMap::new()),
                wakers,
                reactor,
                disposed: Cell::new(false),
                ticks: Cell::new(0),
            }),
        })
    }

    /// Returns the innermost entered core on this thread, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        context::current()
    }

    /// Makes this core the current one until the guard is dropped.
    pub fn enter(&self) -> EnterGuard {
        context::enter(self.clone())
    }

    /// Returns the configuration this core was built with.
    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    /// Returns true once [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Returns true if both handles refer to the same core.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of ticks completed so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.inner.ticks.get()
    }

    /// Number of spawned tasks that have not finished.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    /// Number of deferred callbacks still waiting for their deadline.
    #[must_use]
    pub fn timer_count(&self) -> usize {
        self.inner.callbacks.borrow().len()
    }

    // =====================================================================
    // Submission
    // =====================================================================

    /// Spawns a task. Its first poll happens on the next tick.
    ///
    /// On a disposed core the future is dropped without being polled.
    pub fn spawn<F>(&self, future: F) -> TaskId
    where
        F: Future<Output = ()> + 'static,
    {
        let boxed: LocalBoxFuture<()> = Box::pin(future);
        if self.is_disposed() {
            tracing::trace!("spawn on disposed core dropped");
            return TaskId::new(u64::MAX);
        }
        let id = self.inner.tasks.borrow_mut().insert(boxed);
        self.inner.ready.borrow_mut().push_back(Runnable::Poll(id));
        tracing::trace!(task = %id, "spawned task");
        id
    }

    /// Queues a callback on the ready queue.
    pub fn call_soon(&self, callback: impl FnOnce() + 'static) {
        if self.is_disposed() {
            return;
        }
        self.inner
            .ready
            .borrow_mut()
            .push_back(Runnable::Call(Box::new(callback)));
    }

    /// Defers `callback` until `deadline`.
    ///
    /// The callback receives `Ok(())` when the deadline elapses, or a
    /// cancellation failure if the core is disposed first (immediately, if
    /// it already is).
    pub fn call_at(
        &self,
        deadline: Instant,
        callback: impl FnOnce(Result<()>) + 'static,
    ) -> TimerId {
        let id = self.inner.timers.borrow_mut().insert(deadline);
        if self.is_disposed() {
            callback(Err(Error::cancelled("core is disposed")));
            return id;
        }
        self.inner
            .callbacks
            .borrow_mut()
            .insert(id, Box::new(callback));
        id
    }

    /// Defers `callback` by `delay`. See [`call_at`](Self::call_at).
    pub fn call_later(
        &self,
        delay: Duration,
        callback: impl FnOnce(Result<()>) + 'static,
    ) -> TimerId {
        self.call_at(Instant::now() + delay, callback)
    }

    /// Forgets a deferred callback. Returns false if it already ran.
    pub fn cancel_timer(&self, id: TimerId) -> bool {
        let removed = self.inner.callbacks.borrow_mut().remove(&id);
        if removed.is_none() {
            return false;
        }
        self.inner.timers.borrow_mut().cancel(id);
        true
    }

    /// Continuation resolving on the next tick.
    #[must_use]
    pub fn schedule(&self) -> Cont<()> {
        Cont::new(|| async {
            YieldNow::new().await;
            Ok(())
        })
    }

    /// Continuation resolving after `duration`, or failing with a
    /// cancellation error if the core is disposed first.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> Cont<()> {
        let core = self.clone();
        Cont::new(move || Sleep::after(core.clone(), duration))
    }

    // =====================================================================
    // Readiness
    // =====================================================================

    /// Future resolving once `fd` is readable.
    #[must_use]
    pub fn readable(&self, fd: RawFd) -> Readiness {
        Readiness::new(self.clone(), fd, Interest::Readable)
    }

    /// Future resolving once `fd` is writable.
    #[must_use]
    pub fn writable(&self, fd: RawFd) -> Readiness {
        Readiness::new(self.clone(), fd, Interest::Writable)
    }

    /// Stops watching `fd`, waking anything parked on it.
    pub fn deregister(&self, fd: RawFd) {
        self.inner.reactor.deregister(fd);
    }

    // =====================================================================
    // Driving
    // =====================================================================

    /// Runs the loop until the core is disposed.
    pub fn run(&self) -> Result<()> {
        let _guard = self.enter();
        tracing::debug!(depth = context::depth(), "core loop started");
        while !self.is_disposed() {
            self.tick()?;
        }
        tracing::debug!(ticks = self.ticks(), "core loop finished");
        Ok(())
    }

    /// Runs a single tick with this core entered.
    pub fn run_once(&self) -> Result<()> {
        let _guard = self.enter();
        self.tick()
    }

    /// Runs `future` to completion on this core, then disposes it.
    ///
    /// Fails with a cancellation error if the core is disposed before the
    /// future completes.
    pub fn block_on<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let slot = Rc::new(RefCell::new(None));
        let out = Rc::clone(&slot);
        let core = self.clone();
        self.spawn(async move {
            let value = future.await;
            *out.borrow_mut() = Some(value);
            core.dispose();
        });
        self.run()?;
        let value = slot.borrow_mut().take();
        value.ok_or_else(|| Error::cancelled("core disposed before the future completed"))
    }

    /// Disposes the core. Idempotent.
    ///
    /// Deferred callbacks receive a cancellation failure. Every task woken by
    /// that failure, directly or through a result it awaits, is polled once
    /// more; other ready work and tasks are dropped without running.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        tracing::debug!(
            tasks = self.task_count(),
            timers = self.timer_count(),
            "disposing core"
        );
        // A failed notify is harmless: the loop checks `disposed` each tick.
        let _ = self.inner.reactor.wake();

        // Wakes recorded before disposal belong to work that is dropped.
        self.inner.wakers.drain_woken();
        let ids = self.inner.timers.borrow_mut().drain();
        let mut callbacks = std::mem::take(&mut *self.inner.callbacks.borrow_mut());
        for id in ids {
            if let Some(callback) = callbacks.remove(&id) {
                callback(Err(Error::cancelled("core disposed")));
            }
        }

        let mut polled = HashSet::new();
        loop {
            let woken: Vec<TaskId> = self
                .inner
                .wakers
                .drain_woken()
                .into_iter()
                .filter(|id| polled.insert(*id))
                .collect();
            if woken.is_empty() {
                break;
            }
            for id in woken {
                self.poll_task(id);
            }
        }
        if !polled.is_empty() {
            tracing::trace!(tasks = polled.len(), "cancelled tasks polled");
        }

        let ready = std::mem::take(&mut *self.inner.ready.borrow_mut());
        let tasks = self.inner.tasks.borrow_mut().take_all();
        drop(ready);
        drop(tasks);
    }

    fn tick(&self) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }
        self.collect_woken();
        let batch = std::mem::take(&mut *self.inner.ready.borrow_mut());
        tracing::trace!(tick = self.ticks(), batch = batch.len(), "tick");
        for runnable in batch {
            if self.is_disposed() {
                return Ok(());
            }
            match runnable {
                Runnable::Poll(id) => self.poll_task(id),
                Runnable::Call(callback) => callback(),
            }
        }
        if self.is_disposed() {
            return Ok(());
        }

        self.collect_woken();
        let timeout = if self.inner.ready.borrow().is_empty() {
            self.inner
                .timers
                .borrow_mut()
                .peek_deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
        } else {
            Some(Duration::ZERO)
        };

        self.inner.wakers.set_parked(true);
        let timeout = if self.inner.wakers.has_woken() {
            Some(Duration::ZERO)
        } else {
            timeout
        };
        let polled = self.inner.reactor.poll(timeout);
        self.inner.wakers.set_parked(false);
        polled?;

        self.expire_timers(Instant::now());
        self.inner.ticks.set(self.ticks() + 1);
        Ok(())
    }

    fn collect_woken(&self) {
        let woken = self.inner.wakers.drain_woken();
        if woken.is_empty() {
            return;
        }
        let mut ready = self.inner.ready.borrow_mut();
        ready.extend(woken.into_iter().map(Runnable::Poll));
    }

    fn expire_timers(&self, now: Instant) {
        let expired = self.inner.timers.borrow_mut().pop_expired(now);
        for id in expired {
            let callback = self.inner.callbacks.borrow_mut().remove(&id);
            if let Some(callback) = callback {
                self.inner
                    .ready
                    .borrow_mut()
                    .push_back(Runnable::Call(Box::new(move || callback(Ok(())))));
            }
        }
    }

    fn poll_task(&self, id: TaskId) {
        let checked_out = self.inner.tasks.borrow_mut().checkout(id);
        let Some(mut future) = checked_out else {
            return;
        };
        let waker = self.inner.wakers.waker_for(id);
        let mut cx = Context::from_waker(&waker);
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                self.inner.tasks.borrow_mut().remove(id);
                tracing::trace!(task = %id, "task finished");
                drop(future);
            }
            Poll::Pending if self.is_disposed() => drop(future),
            Poll::Pending => self.inner.tasks.borrow_mut().checkin(id, future),
        }
    }
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("disposed", &self.is_disposed())
            .field("ticks", &self.ticks())
            .field("ready", &self.inner.ready.borrow().len())
            .field("tasks", &self.task_count())
            .field("timers", &self.timer_count())
            .finish()
    }
}

/// Future resolving when a descriptor is ready for an [`Interest`].
///
/// Fails with a cancellation error if the core is disposed while waiting.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Readiness {
    core: Core,
    fd: RawFd,
    interest: Interest,
    ready: Option<Rc<Cell<bool>>>,
}

impl Readiness {
    fn new(core: Core, fd: RawFd, interest: Interest) -> Self {
        Self {
            core,
            fd,
            interest,
            ready: None,
        }
    }
}

impl Future for Readiness {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.ready.as_ref().is_some_and(|ready| ready.get()) {
            return Poll::Ready(Ok(()));
        }
        if this.core.is_disposed() {
            return Poll::Ready(Err(Error::cancelled("core disposed")));
        }
        let ready = Rc::new(Cell::new(false));
        this.core.inner.reactor.register(
            this.fd,
            this.interest,
            cx.waker().clone(),
            Rc::clone(&ready),
        )?;
        this.ready = Some(ready);
        Poll::Pending
    }
}
