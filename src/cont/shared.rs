//! Memoized, multi-consumer results.

use super::continuation::Cont;
use super::slot::{slot, Receiver};
use crate::error::{Error, Result};
use crate::runtime::{Core, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::IntoFuture;
use std::rc::Rc;

type Resolver<T> = Box<dyn FnOnce(Result<T>)>;

enum Stage<T> {
    Idle(Cont<T>),
    Running,
    Done(Result<T>),
}

struct SharedInner<T> {
    core: Core,
    stage: RefCell<Stage<T>>,
    resolvers: RefCell<Vec<Resolver<T>>>,
    draining: Cell<bool>,
}

impl<T: Clone + 'static> SharedInner<T> {
    fn complete(&self, result: Result<T>) {
        *self.stage.borrow_mut() = Stage::Done(result.clone());
        self.draining.set(true);
        loop {
            let batch = std::mem::take(&mut *self.resolvers.borrow_mut());
            if batch.is_empty() {
                break;
            }
            for resolver in batch {
                resolver(result.clone());
            }
        }
        self.draining.set(false);
    }
}

/// A computation started at most once whose result is delivered to every
/// attached resolver.
///
/// Resolvers are invoked exactly once each, in attachment order. Attaching
/// to a completed `Shared` invokes the resolver immediately.
pub struct Shared<T> {
    inner: Rc<SharedInner<T>>,
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Shared<T> {
    /// Wraps `cont`; nothing runs until the first resolver is attached.
    pub fn new(core: Core, cont: Cont<T>) -> Self {
        Self {
            inner: Rc::new(SharedInner {
                core,
                stage: RefCell::new(Stage::Idle(cont)),
                resolvers: RefCell::new(Vec::new()),
                draining: Cell::new(false),
            }),
        }
    }

    /// A `Shared` that is already completed with `result`.
    pub fn completed_with(core: Core, result: Result<T>) -> Self {
        Self {
            inner: Rc::new(SharedInner {
                core,
                stage: RefCell::new(Stage::Done(result)),
                resolvers: RefCell::new(Vec::new()),
                draining: Cell::new(false),
            }),
        }
    }

    /// Returns true once the computation has finished.
    #[must_use]
    pub fn completed(&self) -> bool {
        matches!(&*self.inner.stage.borrow(), Stage::Done(_))
    }

    /// Returns true once the computation has been started.
    #[must_use]
    pub fn started(&self) -> bool {
        !matches!(&*self.inner.stage.borrow(), Stage::Idle(_))
    }

    /// The outcome, if completed.
    #[must_use]
    pub fn result(&self) -> Option<Result<T>> {
        match &*self.inner.stage.borrow() {
            Stage::Done(result) => Some(result.clone()),
            _ => None,
        }
    }

    /// The outcome. Fails with an internal error if not yet completed.
    pub fn value(&self) -> Result<T> {
        self.result()
            .unwrap_or_else(|| Err(Error::internal("future is not completed")))
    }

    /// Attaches a resolver, starting the computation if needed.
    pub fn attach(&self, resolver: impl FnOnce(Result<T>) + 'static) {
        if !self.inner.draining.get() {
            if let Some(result) = self.result() {
                resolver(result);
                return;
            }
        }
        self.inner.resolvers.borrow_mut().push(Box::new(resolver));
        self.start();
    }

    /// Starts the computation without attaching a resolver.
    pub fn start(&self) {
        let cont = {
            let mut stage = self.inner.stage.borrow_mut();
            match std::mem::replace(&mut *stage, Stage::Running) {
                Stage::Idle(cont) => cont,
                other => {
                    *stage = other;
                    return;
                }
            }
        };
        let run = cont.start();
        let inner = Rc::clone(&self.inner);
        self.inner.core.spawn(async move {
            let result = run.await;
            inner.complete(result);
        });
    }

    /// Future resolving with the outcome.
    pub fn wait(&self) -> Receiver<Result<T>> {
        let (tx, rx) = slot();
        self.attach(move |result| tx.send(result));
        rx
    }
}

impl<T: Clone + 'static> IntoFuture for Shared<T> {
    type Output = Result<T>;
    type IntoFuture = LocalBoxFuture<Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl<T> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match &*self.inner.stage.borrow() {
            Stage::Idle(_) => "idle",
            Stage::Running => "running",
            Stage::Done(Ok(_)) => "done(ok)",
            Stage::Done(Err(_)) => "done(err)",
        };
        f.debug_struct("Shared")
            .field("stage", &stage)
            .field("resolvers", &self.inner.resolvers.borrow().len())
            .finish()
    }
}
