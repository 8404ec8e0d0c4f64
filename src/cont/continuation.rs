//! Re-runnable asynchronous computations.

use super::shared::Shared;
use crate::error::{Error, Result};
use crate::runtime::{Core, LocalBoxFuture, TaskId};
use std::fmt;
use std::future::{Future, IntoFuture};
use std::rc::Rc;

/// A deferred computation producing a [`Result`].
///
/// A `Cont` does nothing until it is started. Every start runs the
/// computation again from scratch, so the same value may be awaited, run or
/// turned into a [`Shared`] any number of times.
///
/// ```ignore
/// let twice = Cont::ok(21).map(|n| n * 2);
/// assert_eq!(core.block_on(twice.into_future())??, 42);
/// ```
pub struct Cont<T> {
    factory: Rc<dyn Fn() -> LocalBoxFuture<Result<T>>>,
}

impl<T> Clone for Cont<T> {
    fn clone(&self) -> Self {
        Self {
            factory: Rc::clone(&self.factory),
        }
    }
}

impl<T: 'static> Cont<T> {
    /// Wraps a future factory.
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = Result<T>> + 'static,
    {
        Self {
            factory: Rc::new(move || -> LocalBoxFuture<Result<T>> { Box::pin(factory()) }),
        }
    }

    /// Continuation yielding a stored result on every start.
    pub fn from_result(result: Result<T>) -> Self
    where
        T: Clone,
    {
        Self::new(move || std::future::ready(result.clone()))
    }

    /// Continuation that succeeds with `value`.
    pub fn ok(value: T) -> Self
    where
        T: Clone,
    {
        Self::from_result(Ok(value))
    }

    /// Continuation that fails with `error`.
    pub fn err(error: Error) -> Self
    where
        T: Clone,
    {
        Self::from_result(Err(error))
    }

    /// Starts a fresh run of the computation.
    pub fn start(&self) -> LocalBoxFuture<Result<T>> {
        (self.factory)()
    }

    /// Transforms a successful value.
    pub fn map<U, F>(self, f: F) -> Cont<U>
    where
        U: 'static,
        F: Fn(T) -> U + 'static,
    {
        let f = Rc::new(f);
        Cont::new(move || {
            let run = self.start();
            let f = Rc::clone(&f);
            async move { run.await.map(|value| f(value)) }
        })
    }

    /// Transforms the whole result, success or failure.
    pub fn map_result<U, F>(self, f: F) -> Cont<U>
    where
        U: 'static,
        F: Fn(Result<T>) -> Result<U> + 'static,
    {
        let f = Rc::new(f);
        Cont::new(move || {
            let run = self.start();
            let f = Rc::clone(&f);
            async move { f(run.await) }
        })
    }

    /// Chains a dependent continuation. Failures short-circuit.
    pub fn and_then<U, F>(self, f: F) -> Cont<U>
    where
        U: 'static,
        F: Fn(T) -> Cont<U> + 'static,
    {
        let f = Rc::new(f);
        Cont::new(move || {
            let run = self.start();
            let f = Rc::clone(&f);
            async move {
                let value = run.await?;
                f(value).start().await
            }
        })
    }

    /// Runs the computation as a task on `core`, handing the outcome to
    /// `resolver`.
    pub fn run(&self, core: &Core, resolver: impl FnOnce(Result<T>) + 'static) -> TaskId {
        let run = self.start();
        core.spawn(async move { resolver(run.await) })
    }

    /// Wraps the computation in a shared, memoized [`Shared`] handle.
    ///
    /// The computation starts when the first resolver is attached.
    pub fn future(&self, core: &Core) -> Shared<T>
    where
        T: Clone,
    {
        Shared::new(core.clone(), self.clone())
    }
}

impl<T: 'static> IntoFuture for Cont<T> {
    type Output = Result<T>;
    type IntoFuture = LocalBoxFuture<Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        self.start()
    }
}

impl<T> fmt::Debug for Cont<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cont").finish_non_exhaustive()
    }
}
