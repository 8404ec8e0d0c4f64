//! Continuations and shared futures.
//!
//! - [`Cont`]: a deferred, re-runnable computation producing a `Result`
//! - [`Shared`]: a computation started at most once whose outcome is
//!   delivered to every attached resolver
//! - [`Receiver`]: a future for a value handed over by a callback
//!
//! Both `Cont` and `Shared` implement [`IntoFuture`](std::future::IntoFuture)
//! and can be awaited directly from a task on a [`Core`](crate::runtime::Core).

mod continuation;
mod shared;
mod slot;

pub use continuation::Cont;
pub use shared::Shared;
pub use slot::Receiver;
pub(crate) use slot::slot;
