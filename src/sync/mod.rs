//! Single-threaded notification and coalescing primitives.
//!
//! - [`Event`]: one-shot subscriber lists fired together
//! - [`Singleton`]: at most one in-flight instance of an action, shared by
//!   every concurrent caller
//!
//! Both are `!Send` and meant to be used from tasks of one
//! [`Core`](crate::runtime::Core).

mod event;
mod singleton;

pub use event::Event;
pub use singleton::Singleton;
