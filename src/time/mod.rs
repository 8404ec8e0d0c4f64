//! Time primitives: sleep, yield and timeout.
//!
//! - [`Sleep`]: completes after a deadline
//! - [`YieldNow`]: resumes on the next tick
//! - [`TimeoutFuture`]: adds a deadline to any future
//!
//! The free functions use the current core ([`Core::current`]); the
//! [`Core::sleep`] and [`Core::schedule`] methods return
//! [`Cont`](crate::cont::Cont) values bound to a specific core.
//!
//! # Cancel Safety
//!
//! Dropping a `Sleep` forgets its deferred callback. A sleep pending when
//! its core is disposed fails with a cancellation error.
//!
//! ```ignore
//! use pretzel::time::{sleep, timeout};
//! use std::time::Duration;
//!
//! sleep(Duration::from_millis(100)).await?;
//! let value = timeout(Duration::from_secs(5), work()).await?;
//! ```
//!
//! [`Core::current`]: crate::runtime::Core::current
//! [`Core::sleep`]: crate::runtime::Core::sleep
//! [`Core::schedule`]: crate::runtime::Core::schedule

mod sleep;
mod timeout_future;

pub use sleep::{schedule, sleep, sleep_until, Sleep, YieldNow};
pub use timeout_future::{timeout, TimeoutFuture};
