//! Scheduler core and its supporting machinery.
//!
//! - [`config`]: Core configuration types
//! - [`builder`]: Core builder
//! - [`env_config`]: Environment and config file overrides
//! - [`core`]: The cooperative scheduler
//! - [`task`]: Task storage
//! - [`waker`]: Waker implementation with deduplication
//! - [`timer`]: Timer heap for deferred callbacks
//! - [`reactor`]: Descriptor readiness
//!
//! # Core Builder
//!
//! The core is configured with a move-based builder. Each method consumes
//! `self` and returns the updated builder.
//!
//! ```ignore
//! use pretzel::runtime::CoreBuilder;
//!
//! let core = CoreBuilder::from_env().buffer_size(4096).build()?;
//! let answer = core.block_on(async { 42 })?;
//! ```
//!
//! # Nesting
//!
//! Running a core makes it the thread's current core ([`Core::current`]).
//! A core may be driven from inside a task of another core; the outer core is
//! current again once the inner loop returns.

pub mod builder;
pub mod config;
mod context;
#[allow(clippy::module_inception)]
pub mod core;
pub mod env_config;
pub mod reactor;
pub mod task;
pub mod timer;
pub mod waker;

pub use builder::CoreBuilder;
pub use config::CoreConfig;
pub use context::EnterGuard;
pub use core::{Core, Readiness};
pub use env_config::ConfigError;
pub use reactor::Interest;
pub use task::{LocalBoxFuture, TaskId};
pub use timer::TimerId;
