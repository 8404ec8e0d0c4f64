//! Application entry point.
//!
//! ```text
//! app::run(main)
//!     -> Core::from builder (env overrides applied)
//!     -> enter core, spawn main
//!     -> loop until main settles
//!     -> dispose core, restore previous current core
//!     -> main's result
//! ```

use crate::error::Result;
use crate::runtime::{Core, CoreBuilder};
use std::future::Future;

/// Runs `main` on a fresh core configured from the environment and returns
/// its result.
///
/// The core is disposed as soon as `main` settles; anything still pending
/// on it is dropped.
///
/// ```
/// let greeting = pretzel::app::run(async {
///     pretzel::time::schedule().await;
///     Ok(String::from("hello"))
/// })
/// .expect("app failed");
/// assert_eq!(greeting, "hello");
/// ```
pub fn run<T, F>(main: F) -> Result<T>
where
    T: 'static,
    F: Future<Output = Result<T>> + 'static,
{
    run_with(CoreBuilder::from_env(), main)
}

/// [`run`] on a core built from `builder`.
pub fn run_with<T, F>(builder: CoreBuilder, main: F) -> Result<T>
where
    T: 'static,
    F: Future<Output = Result<T>> + 'static,
{
    let core = builder.build()?;
    let _guard = core.enter();
    tracing::debug!(config = ?core.config(), "app starting");
    let outcome = core.block_on(main)?;
    match &outcome {
        Ok(_) => tracing::debug!(ticks = core.ticks(), "app finished"),
        Err(err) => tracing::debug!(error = %err, ticks = core.ticks(), "app failed"),
    }
    outcome
}
