#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use bytes::Bytes;
use pretzel::stream::Stream;
use pretzel::{Core, Error, Result};
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::future::Future;
use std::sync::Once;

pub use pretzel::{assert_with_log, test_complete, test_phase, test_section};

static INIT_LOGGING: Once = Once::new();

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED_5EED;

const PROPTEST_SEED_ENV: &str = "PRETZEL_PROPTEST_SEED";

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    // Honor existing PROPTEST_RNG_SEED, otherwise apply our own.
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    if let Ok(value) = std::env::var(PROPTEST_SEED_ENV) {
        return value.parse::<u64>().ok();
    }
    // If CI is set and no explicit seed is provided, use a fixed seed.
    std::env::var("CI").is_ok().then_some(DEFAULT_PROPTEST_SEED)
}

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trace"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Logging plus a phase banner.
pub fn init_test(test_name: &str) {
    init_test_logging();
    test_phase!(test_name);
}

/// Runs `test` under the async test harness, failing the test on timeout.
pub fn run<F>(test: F) -> F::Output
where
    F: Future + 'static,
    F::Output: 'static,
{
    pretzel::test_utils::run_async_test(test).expect("async test did not complete")
}

/// The core driving the current async test.
pub fn current_core() -> Core {
    Core::current().expect("no current core")
}

/// Reads everything `stream` produces until broken pipe.
pub async fn drain<S: Stream>(stream: &S) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        match stream.read(4096).await {
            Ok(chunk) => out.extend_from_slice(&chunk),
            Err(err) if err.is_broken_pipe() => return Ok(out),
            Err(err) => return Err(err),
        }
    }
}
