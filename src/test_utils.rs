//! Test utilities for pretzel.
//!
//! This module provides shared helpers for tests:
//! - Consistent tracing-based logging initialization (unit tests)
//! - Phase/section macros for readable test output
//! - An async test runner with a timeout
//! - Deterministic in-memory streams
//!
//! # Example
//! ```
//! use pretzel::test_utils::run_async_test;
//!
//! let answer = run_async_test(async { 6 * 7 }).expect("test timed out");
//! assert_eq!(answer, 42);
//! ```

use crate::error::{Error, Result};
use crate::runtime::env_config;
use crate::runtime::Core;
use crate::stream::{Buffer, Stream, StreamCore, StreamState};
use crate::sync::Event;
use crate::time::TimeoutFuture;
use bytes::{Bytes, BytesMut};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

#[cfg(test)]
static INIT_LOGGING: std::sync::Once = std::sync::Once::new();
#[cfg(test)]
static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once. `RUST_LOG` narrows
/// the output when set.
#[cfg(test)]
pub(crate) fn init_test_logging() {
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

/// Acquire the global environment lock for tests that mutate env vars.
#[cfg(test)]
pub(crate) fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Runs `test` on a fresh core, failing with a cancellation error once the
/// `PRETZEL_TEST_TIMEOUT` timeout (3 s by default) elapses.
///
/// The previously current core, if any, is current again afterwards.
pub fn run_async_test<F>(test: F) -> Result<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    run_async_test_with_timeout(env_config::test_timeout()?, test)
}

/// [`run_async_test`] with an explicit timeout.
pub fn run_async_test_with_timeout<F>(timeout: Duration, test: F) -> Result<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    let core = Core::new()?;
    tracing::debug!(
        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        "async test started"
    );
    let outcome = core.block_on(TimeoutFuture::new(core.clone(), timeout, test))?;
    if let Err(err) = &outcome {
        tracing::debug!(error = %err, "async test did not complete");
    }
    outcome
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// Write side shared by the in-memory streams.
#[derive(Debug, Default)]
struct WriteLog {
    data: RefCell<BytesMut>,
    sizes: RefCell<Vec<usize>>,
    flushes: Cell<usize>,
    limit: Cell<Option<usize>>,
}

impl WriteLog {
    fn accept(&self, chunk: &Bytes) -> usize {
        let accepted = self
            .limit
            .get()
            .map_or(chunk.len(), |limit| limit.min(chunk.len()));
        self.data.borrow_mut().extend_from_slice(&chunk[..accepted]);
        self.sizes.borrow_mut().push(accepted);
        accepted
    }

    async fn write(&self, core: &Core, state: &StreamCore, data: Bytes) -> Result<usize> {
        let _writing = state.writing()?;
        core.schedule().await?;
        state.ensure_open()?;
        Ok(self.accept(&data))
    }
}

struct ScriptedInner {
    core: Core,
    chunks: RefCell<VecDeque<Bytes>>,
    log: WriteLog,
    state: StreamCore,
}

/// Stream that replays a fixed list of read chunks, then reports broken
/// pipe.
///
/// Reads complete without suspending; a read smaller than the next chunk
/// leaves the remainder for the following read. Writes suspend for one
/// tick and are recorded.
#[derive(Clone)]
pub struct ScriptedStream {
    inner: Rc<ScriptedInner>,
}

impl ScriptedStream {
    /// A stream that will read `chunks` in order.
    pub fn new<I>(core: &Core, chunks: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        Self {
            inner: Rc::new(ScriptedInner {
                core: core.clone(),
                chunks: RefCell::new(chunks.into_iter().map(Into::into).collect()),
                log: WriteLog::default(),
                state: StreamCore::opened(),
            }),
        }
    }

    /// Caps how many bytes each write accepts.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.inner.log.limit.set(limit);
    }

    /// Everything written so far.
    #[must_use]
    pub fn written(&self) -> Bytes {
        Bytes::copy_from_slice(&self.inner.log.data.borrow())
    }

    /// Accepted byte count of every write, in order.
    #[must_use]
    pub fn write_sizes(&self) -> Vec<usize> {
        self.inner.log.sizes.borrow().clone()
    }

    /// Number of flushes.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.inner.log.flushes.get()
    }

    /// Chunks not yet read.
    #[must_use]
    pub fn remaining_chunks(&self) -> usize {
        self.inner.chunks.borrow().len()
    }
}

impl Stream for ScriptedStream {
    fn core(&self) -> &Core {
        &self.inner.core
    }

    async fn read(&self, size: usize) -> Result<Bytes> {
        let _reading = self.inner.state.reading()?;
        if size == 0 {
            return Ok(Bytes::new());
        }
        let mut chunks = self.inner.chunks.borrow_mut();
        let mut chunk = chunks
            .pop_front()
            .ok_or_else(|| Error::broken_pipe("script exhausted"))?;
        if chunk.len() > size {
            chunks.push_front(chunk.split_off(size));
        }
        Ok(chunk)
    }

    async fn write(&self, data: Bytes) -> Result<usize> {
        self.inner
            .log
            .write(&self.inner.core, &self.inner.state, data)
            .await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.state.ensure_open()?;
        self.inner.log.flushes.set(self.inner.log.flushes.get() + 1);
        Ok(())
    }

    fn dispose(&self) {
        self.inner.state.dispose();
    }

    fn disposed(&self) -> bool {
        self.inner.state.disposed()
    }
}

impl fmt::Debug for ScriptedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedStream")
            .field("state", &self.inner.state.state())
            .field("remaining_chunks", &self.remaining_chunks())
            .field("log", &self.inner.log)
            .finish_non_exhaustive()
    }
}

struct MemoryInner {
    core: Core,
    incoming: RefCell<Buffer>,
    eof: Cell<bool>,
    readable: Event<()>,
    log: WriteLog,
    state: StreamCore,
}

/// Stream whose read side is fed by the test while it runs.
///
/// A read suspends until data is [`feed`](Self::feed)ed or the stream is
/// [`close`](Self::close)d; after close, buffered data is still returned
/// before broken pipe is reported.
#[derive(Clone)]
pub struct MemoryStream {
    inner: Rc<MemoryInner>,
}

impl MemoryStream {
    /// An empty, open stream.
    #[must_use]
    pub fn new(core: &Core) -> Self {
        Self {
            inner: Rc::new(MemoryInner {
                core: core.clone(),
                incoming: RefCell::new(Buffer::new()),
                eof: Cell::new(false),
                readable: Event::new(),
                log: WriteLog::default(),
                state: StreamCore::opened(),
            }),
        }
    }

    /// Makes `data` available to readers.
    pub fn feed(&self, data: impl Into<Bytes>) {
        self.inner.incoming.borrow_mut().enqueue(data.into());
        self.inner.readable.fire(());
    }

    /// Ends the read side.
    pub fn close(&self) {
        self.inner.eof.set(true);
        self.inner.readable.fire(());
    }

    /// Caps how many bytes each write accepts.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.inner.log.limit.set(limit);
    }

    /// Everything written so far.
    #[must_use]
    pub fn written(&self) -> Bytes {
        Bytes::copy_from_slice(&self.inner.log.data.borrow())
    }

    /// Accepted byte count of every write, in order.
    #[must_use]
    pub fn write_sizes(&self) -> Vec<usize> {
        self.inner.log.sizes.borrow().clone()
    }

    /// Number of flushes.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.inner.log.flushes.get()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.inner.state.state()
    }
}

impl Stream for MemoryStream {
    fn core(&self) -> &Core {
        &self.inner.core
    }

    async fn read(&self, size: usize) -> Result<Bytes> {
        let _reading = self.inner.state.reading()?;
        if size == 0 {
            return Ok(Bytes::new());
        }
        loop {
            self.inner.state.ensure_open()?;
            {
                let mut incoming = self.inner.incoming.borrow_mut();
                if !incoming.is_empty() {
                    return Ok(incoming.dequeue(Some(size)));
                }
            }
            if self.inner.eof.get() {
                return Err(Error::broken_pipe("memory stream closed"));
            }
            self.inner.readable.next().await;
        }
    }

    async fn write(&self, data: Bytes) -> Result<usize> {
        self.inner
            .log
            .write(&self.inner.core, &self.inner.state, data)
            .await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.state.ensure_open()?;
        self.inner.log.flushes.set(self.inner.log.flushes.get() + 1);
        Ok(())
    }

    fn dispose(&self) {
        if self.inner.state.dispose() {
            self.inner.readable.fire(());
        }
    }

    fn disposed(&self) -> bool {
        self.inner.state.disposed()
    }
}

impl fmt::Debug for MemoryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStream")
            .field("state", &self.inner.state.state())
            .field("incoming", &self.inner.incoming.borrow())
            .field("eof", &self.inner.eof.get())
            .field("log", &self.inner.log)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn async_test_returns_output() {
        init_test("async_test_returns_output");
        let value = run_async_test(async { 6 * 7 }).expect("completes");
        assert_eq!(value, 42);
        crate::test_complete!("async_test_returns_output");
    }

    #[test]
    fn async_test_times_out() {
        init_test("async_test_times_out");
        let err = run_async_test_with_timeout(
            Duration::from_millis(20),
            std::future::pending::<()>(),
        )
        .expect_err("timeout");
        crate::assert_with_log!(err.is_cancelled(), "cancelled", true, err.kind());
        crate::test_complete!("async_test_times_out");
    }

    #[test]
    fn async_test_restores_current_core() {
        init_test("async_test_restores_current_core");
        let outer = Core::new().expect("core");
        let _guard = outer.enter();
        let inner_was_fresh = run_async_test(async {
            Core::current().is_some_and(|core| !core.is_disposed())
        })
        .expect("completes");
        assert!(inner_was_fresh);
        assert!(Core::current().is_some_and(|core| core.same(&outer)));
        crate::test_complete!("async_test_restores_current_core");
    }

    #[test]
    fn scripted_stream_splits_chunks() {
        init_test("scripted_stream_splits_chunks");
        let reads = run_async_test(async {
            let core = Core::current().expect("current core");
            let stream = ScriptedStream::new(&core, ["abcdef"]);
            let first = stream.read(4).await?;
            let second = stream.read(4).await?;
            let end = stream.read(4).await;
            Ok::<_, Error>((first, second, end.is_err()))
        })
        .expect("completes")
        .expect("reads");
        assert_eq!(&reads.0[..], b"abcd");
        assert_eq!(&reads.1[..], b"ef");
        assert!(reads.2);
        crate::test_complete!("scripted_stream_splits_chunks");
    }

    #[test]
    fn memory_stream_wakes_reader() {
        init_test("memory_stream_wakes_reader");
        let received = run_async_test(async {
            let core = Core::current().expect("current core");
            let stream = MemoryStream::new(&core);
            let feeder = stream.clone();
            core.call_soon(move || feeder.feed("late"));
            let data = stream.read(16).await?;
            stream.close();
            let closed = stream.read(16).await.expect_err("closed");
            Ok::<_, Error>((data, closed.is_broken_pipe()))
        })
        .expect("completes")
        .expect("reads");
        assert_eq!(&received.0[..], b"late");
        assert!(received.1);
        crate::test_complete!("memory_stream_wakes_reader");
    }

    #[test]
    fn write_limit_caps_accepted_bytes() {
        init_test("write_limit_caps_accepted_bytes");
        let core = Core::new().expect("core");
        let stream = MemoryStream::new(&core);
        stream.set_write_limit(Some(3));
        let writer = stream.clone();
        let accepted = core
            .block_on(async move { writer.write(Bytes::from_static(b"hello")).await })
            .expect("block_on")
            .expect("write");
        assert_eq!(accepted, 3);
        assert_eq!(&stream.written()[..], b"hel");
        assert_eq!(stream.write_sizes(), vec![3]);
        crate::test_complete!("write_limit_caps_accepted_bytes");
    }
}
