//! Byte streams and buffered framing.
//!
//! # Core Traits
//!
//! - [`Stream`]: async byte stream driven by a [`Core`]
//! - [`CopySink`]: destination of [`Stream::copy_to`]
//!
//! # Types
//!
//! - [`StreamState`] / [`StreamCore`]: the stream lifecycle state machine
//! - [`Buffer`]: chunked FIFO byte buffer
//! - [`BufferedStream`]: read/write buffering and framed encodings over any
//!   stream
//! - [`FdStream`]: a stream over a non-blocking file descriptor
//! - [`SyncSink`]: adapts a blocking [`std::io::Write`] for `copy_to`
//!
//! # Concurrency
//!
//! A stream allows one read and one write in flight at the same time.
//! Starting a second read (or write) while one is pending fails with an
//! invalid-transition error; any operation on a disposed stream fails with
//! a disposed error. End of stream and write failures on closed peers are
//! reported as broken pipe.
//!
//! ```ignore
//! let (a, b) = FdStream::pair(&core)?;
//! let reader = BufferedStream::new(&core, b);
//! a.write(Bytes::from_static(b"hello\n")).await?;
//! assert_eq!(&reader.read_until_sub(b"\n").await?[..], b"hello\n");
//! ```

mod buffer;
mod buffered;
mod copy;
mod fd;
pub mod framing;
mod state;

pub use buffer::Buffer;
pub use buffered::BufferedStream;
pub use copy::{CopySink, SyncSink};
pub use fd::FdStream;
pub use framing::Record;
pub use state::{StreamCore, StreamFlag, StreamState};

use crate::error::Result;
use crate::runtime::Core;
use bytes::Bytes;
use std::os::unix::io::RawFd;

/// Asynchronous byte stream.
///
/// Handles are expected to be cheap to share so that one task can read
/// while another writes.
#[allow(async_fn_in_trait)]
pub trait Stream {
    /// The core this stream is driven by.
    fn core(&self) -> &Core;

    /// Underlying descriptor, if any.
    fn fileno(&self) -> Option<RawFd> {
        None
    }

    /// Reads between 1 and `size` bytes.
    ///
    /// Fails with broken pipe at end of stream.
    async fn read(&self, size: usize) -> Result<Bytes>;

    /// Writes `data`, returning how many bytes were accepted.
    async fn write(&self, data: Bytes) -> Result<usize>;

    /// Flushes buffered output. Concurrent flushes may be coalesced.
    async fn flush(&self) -> Result<()>;

    /// Disposes the stream. Idempotent.
    fn dispose(&self);

    /// Returns true once disposed.
    fn disposed(&self) -> bool;

    /// Flushes, then disposes whether or not the flush succeeded.
    async fn flush_and_dispose(&self) -> Result<()> {
        let flushed = self.flush().await;
        self.dispose();
        flushed
    }

    /// Copies this stream into `dest` until end of stream, then flushes
    /// `dest`. Returns the number of bytes copied.
    ///
    /// `bufsize` defaults to the core's configured buffer size.
    async fn copy_to<D: CopySink>(&self, dest: D, bufsize: Option<usize>) -> Result<u64>
    where
        Self: Sized,
    {
        let bufsize = bufsize.unwrap_or(self.core().config().buffer_size);
        copy::copy_stream(self, dest, bufsize).await
    }
}
