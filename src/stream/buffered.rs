//! Buffered stream with framed encodings.

use super::buffer::Buffer;
use super::framing::{self, Record, LEN_SIZE};
use super::state::StreamCore;
use super::Stream;
use crate::cont::Cont;
use crate::error::{Error, Result};
use crate::runtime::Core;
use crate::sync::Singleton;
use bytes::Bytes;
use regex::bytes::Regex;
use std::cell::RefCell;
use std::fmt;
use std::ops::Range;
use std::os::unix::io::RawFd;
use std::rc::{Rc, Weak};

struct Inner<S> {
    core: Core,
    base: S,
    state: StreamCore,
    buffer_size: usize,
    read_buffer: RefCell<Buffer>,
    write_buffer: RefCell<Buffer>,
    flusher: Singleton<()>,
}

impl<S: Stream + 'static> Inner<S> {
    async fn refill(&self) -> Result<usize> {
        let data = self.base.read(self.buffer_size).await?;
        let len = data.len();
        self.read_buffer.borrow_mut().enqueue(data);
        tracing::trace!(len, "read buffer refilled");
        Ok(len)
    }

    async fn flush_now(&self) -> Result<()> {
        let _writing = self.state.writing()?;
        loop {
            let block = {
                let mut pending = self.write_buffer.borrow_mut();
                if pending.is_empty() {
                    break;
                }
                pending.slice(Some(self.buffer_size), 0)
            };
            let written = self.base.write(block).await?;
            if written == 0 {
                return Err(Error::broken_pipe("base stream accepted no bytes"));
            }
            self.write_buffer.borrow_mut().discard(Some(written));
            tracing::trace!(written, "flushed slice");
        }
        self.base.flush().await
    }
}

/// Read and write buffering over another [`Stream`].
///
/// Reads pull `buffer_size` chunks from the base stream into a read
/// [`Buffer`]. Writes are queued in a write buffer:
///
/// | Queued after the write | Effect |
/// |------------------------|--------|
/// | below `buffer_size` | nothing |
/// | `buffer_size` or more | a flush starts in the background |
/// | `2 * buffer_size` or more | the write waits for a flush |
///
/// Concurrent flushes share one run. Disposing the buffered stream
/// disposes the base stream.
pub struct BufferedStream<S> {
    inner: Rc<Inner<S>>,
}

impl<S> Clone for BufferedStream<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: Stream + 'static> BufferedStream<S> {
    /// Wraps `base` with the core's configured buffer size.
    pub fn new(core: &Core, base: S) -> Self {
        Self::with_buffer_size(core, base, core.config().buffer_size)
    }

    /// Wraps `base` with an explicit buffer size. Zero selects the core's
    /// configured size.
    pub fn with_buffer_size(core: &Core, base: S, buffer_size: usize) -> Self {
        let buffer_size = if buffer_size == 0 {
            core.config().buffer_size
        } else {
            buffer_size
        };
        let inner = Rc::new_cyclic(|weak: &Weak<Inner<S>>| {
            let weak = weak.clone();
            let flush = Cont::new(move || {
                let weak = weak.clone();
                async move {
                    let inner = weak
                        .upgrade()
                        .ok_or_else(|| Error::disposed("buffered stream"))?;
                    inner.flush_now().await
                }
            });
            Inner {
                core: core.clone(),
                base,
                state: StreamCore::opened(),
                buffer_size,
                read_buffer: RefCell::new(Buffer::new()),
                write_buffer: RefCell::new(Buffer::new()),
                flusher: Singleton::new(core.clone(), flush),
            }
        });
        Self { inner }
    }

    /// Write threshold and base read size.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> super::StreamState {
        self.inner.state.state()
    }

    /// The wrapped stream.
    #[must_use]
    pub fn base(&self) -> &S {
        &self.inner.base
    }

    /// Bytes read from the base stream and not yet consumed.
    #[must_use]
    pub fn read_pending(&self) -> usize {
        self.inner.read_buffer.borrow().len()
    }

    /// Bytes queued for writing and not yet accepted by the base stream.
    #[must_use]
    pub fn write_pending(&self) -> usize {
        self.inner.write_buffer.borrow().len()
    }

    /// Returns true while a flush is running.
    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.inner.flusher.is_running()
    }

    /// Reads exactly `size` bytes.
    ///
    /// Fails with broken pipe if the base stream ends first; bytes already
    /// buffered stay buffered.
    pub async fn read_until_size(&self, size: usize) -> Result<Bytes> {
        if size == 0 {
            return Ok(Bytes::new());
        }
        let _reading = self.inner.state.reading()?;
        while self.read_pending() < size {
            self.inner.refill().await?;
        }
        Ok(self.inner.read_buffer.borrow_mut().dequeue(Some(size)))
    }

    /// Reads until the base stream ends.
    pub async fn read_until_eof(&self) -> Result<Bytes> {
        let _reading = self.inner.state.reading()?;
        loop {
            match self.inner.refill().await {
                Ok(_) => {}
                Err(err) if err.is_broken_pipe() => break,
                Err(err) => return Err(err),
            }
        }
        Ok(self.inner.read_buffer.borrow_mut().dequeue(None))
    }

    /// Reads up to and including the first occurrence of `sub`.
    pub async fn read_until_sub(&self, sub: &[u8]) -> Result<Bytes> {
        let _reading = self.inner.state.reading()?;
        if sub.is_empty() {
            return Ok(Bytes::new());
        }
        let mut offset = 0;
        loop {
            let found = {
                let mut buffer = self.inner.read_buffer.borrow_mut();
                find(&buffer.slice(None, offset), sub)
            };
            if let Some(position) = found {
                let end = offset + position + sub.len();
                return Ok(self.inner.read_buffer.borrow_mut().dequeue(Some(end)));
            }
            // Only a tail shorter than `sub` can start a match that the next
            // chunk completes.
            offset = self.read_pending().saturating_sub(sub.len() - 1);
            self.inner.refill().await?;
        }
    }

    /// Reads a line, terminator included.
    pub async fn read_line(&self) -> Result<Bytes> {
        self.read_until_sub(b"\n").await
    }

    /// Reads up to the end of the first match of `regex`.
    ///
    /// Returns the data and the match's range within it.
    pub async fn read_until_regex(&self, regex: &Regex) -> Result<(Bytes, Range<usize>)> {
        let _reading = self.inner.state.reading()?;
        loop {
            let found = {
                let mut buffer = self.inner.read_buffer.borrow_mut();
                regex.find(&buffer.slice(None, 0)).map(|m| m.range())
            };
            if let Some(range) = found {
                let data = self.inner.read_buffer.borrow_mut().dequeue(Some(range.end));
                return Ok((data, range));
            }
            self.inner.refill().await?;
        }
    }

    /// Queues `data` without checking the write thresholds. A flush must be
    /// requested separately.
    pub fn write_schedule(&self, data: Bytes) -> Result<usize> {
        self.inner.state.ensure_open()?;
        let len = data.len();
        self.inner.write_buffer.borrow_mut().enqueue(data);
        Ok(len)
    }

    /// Reads a `[u32 len][bytes]` blob.
    pub async fn read_bytes(&self) -> Result<Bytes> {
        let len = self.read_len().await?;
        self.read_until_size(len).await
    }

    /// Queues a `[u32 len][bytes]` blob.
    pub fn write_bytes(&self, data: Bytes) -> Result<()> {
        self.write_schedule(framing::encode_len(data.len())?)?;
        self.write_schedule(data)?;
        Ok(())
    }

    /// Reads a `[u32 total_len][records]` list.
    ///
    /// Fails with an invalid-frame error if `total_len` is not a multiple of
    /// the record width.
    pub async fn read_struct_list<R: Record>(&self) -> Result<Vec<R>> {
        let len = self.read_len().await?;
        let payload = self.read_until_size(len).await?;
        framing::decode_records(payload)
    }

    /// Queues a `[u32 total_len][records]` list.
    pub fn write_struct_list<R: Record>(&self, records: &[R]) -> Result<()> {
        self.write_schedule(framing::encode_len(records.len() * R::WIDTH)?)?;
        self.write_schedule(framing::encode_records(records))?;
        Ok(())
    }

    /// Reads a blob list: a `u32` size list followed by the blobs.
    pub async fn read_bytes_list(&self) -> Result<Vec<Bytes>> {
        let sizes: Vec<u32> = self.read_struct_list().await?;
        let mut blobs = Vec::with_capacity(sizes.len());
        for size in sizes {
            blobs.push(self.read_until_size(size as usize).await?);
        }
        Ok(blobs)
    }

    /// Queues a blob list.
    pub fn write_bytes_list(&self, blobs: &[Bytes]) -> Result<()> {
        let sizes = blobs
            .iter()
            .map(|blob| {
                u32::try_from(blob.len()).map_err(|_| {
                    Error::invalid_frame(format!("blob of {} bytes exceeds u32", blob.len()))
                })
            })
            .collect::<Result<Vec<u32>>>()?;
        self.write_struct_list(&sizes)?;
        for blob in blobs {
            self.write_schedule(blob.clone())?;
        }
        Ok(())
    }

    async fn read_len(&self) -> Result<usize> {
        let header = self.read_until_size(LEN_SIZE).await?;
        framing::decode_len(&header)
    }
}

impl<S: Stream + 'static> Stream for BufferedStream<S> {
    fn core(&self) -> &Core {
        &self.inner.core
    }

    fn fileno(&self) -> Option<RawFd> {
        self.inner.base.fileno()
    }

    async fn read(&self, size: usize) -> Result<Bytes> {
        if size == 0 {
            return Ok(Bytes::new());
        }
        let _reading = self.inner.state.reading()?;
        if self.read_pending() == 0 {
            self.inner.refill().await?;
        }
        Ok(self.inner.read_buffer.borrow_mut().dequeue(Some(size)))
    }

    async fn write(&self, data: Bytes) -> Result<usize> {
        let len = self.write_schedule(data)?;
        let pending = self.write_pending();
        if pending >= 2 * self.inner.buffer_size {
            self.flush().await?;
        } else if pending >= self.inner.buffer_size {
            drop(self.inner.flusher.call());
        }
        Ok(len)
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flusher.call().await
    }

    fn dispose(&self) {
        if self.inner.state.dispose() {
            tracing::debug!(
                read_pending = self.read_pending(),
                write_pending = self.write_pending(),
                "buffered stream disposed"
            );
            self.inner.base.dispose();
        }
    }

    fn disposed(&self) -> bool {
        self.inner.state.disposed()
    }
}

impl<S> fmt::Debug for BufferedStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedStream")
            .field("state", &self.inner.state.state())
            .field("buffer_size", &self.inner.buffer_size)
            .field("read_buffer", &self.inner.read_buffer.borrow())
            .field("write_buffer", &self.inner.write_buffer.borrow())
            .finish_non_exhaustive()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
