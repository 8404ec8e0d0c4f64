//! Copying a stream into an async or synchronous sink.

use super::Stream;
use crate::error::{Error, Result};
use bytes::{Buf, Bytes};
use std::io::Write;

/// Destination of [`Stream::copy_to`].
#[allow(async_fn_in_trait)]
pub trait CopySink {
    /// Writes the whole chunk.
    async fn write_chunk(&mut self, data: Bytes) -> Result<()>;

    /// Flushes after the source is exhausted.
    async fn flush_sink(&mut self) -> Result<()>;
}

impl<S: Stream> CopySink for &S {
    async fn write_chunk(&mut self, mut data: Bytes) -> Result<()> {
        while !data.is_empty() {
            let written = self.write(data.clone()).await?;
            if written == 0 {
                return Err(Error::broken_pipe("destination accepted no bytes"));
            }
            data.advance(written.min(data.len()));
        }
        Ok(())
    }

    async fn flush_sink(&mut self) -> Result<()> {
        self.flush().await
    }
}

/// Adapts a blocking [`std::io::Write`] as a copy destination.
///
/// Writes complete synchronously; copying never suspends on the sink side.
#[derive(Debug)]
pub struct SyncSink<W> {
    inner: W,
}

impl<W: Write> SyncSink<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Borrows the wrapped writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: Write> CopySink for SyncSink<W> {
    async fn write_chunk(&mut self, data: Bytes) -> Result<()> {
        self.inner.write_all(&data)?;
        Ok(())
    }

    async fn flush_sink(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

impl<W: Write> CopySink for &mut SyncSink<W> {
    async fn write_chunk(&mut self, data: Bytes) -> Result<()> {
        (**self).write_chunk(data).await
    }

    async fn flush_sink(&mut self) -> Result<()> {
        (**self).flush_sink().await
    }
}

/// Reads `source` in `bufsize` pieces into `dest` until the source reports
/// a broken pipe, then flushes `dest`. Returns the number of bytes copied.
pub(crate) async fn copy_stream<S, D>(source: &S, mut dest: D, bufsize: usize) -> Result<u64>
where
    S: Stream + ?Sized,
    D: CopySink,
{
    let mut total = 0_u64;
    loop {
        let data = match source.read(bufsize).await {
            Ok(data) => data,
            Err(err) if err.is_broken_pipe() => break,
            Err(err) => return Err(err),
        };
        total += data.len() as u64;
        dest.write_chunk(data).await?;
    }
    dest.flush_sink().await?;
    tracing::trace!(total, "copy finished");
    Ok(total)
}
