//! Stream over a non-blocking file descriptor.

use super::state::StreamCore;
use super::Stream;
use crate::error::{Error, Result};
use crate::runtime::Core;
use bytes::{Bytes, BytesMut};
use std::cell::RefCell;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::rc::Rc;

struct FdInner<T> {
    core: Core,
    fd: RawFd,
    io: RefCell<Option<T>>,
    state: StreamCore,
}

impl<T> Drop for FdInner<T> {
    fn drop(&mut self) {
        if self.io.get_mut().is_some() {
            self.core.deregister(self.fd);
        }
    }
}

/// A [`Stream`] over a non-blocking descriptor, driven by the core's
/// readiness reactor.
///
/// `io` must already be in non-blocking mode; [`FdStream::unix`],
/// [`FdStream::tcp`] and [`FdStream::pair`] take care of that. End of
/// stream, a reset peer and a zero-length write are reported as broken
/// pipe.
pub struct FdStream<T> {
    inner: Rc<FdInner<T>>,
}

impl<T> Clone for FdStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Read + Write + AsRawFd + 'static> FdStream<T> {
    /// Wraps a non-blocking descriptor.
    pub fn new(core: &Core, io: T) -> Result<Self> {
        let fd = io.as_raw_fd();
        let state = StreamCore::new();
        state.init_now()?;
        tracing::debug!(fd, "fd stream opened");
        Ok(Self {
            inner: Rc::new(FdInner {
                core: core.clone(),
                fd,
                io: RefCell::new(Some(io)),
                state,
            }),
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> super::StreamState {
        self.inner.state.state()
    }

    /// Runs a non-blocking operation on the descriptor.
    ///
    /// The borrow ends before the caller awaits readiness.
    fn with_io<R>(&self, op: impl FnOnce(&mut T) -> io::Result<R>) -> Result<io::Result<R>> {
        let mut io = self.inner.io.borrow_mut();
        let io = io.as_mut().ok_or_else(|| Error::disposed("fd stream"))?;
        Ok(op(io))
    }
}

impl FdStream<UnixStream> {
    /// Wraps a Unix socket, switching it to non-blocking mode.
    pub fn unix(core: &Core, stream: UnixStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        Self::new(core, stream)
    }

    /// A connected pair of Unix sockets.
    pub fn pair(core: &Core) -> Result<(Self, Self)> {
        let (a, b) = UnixStream::pair()?;
        Ok((Self::unix(core, a)?, Self::unix(core, b)?))
    }
}

impl FdStream<TcpStream> {
    /// Wraps a connected TCP socket, switching it to non-blocking mode.
    pub fn tcp(core: &Core, stream: TcpStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Self::new(core, stream)
    }
}

impl<T: Read + Write + AsRawFd + 'static> Stream for FdStream<T> {
    fn core(&self) -> &Core {
        &self.inner.core
    }

    fn fileno(&self) -> Option<RawFd> {
        (!self.disposed()).then_some(self.inner.fd)
    }

    async fn read(&self, size: usize) -> Result<Bytes> {
        let _reading = self.inner.state.reading()?;
        if size == 0 {
            return Ok(Bytes::new());
        }
        let mut buf = BytesMut::zeroed(size);
        loop {
            match self.with_io(|io| io.read(&mut buf))? {
                Ok(0) => return Err(Error::broken_pipe("end of stream")),
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(buf.freeze());
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.inner.core.readable(self.inner.fd).await?;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn write(&self, data: Bytes) -> Result<usize> {
        let _writing = self.inner.state.writing()?;
        if data.is_empty() {
            return Ok(0);
        }
        loop {
            match self.with_io(|io| io.write(&data))? {
                Ok(0) => return Err(Error::broken_pipe("descriptor accepted no bytes")),
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.inner.core.writable(self.inner.fd).await?;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn flush(&self) -> Result<()> {
        self.inner.state.ensure_open()?;
        self.with_io(Write::flush)??;
        Ok(())
    }

    fn dispose(&self) {
        if !self.inner.state.dispose() {
            return;
        }
        self.inner.core.deregister(self.inner.fd);
        let io = self.inner.io.borrow_mut().take();
        drop(io);
        tracing::debug!(fd = self.inner.fd, "fd stream disposed");
    }

    fn disposed(&self) -> bool {
        self.inner.state.disposed()
    }
}

impl<T> fmt::Debug for FdStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FdStream")
            .field("fd", &self.inner.fd)
            .field("state", &self.inner.state.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn pair_exchanges_bytes() {
        init_test("pair_exchanges_bytes");
        let core = Core::new().expect("core");
        let (a, b) = FdStream::pair(&core).expect("pair");
        let reader = b.clone();
        let received = core
            .block_on(async move {
                let pending = reader.read(64);
                a.write(Bytes::from_static(b"ping")).await?;
                pending.await
            })
            .expect("block_on")
            .expect("read");
        crate::assert_with_log!(&received[..] == b"ping", "received", "ping", received);
        assert_eq!(b.state(), super::super::StreamState::Idle);
        crate::test_complete!("pair_exchanges_bytes");
    }

    #[test]
    fn read_waits_for_readiness() {
        init_test("read_waits_for_readiness");
        let core = Core::new().expect("core");
        let (a, b) = FdStream::pair(&core).expect("pair");
        let writer_core = core.clone();
        core.spawn(async move {
            let _ = writer_core.sleep(std::time::Duration::from_millis(10)).await;
            let _ = a.write(Bytes::from_static(b"late")).await;
        });
        let received = core
            .block_on(async move { b.read(16).await })
            .expect("block_on")
            .expect("read");
        assert_eq!(&received[..], b"late");
        crate::test_complete!("read_waits_for_readiness");
    }

    #[test]
    fn closed_peer_is_broken_pipe() {
        init_test("closed_peer_is_broken_pipe");
        let core = Core::new().expect("core");
        let (a, b) = FdStream::pair(&core).expect("pair");
        a.dispose();
        let err = core
            .block_on(async move { b.read(16).await })
            .expect("block_on")
            .expect_err("eof");
        crate::assert_with_log!(err.is_broken_pipe(), "broken pipe", true, err.kind());
        crate::test_complete!("closed_peer_is_broken_pipe");
    }

    #[test]
    fn dispose_is_idempotent() {
        init_test("dispose_is_idempotent");
        let core = Core::new().expect("core");
        let (a, _b) = FdStream::pair(&core).expect("pair");
        assert!(a.fileno().is_some());
        a.dispose();
        a.dispose();
        assert!(a.disposed());
        assert_eq!(a.fileno(), None);
        let err = core
            .block_on(async move { a.read(1).await })
            .expect("block_on")
            .expect_err("disposed");
        assert!(err.is_disposed());
        crate::test_complete!("dispose_is_idempotent");
    }
}
