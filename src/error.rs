//! Error types for pretzel.
//!
//! Every fallible operation in the runtime returns [`Result<T>`], carrying an
//! [`Error`] tagged with an [`ErrorKind`]. The kinds mirror the failure
//! classes the runtime distinguishes:
//!
//! - **BrokenPipe**: end-of-stream or unrecoverable write failure. The single
//!   terminal condition every stream reports; only `read_until_eof` and
//!   `copy_to` treat it as a successful end.
//! - **Cancelled**: a pending `sleep`/timeout whose [`Core`](crate::runtime::Core)
//!   was disposed first, or a timeout that elapsed.
//! - **InvalidTransition** / **Disposed**: state-machine contract violations.
//!   Fatal programming errors, never retried.
//! - **InvalidFrame**: malformed framed data that can be detected locally.
//! - **Config**: invalid runtime configuration.
//! - **Io**: any other OS-level failure, with the `std::io::Error` as source.
//!
//! Nothing in the runtime retries; retry policy belongs to callers.

use core::fmt;
use std::io;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// End of stream or unrecoverable write failure.
    BrokenPipe,
    /// Operation was cancelled (disposed core or elapsed timeout).
    Cancelled,
    /// State change not allowed by the compiled transition graph.
    InvalidTransition,
    /// Operation attempted on a disposed resource.
    Disposed,
    /// Framed data violates its encoding.
    InvalidFrame,
    /// Invalid configuration value.
    Config,
    /// Other I/O failure.
    Io,
    /// Internal runtime error (bug or misuse).
    Internal,
}

impl ErrorKind {
    /// Returns true for contract violations that must never be retried.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition | Self::Disposed | Self::Internal | Self::Config
        )
    }
}

/// The main error type for pretzel operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns true if this is the broken-pipe condition.
    #[must_use]
    pub const fn is_broken_pipe(&self) -> bool {
        matches!(self.kind, ErrorKind::BrokenPipe)
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Returns true if this is a disposed-resource error.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        matches!(self.kind, ErrorKind::Disposed)
    }

    /// Returns true if this is an invalid state transition.
    #[must_use]
    pub const fn is_invalid_transition(&self) -> bool {
        matches!(self.kind, ErrorKind::InvalidTransition)
    }

    /// Creates a broken-pipe error.
    #[must_use]
    pub fn broken_pipe(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::BrokenPipe).with_message(detail)
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled).with_message(reason)
    }

    /// Creates an invalid-transition error naming both states.
    #[must_use]
    pub fn invalid_transition(from: &str, to: &str) -> Self {
        Self::new(ErrorKind::InvalidTransition)
            .with_message(format!("invalid state transition: {from} -> {to}"))
    }

    /// Creates a disposed-resource error.
    #[must_use]
    pub fn disposed(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::Disposed).with_message(format!("{} is disposed", what.into()))
    }

    /// Creates a framing error.
    #[must_use]
    pub fn invalid_frame(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidFrame).with_message(detail)
    }

    /// Creates an internal error (runtime bug or misuse).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero => {
                let msg = err.to_string();
                Self::broken_pipe(msg).with_source(err)
            }
            _ => Self::new(ErrorKind::Io).with_source(err),
        }
    }
}

/// A specialized Result type for pretzel operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn display_includes_kind_and_message() {
        let err = Error::broken_pipe("stream closed");
        assert_eq!(err.to_string(), "BrokenPipe: stream closed");
        assert!(err.is_broken_pipe());
        assert!(!err.kind().is_fatal());
    }

    #[test]
    fn io_errors_map_to_broken_pipe() {
        for kind in [
            io::ErrorKind::BrokenPipe,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::UnexpectedEof,
        ] {
            let err: Error = io::Error::from(kind).into();
            assert!(err.is_broken_pipe(), "{kind:?} should be broken pipe");
            assert!(err.source().is_some());
        }

        let err: Error = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn transition_errors_are_fatal() {
        let err = Error::invalid_transition("read", "write");
        assert!(err.is_invalid_transition());
        assert!(err.kind().is_fatal());
        assert_eq!(
            err.message(),
            Some("invalid state transition: read -> write")
        );
        assert!(Error::disposed("stream").kind().is_fatal());
    }
}
