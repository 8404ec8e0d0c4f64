//! Pretzel: a single-threaded cooperative async I/O runtime.
//!
//! # Overview
//!
//! Pretzel runs every computation on one thread, driven by a [`Core`]. Work
//! suspends only at explicit points (yielding to the scheduler, sleeping,
//! waiting for descriptor readiness, awaiting a shared result or event) and
//! is resumed in FIFO order. On top of the scheduler sit a re-runnable
//! computation type, a memoizing shared future, a validated state-machine
//! engine and a buffered byte-stream layer with length-prefixed framing.
//!
//! # Core Guarantees
//!
//! - **FIFO scheduling**: work queued during a tick runs on the next tick, in
//!   queue order
//! - **Exactly-once delivery**: a [`Shared`] runs its computation at most once
//!   and delivers one outcome to every resolver, in attachment order
//! - **Legal transitions only**: state machines reject edges that are not in
//!   their compiled graph
//! - **One read and one write**: a stream never runs two reads (or two
//!   writes) at the same time
//! - **Byte-exact framing**: big-endian `u32` length prefixes, records and
//!   blob lists
//!
//! # Module Structure
//!
//! - [`runtime`]: The [`Core`] scheduler, its configuration and reactor
//! - [`cont`]: [`Cont`] computations and [`Shared`] futures
//! - [`sync`]: [`Event`] and [`Singleton`] coordination
//! - [`time`]: Sleep, yield and timeout primitives
//! - [`state_machine`]: Compiled state graphs and transition scopes
//! - [`stream`]: The [`Stream`](stream::Stream) trait, [`Buffer`](stream::Buffer),
//!   [`BufferedStream`](stream::BufferedStream) and descriptor streams
//! - [`app`]: Application entry point
//! - [`test_utils`]: Test harness and in-memory streams
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use pretzel::stream::{BufferedStream, FdStream, Stream};
//!
//! let line = pretzel::app::run(async {
//!     let core = pretzel::Core::current().expect("inside app::run");
//!     let (a, b) = FdStream::pair(&core)?;
//!     let reader = BufferedStream::new(&core, b);
//!     a.write(Bytes::from_static(b"hello\nworld")).await?;
//!     reader.read_line().await
//! })
//! .expect("app failed");
//! assert_eq!(&line[..], b"hello\n");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::future_not_send)]

pub mod app;
pub mod cont;
pub mod error;
pub mod runtime;
pub mod state_machine;
pub mod stream;
pub mod sync;
pub mod test_utils;
pub mod time;

// Re-exports for convenient access to core types
pub use cont::{Cont, Shared};
pub use error::{Error, ErrorKind, Result};
pub use runtime::{Core, CoreBuilder, CoreConfig};
pub use state_machine::{StateGraph, StateMachine};
pub use sync::{Event, Singleton};
