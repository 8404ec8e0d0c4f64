//! Stream lifecycle states.
//!
//! ```text
//!   NotInited ──► Initing ──► Idle ◄──► Read ◄──► ReadWrite
//!       ▲            │          ▲                     ▲
//!       └────────────┘          └───────► Write ◄─────┘
//!
//!   every state ──► Disposed ──► Disposed
//! ```
//!
//! `Read` and `Write` are flags over `Idle`: one read and one write may be
//! in flight at the same time, never two of the same kind.

use crate::error::{Error, Result};
use crate::state_machine::{FlagScope, FlagState, StateGraph, StateMachine, TransitionScope};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Lifecycle state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Created, not yet initialized.
    NotInited,
    /// Initialization in progress.
    Initing,
    /// Initialized, no operation in flight.
    Idle,
    /// A read is in flight.
    Read,
    /// A write is in flight.
    Write,
    /// A read and a write are in flight.
    ReadWrite,
    /// Terminal.
    Disposed,
}

/// Operation flag of a [`StreamState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamFlag {
    /// Read in flight.
    Read,
    /// Write in flight.
    Write,
}

impl StreamState {
    /// All states.
    pub const ALL: [Self; 7] = [
        Self::NotInited,
        Self::Initing,
        Self::Idle,
        Self::Read,
        Self::Write,
        Self::ReadWrite,
        Self::Disposed,
    ];

    /// Bit pattern of the state: `Idle` is `0b100`, `Read` and `Write` add
    /// `0b001` and `0b010` to it.
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::NotInited => 0,
            Self::Idle => 0b100,
            Self::Read => 0b101,
            Self::Write => 0b110,
            Self::ReadWrite => 0b111,
            Self::Initing => 0b1000,
            Self::Disposed => 0b1_0000,
        }
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NotInited => "not-inited",
            Self::Initing => "initing",
            Self::Idle => "idle",
            Self::Read => "read",
            Self::Write => "write",
            Self::ReadWrite => "read-write",
            Self::Disposed => "disposed",
        }
    }

    /// Allowed successors.
    #[must_use]
    pub const fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::NotInited => &[Self::Initing, Self::Disposed],
            Self::Initing => &[Self::NotInited, Self::Idle, Self::Disposed],
            Self::Idle => &[Self::Read, Self::Write, Self::Disposed],
            Self::Read => &[Self::Idle, Self::ReadWrite, Self::Disposed],
            Self::Write => &[Self::Idle, Self::ReadWrite, Self::Disposed],
            Self::ReadWrite => &[Self::Read, Self::Write, Self::Disposed],
            Self::Disposed => &[Self::Disposed],
        }
    }

    /// The shared compiled graph for stream states.
    #[must_use]
    pub fn graph() -> Arc<StateGraph<Self>> {
        static GRAPH: OnceLock<Arc<StateGraph<StreamState>>> = OnceLock::new();
        Arc::clone(GRAPH.get_or_init(|| {
            Arc::new(StateGraph::from_table(
                Self::ALL.map(|state| (state, state.allowed_transitions().iter().copied())),
                Self::ALL.map(|state| (state, state.name())),
            ))
        }))
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FlagState for StreamState {
    type Flag = StreamFlag;

    fn is_disposed(self) -> bool {
        self == Self::Disposed
    }

    fn has_flag(self, flag: StreamFlag) -> bool {
        let bit = match flag {
            StreamFlag::Read => 0b001,
            StreamFlag::Write => 0b010,
        };
        matches!(self, Self::Read | Self::Write | Self::ReadWrite) && self.bits() & bit != 0
    }

    fn with_flag(self, flag: StreamFlag) -> Self {
        match (self, flag) {
            (Self::Idle, StreamFlag::Read) => Self::Read,
            (Self::Idle, StreamFlag::Write) => Self::Write,
            (Self::Read, StreamFlag::Write) | (Self::Write, StreamFlag::Read) => Self::ReadWrite,
            (other, _) => other,
        }
    }

    fn without_flag(self, flag: StreamFlag) -> Self {
        match (self, flag) {
            (Self::Read, StreamFlag::Read) | (Self::Write, StreamFlag::Write) => Self::Idle,
            (Self::ReadWrite, StreamFlag::Read) => Self::Write,
            (Self::ReadWrite, StreamFlag::Write) => Self::Read,
            (other, _) => other,
        }
    }
}

/// State machine shared by stream implementations.
#[derive(Debug)]
pub struct StreamCore {
    machine: StateMachine<StreamState>,
}

impl Default for StreamCore {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamCore {
    /// A stream core in the not-inited state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            machine: StateMachine::with_state(StreamState::graph(), StreamState::NotInited),
        }
    }

    /// A stream core taken through initialization at once, for streams
    /// with no setup of their own.
    #[must_use]
    pub fn opened() -> Self {
        let core = Self::new();
        if let Err(err) = core.init_now() {
            tracing::error!(error = %err, "stream init transition rejected");
        }
        core
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.machine.state()
    }

    /// The underlying machine.
    #[must_use]
    pub fn machine(&self) -> &StateMachine<StreamState> {
        &self.machine
    }

    /// Returns true once disposed.
    #[must_use]
    pub fn disposed(&self) -> bool {
        self.state() == StreamState::Disposed
    }

    /// Fails with a disposed error once disposed.
    pub fn ensure_open(&self) -> Result<()> {
        if self.disposed() {
            return Err(Error::disposed("stream"));
        }
        Ok(())
    }

    /// Marks a read in flight until the scope is dropped.
    pub fn reading(&self) -> Result<FlagScope<'_, StreamState>> {
        FlagScope::enter(&self.machine, StreamFlag::Read)
    }

    /// Marks a write in flight until the scope is dropped.
    pub fn writing(&self) -> Result<FlagScope<'_, StreamState>> {
        FlagScope::enter(&self.machine, StreamFlag::Write)
    }

    /// Enters initialization: idle on completion, back to not-inited if the
    /// scope is dropped first.
    pub fn initing(&self) -> Result<TransitionScope<'_, StreamState>> {
        TransitionScope::enter(
            &self.machine,
            StreamState::Initing,
            StreamState::Idle,
            StreamState::NotInited,
        )
    }

    /// Initializes in one step.
    pub fn init_now(&self) -> Result<()> {
        TransitionScope::immediate(&self.machine, StreamState::Initing, StreamState::Idle)
    }

    /// Moves to disposed. Returns true on the first call only.
    pub fn dispose(&self) -> bool {
        match self.machine.transition(StreamState::Disposed) {
            Ok(previous) => previous != StreamState::Disposed,
            Err(err) => {
                tracing::error!(error = %err, "stream dispose transition rejected");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    fn open_core() -> StreamCore {
        let core = StreamCore::new();
        core.init_now().expect("init");
        core
    }

    #[test]
    fn table_compiles() {
        init_test("table_compiles");
        let graph = StateGraph::compile(
            StreamState::ALL.map(|s| (s, s.allowed_transitions().iter().copied())),
            StreamState::ALL.map(|s| (s, s.name())),
        );
        assert!(graph.is_ok());
        assert_eq!(StreamState::graph().len(), 7);
        crate::test_complete!("table_compiles");
    }

    #[test]
    fn read_and_write_combine() {
        init_test("read_and_write_combine");
        let core = open_core();
        let reading = core.reading().expect("read");
        assert_eq!(core.state(), StreamState::Read);
        {
            let _writing = core.writing().expect("write");
            assert_eq!(core.state(), StreamState::ReadWrite);
            assert_eq!(core.state().bits(), 0b111);
        }
        assert_eq!(core.state(), StreamState::Read);
        drop(reading);
        assert_eq!(core.state(), StreamState::Idle);
        crate::test_complete!("read_and_write_combine");
    }

    #[test]
    fn second_read_rejected() {
        init_test("second_read_rejected");
        let core = open_core();
        let _reading = core.reading().expect("read");
        let err = core.reading().expect_err("second read");
        crate::assert_with_log!(
            err.is_invalid_transition(),
            "invalid transition",
            true,
            err.is_invalid_transition()
        );
        crate::test_complete!("second_read_rejected");
    }

    #[test]
    fn read_to_write_edge_rejected() {
        init_test("read_to_write_edge_rejected");
        let core = open_core();
        core.machine().transition(StreamState::Read).expect("idle -> read");
        let err = core
            .machine()
            .transition(StreamState::Write)
            .expect_err("read -> write");
        assert!(err.is_invalid_transition());
        assert_eq!(
            err.message(),
            Some("invalid state transition: read -> write")
        );
        crate::test_complete!("read_to_write_edge_rejected");
    }

    #[test]
    fn dispose_from_any_state() {
        init_test("dispose_from_any_state");
        for state in StreamState::ALL {
            assert!(StreamState::graph().can_transition(state, StreamState::Disposed));
        }
        let core = open_core();
        {
            let _reading = core.reading().expect("read");
            assert!(core.dispose());
            assert!(!core.dispose());
        }
        assert!(core.disposed());
        assert!(core.reading().expect_err("disposed").is_disposed());
        crate::test_complete!("dispose_from_any_state");
    }

    #[test]
    fn failed_init_returns_to_not_inited() {
        init_test("failed_init_returns_to_not_inited");
        let core = StreamCore::new();
        {
            let _initing = core.initing().expect("initing");
            assert_eq!(core.state(), StreamState::Initing);
        }
        assert_eq!(core.state(), StreamState::NotInited);
        core.initing().expect("initing").complete().expect("complete");
        assert_eq!(core.state(), StreamState::Idle);
        crate::test_complete!("failed_init_returns_to_not_inited");
    }

    #[test]
    fn opened_core_goes_through_init() {
        init_test("opened_core_goes_through_init");
        let core = StreamCore::opened();
        assert_eq!(core.state(), StreamState::Idle);
        // not-inited -> initing -> idle
        crate::assert_with_log!(
            core.machine().transitions() == 2,
            "transitions",
            2,
            core.machine().transitions()
        );
        crate::test_complete!("opened_core_goes_through_init");
    }

    #[test]
    fn unknown_names() {
        init_test("unknown_names");
        assert_eq!(StreamState::ReadWrite.to_string(), "read-write");
        assert_eq!(StreamState::NotInited.name(), "not-inited");
        crate::test_complete!("unknown_names");
    }
}
