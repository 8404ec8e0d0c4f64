//! Compiled finite state machines.
//!
//! A [`StateGraph`] maps every state to the set of states it may move to,
//! plus a display name per state. Compilation validates that every target
//! state is itself a key of the graph, so a compiled graph is closed.
//!
//! A [`StateMachine`] holds one current state over a shared graph and
//! validates each change against it. The scope guards in [`scope`] pair a
//! transition on entry with a transition on exit.
//!
//! ```ignore
//! let graph = StateGraph::compile(
//!     [(Light::Off, vec![Light::On]), (Light::On, vec![Light::Off])],
//!     [(Light::Off, "off"), (Light::On, "on")],
//! )?;
//! let machine = StateMachine::new(Arc::new(graph), Light::Off)?;
//! machine.transition(Light::On)?;
//! ```

pub mod scope;

pub use scope::{FlagScope, FlagState, TransitionScope};

use crate::error::{Error, ErrorKind, Result};
use smallvec::SmallVec;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Name reported for states missing from the graph's name table.
pub const INVALID_STATE_NAME: &str = "invalid";

/// Bounds required of a state type.
pub trait MachineState: Copy + Eq + Hash + fmt::Debug + 'static {}

impl<S: Copy + Eq + Hash + fmt::Debug + 'static> MachineState for S {}

/// Immutable, validated transition graph.
#[derive(Clone)]
pub struct StateGraph<S> {
    edges: HashMap<S, SmallVec<[S; 4]>>,
    names: HashMap<S, &'static str>,
}

impl<S: MachineState> StateGraph<S> {
    /// Compiles `edges` and `names` into a graph.
    ///
    /// Fails with a configuration error if any target state is not a key.
    pub fn compile<E, T, N>(edges: E, names: N) -> Result<Self>
    where
        E: IntoIterator<Item = (S, T)>,
        T: IntoIterator<Item = S>,
        N: IntoIterator<Item = (S, &'static str)>,
    {
        let graph = Self::from_table(edges, names);
        for (source, targets) in &graph.edges {
            if let Some(target) = targets.iter().find(|t| !graph.edges.contains_key(*t)) {
                return Err(Error::new(ErrorKind::Config).with_message(format!(
                    "state graph target {target:?} (from {source:?}) is not a state"
                )));
            }
        }
        Ok(graph)
    }

    /// Builds a graph from a table known to be closed.
    pub(crate) fn from_table<E, T, N>(edges: E, names: N) -> Self
    where
        E: IntoIterator<Item = (S, T)>,
        T: IntoIterator<Item = S>,
        N: IntoIterator<Item = (S, &'static str)>,
    {
        Self {
            edges: edges
                .into_iter()
                .map(|(source, targets)| (source, targets.into_iter().collect()))
                .collect(),
            names: names.into_iter().collect(),
        }
    }

    /// Returns true if `from -> to` is an edge.
    #[must_use]
    pub fn can_transition(&self, from: S, to: S) -> bool {
        self.targets(from).contains(&to)
    }

    /// Successors of `state`; empty for unknown states.
    #[must_use]
    pub fn targets(&self, state: S) -> &[S] {
        self.edges.get(&state).map_or(&[][..], |targets| targets.as_slice())
    }

    /// Returns true if `state` is a key of the graph.
    #[must_use]
    pub fn contains(&self, state: S) -> bool {
        self.edges.contains_key(&state)
    }

    /// Display name of `state`, or [`INVALID_STATE_NAME`].
    #[must_use]
    pub fn name(&self, state: S) -> &'static str {
        self.names.get(&state).copied().unwrap_or(INVALID_STATE_NAME)
    }

    /// Number of states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns true for a graph with no states.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

impl<S: MachineState> fmt::Debug for StateGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (state, targets) in &self.edges {
            map.entry(&self.name(*state), &targets.iter().map(|t| self.name(*t)).collect::<Vec<_>>());
        }
        map.finish()
    }
}

/// A current state validated against a [`StateGraph`].
pub struct StateMachine<S> {
    graph: Arc<StateGraph<S>>,
    state: Cell<S>,
    transitions: Cell<u64>,
}

impl<S: MachineState> StateMachine<S> {
    /// Creates a machine in `initial`, which must be a state of `graph`.
    pub fn new(graph: Arc<StateGraph<S>>, initial: S) -> Result<Self> {
        if !graph.contains(initial) {
            return Err(Error::new(ErrorKind::Config)
                .with_message(format!("initial state {initial:?} is not a state")));
        }
        Ok(Self {
            graph,
            state: Cell::new(initial),
            transitions: Cell::new(0),
        })
    }

    /// Creates a machine whose initial state is known to be in `graph`.
    pub(crate) fn with_state(graph: Arc<StateGraph<S>>, initial: S) -> Self {
        debug_assert!(graph.contains(initial));
        Self {
            graph,
            state: Cell::new(initial),
            transitions: Cell::new(0),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> S {
        self.state.get()
    }

    /// Name of the current state.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.graph.name(self.state())
    }

    /// Number of committed transitions.
    #[must_use]
    pub fn transitions(&self) -> u64 {
        self.transitions.get()
    }

    /// The graph this machine validates against.
    #[must_use]
    pub fn graph(&self) -> &StateGraph<S> {
        &self.graph
    }

    /// Returns true if moving to `target` is currently allowed.
    #[must_use]
    pub fn can_transition(&self, target: S) -> bool {
        self.graph.can_transition(self.state(), target)
    }

    /// Moves to `target`, returning the previous state.
    ///
    /// Fails with an invalid-transition error, leaving the state unchanged,
    /// if the edge does not exist.
    pub fn transition(&self, target: S) -> Result<S> {
        let current = self.state();
        if !self.graph.can_transition(current, target) {
            return Err(Error::invalid_transition(
                self.graph.name(current),
                self.graph.name(target),
            ));
        }
        tracing::trace!(
            from = self.graph.name(current),
            to = self.graph.name(target),
            "state transition"
        );
        self.state.set(target);
        self.transitions.set(self.transitions.get() + 1);
        Ok(current)
    }
}

impl<S: MachineState> fmt::Debug for StateMachine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("state", &self.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Door {
        Open,
        Closed,
        Locked,
    }

    fn door_graph() -> Arc<StateGraph<Door>> {
        Arc::new(
            StateGraph::compile(
                [
                    (Door::Open, vec![Door::Closed]),
                    (Door::Closed, vec![Door::Open, Door::Locked]),
                    (Door::Locked, vec![Door::Closed]),
                ],
                [(Door::Open, "open"), (Door::Closed, "closed")],
            )
            .expect("valid graph"),
        )
    }

    fn no_names() -> Vec<(Door, &'static str)> {
        Vec::new()
    }

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn compile_rejects_unknown_target() {
        init_test("compile_rejects_unknown_target");
        let err = StateGraph::compile([(Door::Open, vec![Door::Closed])], no_names())
            .expect_err("closed is not a key");
        crate::assert_with_log!(
            err.kind() == ErrorKind::Config,
            "config error",
            ErrorKind::Config,
            err.kind()
        );
        crate::test_complete!("compile_rejects_unknown_target");
    }

    #[test]
    fn transition_returns_previous() {
        init_test("transition_returns_previous");
        let machine = StateMachine::new(door_graph(), Door::Open).expect("machine");
        assert_eq!(machine.transition(Door::Closed).expect("open -> closed"), Door::Open);
        assert_eq!(machine.transition(Door::Locked).expect("closed -> locked"), Door::Closed);
        assert_eq!(machine.state(), Door::Locked);
        assert_eq!(machine.transitions(), 2);
        crate::test_complete!("transition_returns_previous");
    }

    #[test]
    fn invalid_transition_keeps_state() {
        init_test("invalid_transition_keeps_state");
        let machine = StateMachine::new(door_graph(), Door::Open).expect("machine");
        let err = machine.transition(Door::Locked).expect_err("open -> locked");
        assert!(err.is_invalid_transition());
        assert_eq!(machine.state(), Door::Open);
        assert_eq!(machine.transitions(), 0);
        crate::test_complete!("invalid_transition_keeps_state");
    }

    #[test]
    fn unnamed_state_reports_invalid() {
        init_test("unnamed_state_reports_invalid");
        let graph = door_graph();
        assert_eq!(graph.name(Door::Open), "open");
        assert_eq!(graph.name(Door::Locked), INVALID_STATE_NAME);
        crate::test_complete!("unnamed_state_reports_invalid");
    }

    #[test]
    fn initial_state_must_exist() {
        init_test("initial_state_must_exist");
        let graph = Arc::new(
            StateGraph::compile([(Door::Open, Vec::<Door>::new())], no_names())
                .expect("single state"),
        );
        assert!(StateMachine::new(graph, Door::Closed).is_err());
        crate::test_complete!("initial_state_must_exist");
    }
}
