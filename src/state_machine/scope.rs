//! Scope guards pairing an entry transition with an exit transition.
//!
//! Exit transitions run in `Drop`, so they happen on every exit path,
//! including early returns, `?` and a task being dropped mid-await. A failed
//! exit transition cannot be propagated from `Drop` and is logged instead.

use super::{MachineState, StateMachine};
use crate::error::{Error, Result};
use std::fmt;

/// States made of independent flags plus a terminal disposed state.
pub trait FlagState: MachineState {
    /// A single flag.
    type Flag: Copy + fmt::Debug;

    /// Returns true for the terminal disposed state.
    fn is_disposed(self) -> bool;

    /// Returns true if `flag` is set in this state.
    fn has_flag(self, flag: Self::Flag) -> bool;

    /// This state with `flag` set.
    fn with_flag(self, flag: Self::Flag) -> Self;

    /// This state with `flag` cleared.
    fn without_flag(self, flag: Self::Flag) -> Self;
}

/// Holds a flag set for as long as the guard lives.
///
/// Entering fails with a disposed error once the machine is disposed and
/// with an invalid-transition error if the flag is already set. Dropping the
/// guard clears the flag again; if the machine was disposed meanwhile it
/// stays disposed.
#[must_use = "the flag is cleared as soon as the scope is dropped"]
pub struct FlagScope<'a, S: FlagState> {
    machine: &'a StateMachine<S>,
    flag: S::Flag,
}

impl<'a, S: FlagState> FlagScope<'a, S> {
    /// Sets `flag` on `machine`.
    pub fn enter(machine: &'a StateMachine<S>, flag: S::Flag) -> Result<Self> {
        let current = machine.state();
        if current.is_disposed() {
            return Err(Error::disposed(machine.name()));
        }
        if current.has_flag(flag) {
            return Err(Error::invalid_transition(
                machine.name(),
                machine.name(),
            ));
        }
        machine.transition(current.with_flag(flag))?;
        Ok(Self { machine, flag })
    }
}

impl<S: FlagState> Drop for FlagScope<'_, S> {
    fn drop(&mut self) {
        let target = self.machine.state().without_flag(self.flag);
        if let Err(err) = self.machine.transition(target) {
            tracing::error!(flag = ?self.flag, error = %err, "failed to leave flag scope");
        }
    }
}

impl<S: FlagState> fmt::Debug for FlagScope<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagScope")
            .field("flag", &self.flag)
            .field("state", &self.machine.name())
            .finish()
    }
}

/// Moves to a busy state, then to a success or failure state on exit.
///
/// Call [`complete`](Self::complete) to take the success edge; dropping the
/// guard without completing takes the failure edge.
#[must_use = "dropping the scope immediately takes the failure transition"]
pub struct TransitionScope<'a, S: MachineState> {
    machine: &'a StateMachine<S>,
    success: S,
    failure: S,
    finished: bool,
}

impl<'a, S: MachineState> TransitionScope<'a, S> {
    /// Moves `machine` to `busy`.
    pub fn enter(machine: &'a StateMachine<S>, busy: S, success: S, failure: S) -> Result<Self> {
        machine.transition(busy)?;
        Ok(Self {
            machine,
            success,
            failure,
            finished: false,
        })
    }

    /// Moves `machine` to `busy` and straight on to `success`.
    pub fn immediate(machine: &'a StateMachine<S>, busy: S, success: S) -> Result<()> {
        machine.transition(busy)?;
        machine.transition(success)?;
        Ok(())
    }

    /// Takes the success edge.
    pub fn complete(mut self) -> Result<()> {
        self.finished = true;
        self.machine.transition(self.success).map(|_| ())
    }
}

impl<S: MachineState> Drop for TransitionScope<'_, S> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.machine.transition(self.failure) {
            tracing::error!(
                failure = self.machine.graph().name(self.failure),
                error = %err,
                "failed to leave transition scope"
            );
        }
    }
}

impl<S: MachineState> fmt::Debug for TransitionScope<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionScope")
            .field("state", &self.machine.name())
            .field("finished", &self.finished)
            .finish()
    }
}
