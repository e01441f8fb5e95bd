// src/jit/state.rs

//! Run-time registration state machine.

use std::fmt;

use serde::Serialize;

/// States of one JIT invocation, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JitState {
    Compiling,
    Serializing,
    Uploading,
    Registering,
    AwaitingVisibility,
    Launching,
    Done,
    Failed,
}

impl JitState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JitState::Done | JitState::Failed)
    }

    /// The single forward successor on the success path.
    fn successor(self) -> Option<JitState> {
        match self {
            JitState::Compiling => Some(JitState::Serializing),
            JitState::Serializing => Some(JitState::Uploading),
            JitState::Uploading => Some(JitState::Registering),
            JitState::Registering => Some(JitState::AwaitingVisibility),
            JitState::AwaitingVisibility => Some(JitState::Launching),
            JitState::Launching => Some(JitState::Done),
            JitState::Done | JitState::Failed => None,
        }
    }

    pub fn can_transition_to(self, next: JitState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == JitState::Failed
            || self.successor() == Some(next)
            || (self == JitState::AwaitingVisibility && next == JitState::AwaitingVisibility)
    }
}

impl fmt::Display for JitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JitState::Compiling => "compiling",
            JitState::Serializing => "serializing",
            JitState::Uploading => "uploading",
            JitState::Registering => "registering",
            JitState::AwaitingVisibility => "awaiting_visibility",
            JitState::Launching => "launching",
            JitState::Done => "done",
            JitState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid JIT transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JitState,
    pub to: JitState,
}

/// One-directional state machine with its transition history.
///
/// Starts in [`JitState::Compiling`]. Only forward moves are accepted, plus
/// the `AwaitingVisibility` self-loop and a move to `Failed` from any
/// non-terminal state.
#[derive(Debug, Clone)]
pub struct JitStateMachine {
    current: JitState,
    history: Vec<JitState>,
}

impl Default for JitStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl JitStateMachine {
    pub fn new() -> Self {
        Self {
            current: JitState::Compiling,
            history: vec![JitState::Compiling],
        }
    }

    pub fn current(&self) -> JitState {
        self.current
    }

    /// Every state entered so far, including the initial one.
    pub fn history(&self) -> &[JitState] {
        &self.history
    }

    pub fn advance(&mut self, next: JitState) -> Result<(), InvalidTransition> {
        if !self.current.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        tracing::debug!(from = %self.current, to = %next, "jit transition");
        self.current = next;
        self.history.push(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_with_poll_loop() {
        let mut sm = JitStateMachine::new();
        for next in [
            JitState::Serializing,
            JitState::Uploading,
            JitState::Registering,
            JitState::AwaitingVisibility,
            JitState::AwaitingVisibility,
            JitState::Launching,
            JitState::Done,
        ] {
            sm.advance(next).unwrap();
        }
        assert_eq!(sm.current(), JitState::Done);
        assert_eq!(sm.history().len(), 8);
    }

    #[test]
    fn no_backwards_or_skipping() {
        let mut sm = JitStateMachine::new();
        sm.advance(JitState::Serializing).unwrap();
        assert!(sm.advance(JitState::Compiling).is_err());
        assert!(sm.advance(JitState::Registering).is_err());
        assert!(sm.advance(JitState::Serializing).is_err());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut sm = JitStateMachine::new();
        sm.advance(JitState::Failed).unwrap();
        assert!(sm.advance(JitState::Failed).is_err());
        assert!(sm.advance(JitState::Serializing).is_err());
    }
}
