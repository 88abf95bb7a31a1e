//=========================================================================
// State Machine Errors
//=========================================================================

use std::fmt;

use thiserror::Error;

/// Hook that was running when a state reported a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateHook {
    Enter,
    Exit,
    Update,
    CheckTransitions,
}

impl fmt::Display for StateHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
            Self::Update => "update",
            Self::CheckTransitions => "check_transitions",
        };
        f.write_str(name)
    }
}

/// Errors reported by [`super::StateMachine`].
#[derive(Debug, Error)]
pub enum StateMachineError {
    /// The requested state type was never added to this machine. The
    /// machine is left unchanged.
    #[error("state {state} is not registered in this state machine")]
    NotRegistered { state: &'static str },

    /// A state hook returned an error.
    #[error("{hook} hook of state {state} failed")]
    HookFault {
        hook: StateHook,
        state: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl StateMachineError {
    /// Returns true for the non-fatal missing-state diagnostic.
    pub fn is_not_registered(&self) -> bool {
        matches!(self, Self::NotRegistered { .. })
    }
}
