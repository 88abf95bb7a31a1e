//=========================================================================
// Fault Policy
//=========================================================================
//
// Caller-selected reaction to a failing handler or observer hook.
//
// Shared by the EventBus and the SceneDispatcher. The StateMachine does
// not consult it: state hooks own the transition protocol and always
// propagate.
//
//=========================================================================

/// How a dispatch pass reacts when one of its callbacks returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Returns the first error to the caller and skips every remaining
    /// callback of that pass.
    #[default]
    FailFast,

    /// Logs the error and keeps dispatching to the remaining callbacks.
    Isolate,
}

impl FaultPolicy {
    /// Returns true if a fault should abort the current pass.
    pub fn aborts(self) -> bool {
        matches!(self, Self::FailFast)
    }
}
