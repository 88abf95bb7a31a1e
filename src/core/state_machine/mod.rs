//=========================================================================
// State Machine
//=========================================================================
//
// Generic finite state machine keyed by state type.
//
// Components:
// - `state`: State trait, StateId key and AsAny upcast helper
// - `machine`: StateMachine and the Transitions request handle
// - `error`: NotRegistered diagnostic and hook faults
//
//=========================================================================

//=== Module Declarations =================================================

mod error;
mod machine;
mod state;

//=== Public API ==========================================================

pub use error::{StateHook, StateMachineError};
pub use machine::{StateMachine, Transitions};
pub use state::{AsAny, HookResult, State, StateId};
