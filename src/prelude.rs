//=========================================================================
// Prelude
//=========================================================================
//
// Convenience module that re-exports commonly used types and traits.
//
// Usage:
//   use aetheric_runtime::prelude::*;
//
//=========================================================================

//=== Public API ==========================================================

// Runtime facade
pub use crate::runtime::{Runtime, RuntimeBuilder};

// Shared context and fault handling
pub use crate::core::globals::GlobalContext;
pub use crate::core::FaultPolicy;

// Event bus
pub use crate::core::event_bus::{Event, EventBus, EventBusError, Handler, HandlerResult};

// State machine
pub use crate::core::state_machine::{
    HookResult, State, StateId, StateMachine, StateMachineError, Transitions,
};

// Scene lifecycle
pub use crate::core::scene::{
    AsyncSceneObserver, DiscoveryQuery, DiscoveryScope, DispatchError, ObserverDiscovery,
    ObserverPlacement, ObserverResult, ObserverSet, SceneDispatcher, SceneKey, SceneObserver,
    ScenePhase, SceneSignal, SignalSender, TickControl,
};
