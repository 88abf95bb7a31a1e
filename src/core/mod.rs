//=========================================================================
// Core Systems
//
// Coordination primitives shared by the whole application.
//
// Subsystems:
// - event_bus:     type-keyed, ordered publish/subscribe
// - state_machine: generic finite state machine over a shared context
// - scene:         phased scene lifecycle dispatch to observers
// - globals:       process-scoped context owning the event bus
//
//=========================================================================

//=== Module Declarations =================================================

pub mod event_bus;
pub mod globals;
pub mod scene;
pub mod state_machine;

mod fault;

//=== Public API ==========================================================

pub use fault::FaultPolicy;
