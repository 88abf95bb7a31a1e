//=========================================================================
// Aetheric Runtime: Library Root
//
// This crate defines the coordination primitives an application is built
// around.
//
// Responsibilities:
// - Expose the subsystems (`core`) for direct use
// - Provide the `RuntimeBuilder` / `Runtime` facade that wires them up
// - Leave host integration to the application
//
// Typical usage:
// ```no_run
// use aetheric_runtime::prelude::*;
// ```
//
//=========================================================================

//--- Public Modules ------------------------------------------------------
//
// `core` holds the event bus, state machine, scene dispatcher and the
// shared context. Each can be used on its own.
//
pub mod core;
pub mod prelude;

//--- Internal Modules ----------------------------------------------------
//
// `runtime` wires the subsystems together and pumps scene signals.
//
mod runtime;

//--- Public Exports ------------------------------------------------------

pub use runtime::{Runtime, RuntimeBuilder};
