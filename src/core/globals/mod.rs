//=========================================================================
// Global Runtime State
//=========================================================================
//
// Process-scoped data shared by every subsystem.
//
// Architecture:
//   GlobalContext: EventBus (owned, torn down explicitly)
//
//=========================================================================

//=== Module Declarations =================================================

mod global_context;

//=== Public API ==========================================================

pub use global_context::GlobalContext;
