//=========================================================================
// Event Bus
//=========================================================================
//
// Synchronous, priority-ordered publish/subscribe.
//
// Components:
// - `channel`: ordered subscriber list for one event type
// - `bus`: per-type channel registry with re-entrancy guard
// - `error`: dispatch failures surfaced to publishers
//
// Contract:
// - Lower execution order runs first; equal orders keep subscription order
// - Subscribing an already-subscribed handler is a no-op
// - Unsubscribing an unknown handler is a no-op
// - Mutations during a publish are visible from the next publish on
//
//=========================================================================

//=== Module Declarations =================================================

mod bus;
mod channel;
mod error;

//=== Public API ==========================================================

pub use bus::{EventBus, DEFAULT_MAX_DISPATCH_DEPTH};
pub use channel::{Event, EventChannel, Handler, HandlerResult};
pub use error::EventBusError;
