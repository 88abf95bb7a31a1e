//=========================================================================
// Event Bus Errors
//=========================================================================

use thiserror::Error;

/// Errors surfaced to the caller of [`super::EventBus::publish`].
#[derive(Debug, Error)]
pub enum EventBusError {
    /// A handler failed while the fail-fast policy was active. Handlers
    /// ordered after it were not invoked for this publish.
    #[error("handler for {event} (order {order}) failed")]
    HandlerFault {
        event: &'static str,
        order: i32,
        #[source]
        source: anyhow::Error,
    },

    /// A handler published again while the nesting limit was reached.
    #[error("nested publish of {event} exceeded the dispatch depth limit of {limit}")]
    DepthExceeded { event: &'static str, limit: usize },
}
