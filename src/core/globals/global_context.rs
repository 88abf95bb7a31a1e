//=========================================================================
// Global Context
//=========================================================================
//
// Shared data container handed to application code.
//
// Contains:
// - events: Application-wide event bus
//
// Several contexts may coexist; each owns an isolated bus.
//
//=========================================================================

//=== External Dependencies ===============================================

use log::info;

//=== Internal Dependencies ===============================================

use crate::core::event_bus::EventBus;

//=== GlobalContext =======================================================

/// Shared context for one application run.
///
/// Replaces ambient per-type registries: code that publishes or
/// subscribes receives the context (usually behind an `Rc`) instead of
/// reaching for global state.
#[derive(Default)]
pub struct GlobalContext {
    /// Application-wide event bus.
    pub events: EventBus,
}

impl GlobalContext {
    /// Creates a context with a default-configured bus.
    pub fn new() -> Self {
        Self::with_event_bus(EventBus::new())
    }

    /// Creates a context around a preconfigured bus.
    pub fn with_event_bus(events: EventBus) -> Self {
        Self { events }
    }

    /// Drops every subscription of every event type.
    ///
    /// Handlers are released even while other `Rc`s to the context are
    /// still alive.
    pub fn teardown(&self) {
        info!("Tearing down global context");
        self.events.clear_all();
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Ping;

    #[test]
    fn contexts_own_isolated_buses() {
        let first = GlobalContext::new();
        let second = GlobalContext::new();
        let hits = Rc::new(Cell::new(0));

        let counter = Rc::clone(&hits);
        first.events.subscribe(0, move |_: &Ping| {
            counter.set(counter.get() + 1);
            Ok(())
        });

        assert_eq!(second.events.publish(Ping).unwrap(), 0);
        assert_eq!(first.events.publish(Ping).unwrap(), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn teardown_clears_subscriptions() {
        let context = GlobalContext::new();
        context.events.subscribe(0, |_: &Ping| Ok(()));
        context.events.subscribe(1, |_: &Ping| Ok(()));

        context.teardown();

        assert_eq!(context.events.subscriber_count::<Ping>(), 0);
        assert_eq!(context.events.publish(Ping).unwrap(), 0);
    }
}
