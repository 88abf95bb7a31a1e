//=========================================================================
// Event Bus
//=========================================================================
//
// Ordered publish/subscribe dispatcher keyed by event type.
//
// Architecture:
//   subscribe<E>() → HashMap<TypeId, Rc<dyn ErasedChannel>>
//                              ↓
//   publish<E>()   → EventChannel<E> → snapshot → sorted handlers
//
// The key is derived from the static type parameter of each call, never
// from the runtime value being published. Each bus instance is fully
// isolated; there is no process-wide registry.
//
// Re-entrancy: a handler may publish again (same or other type). The
// nested publish runs to completion, with its own snapshot, before the
// outer pass continues. Nesting is bounded by `max_dispatch_depth`.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::{type_name, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, warn};

//=== Internal Dependencies ===============================================

use super::channel::ErasedChannel;
use super::{Event, EventBusError, EventChannel, Handler, HandlerResult};
use crate::core::FaultPolicy;

//=== Constants ===========================================================

/// Default limit for publishes nested inside running handlers.
pub const DEFAULT_MAX_DISPATCH_DEPTH: usize = 32;

//=== EventBus ============================================================

/// Type-keyed event bus with deterministic, priority-ordered delivery.
///
/// All methods take `&self` so handlers holding a shared reference to the
/// bus can subscribe, unsubscribe or publish while a dispatch is running.
/// The bus is single-threaded (`!Sync`).
///
/// # Examples
///
/// ```rust
/// use aetheric_runtime::prelude::*;
///
/// struct Scored(u32);
///
/// let bus = EventBus::new();
/// let handle = bus.subscribe(0, |e: &Scored| {
///     assert_eq!(e.0, 10);
///     Ok(())
/// });
///
/// assert_eq!(bus.publish(Scored(10)).unwrap(), 1);
/// assert!(bus.unsubscribe(&handle));
/// ```
pub struct EventBus {
    channels: RefCell<HashMap<TypeId, Rc<dyn ErasedChannel>>>,
    fault_policy: FaultPolicy,
    max_dispatch_depth: usize,
    depth: Cell<usize>,
}

impl EventBus {
    //--- Construction -----------------------------------------------------

    /// Creates an empty bus with the fail-fast policy.
    pub fn new() -> Self {
        Self {
            channels: RefCell::new(HashMap::new()),
            fault_policy: FaultPolicy::default(),
            max_dispatch_depth: DEFAULT_MAX_DISPATCH_DEPTH,
            depth: Cell::new(0),
        }
    }

    /// Sets how publishes react to failing handlers.
    ///
    /// Applies to every event type, including ones subscribed before the
    /// call.
    pub fn with_fault_policy(mut self, fault_policy: FaultPolicy) -> Self {
        self.fault_policy = fault_policy;
        self
    }

    /// Sets the maximum number of nested publishes.
    ///
    /// Default: [`DEFAULT_MAX_DISPATCH_DEPTH`]
    ///
    /// # Panics
    ///
    /// Panics if `depth == 0`.
    pub fn with_max_dispatch_depth(mut self, depth: usize) -> Self {
        assert!(depth > 0, "Dispatch depth must be positive");
        self.max_dispatch_depth = depth;
        self
    }

    //--- Subscriptions ----------------------------------------------------

    /// Subscribes a closure and returns its handle.
    ///
    /// Keep the handle to unsubscribe later or to re-subscribe the same
    /// callback (which is a no-op).
    pub fn subscribe<E, F>(&self, order: i32, callback: F) -> Handler<E>
    where
        E: Event,
        F: Fn(&E) -> HandlerResult + 'static,
    {
        let handler = Handler::new(callback);
        self.subscribe_handler(&handler, order);
        handler
    }

    /// Subscribes an existing handler.
    ///
    /// Returns false if it was already subscribed for `E`. The original
    /// execution order is kept in that case.
    pub fn subscribe_handler<E: Event>(&self, handler: &Handler<E>, order: i32) -> bool {
        let channel = self.channel_or_insert::<E>();
        match typed::<E>(&channel) {
            Some(channel) => channel.subscribe(handler, order),
            None => false,
        }
    }

    /// Removes `handler` from the subscribers of `E`.
    ///
    /// Returns false if it was not subscribed. That case is not an error.
    pub fn unsubscribe<E: Event>(&self, handler: &Handler<E>) -> bool {
        let Some(channel) = self.channel::<E>() else {
            return false;
        };

        typed::<E>(&channel)
            .map(|channel| channel.unsubscribe(handler))
            .unwrap_or(false)
    }

    //--- Dispatch ---------------------------------------------------------

    /// Publishes `event` to every subscriber of `E`, lowest order first.
    ///
    /// Returns the number of handlers that completed successfully.
    /// Publishing a type nobody subscribed to returns `Ok(0)`.
    pub fn publish<E: Event>(&self, event: E) -> Result<usize, EventBusError> {
        if self.depth.get() >= self.max_dispatch_depth {
            warn!(
                "Publish of {} rejected at dispatch depth {}",
                type_name::<E>(),
                self.depth.get()
            );
            return Err(EventBusError::DepthExceeded {
                event: type_name::<E>(),
                limit: self.max_dispatch_depth,
            });
        }

        let Some(channel) = self.channel::<E>() else {
            return Ok(0);
        };
        let Some(channel) = typed::<E>(&channel) else {
            return Ok(0);
        };

        let _guard = DepthGuard::enter(&self.depth);
        channel.publish_with_policy(&event, self.fault_policy)
    }

    //--- Query API --------------------------------------------------------

    /// Returns the number of handlers subscribed to `E`.
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.channels
            .borrow()
            .get(&TypeId::of::<E>())
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// Returns true if `handler` is subscribed to `E`.
    pub fn is_subscribed<E: Event>(&self, handler: &Handler<E>) -> bool {
        self.channel::<E>()
            .as_ref()
            .and_then(typed::<E>)
            .map(|channel| channel.contains(handler))
            .unwrap_or(false)
    }

    /// Removes every subscriber of `E`.
    pub fn clear<E: Event>(&self) {
        if let Some(channel) = self.channel::<E>() {
            channel.clear();
        }
    }

    /// Removes every subscriber of every event type.
    pub fn clear_all(&self) {
        // Collect first: clearing drops handlers, which may drop buses or
        // other state that reaches back into this map.
        let channels: Vec<_> = self.channels.borrow().values().cloned().collect();
        for channel in channels {
            channel.clear();
        }
    }

    //--- Internal Helpers -------------------------------------------------

    fn channel<E: Event>(&self) -> Option<Rc<dyn ErasedChannel>> {
        self.channels.borrow().get(&TypeId::of::<E>()).cloned()
    }

    fn channel_or_insert<E: Event>(&self) -> Rc<dyn ErasedChannel> {
        let mut channels = self.channels.borrow_mut();

        Rc::clone(channels.entry(TypeId::of::<E>()).or_insert_with(|| {
            debug!("Creating event channel for {}", type_name::<E>());
            Rc::new(EventChannel::<E>::new())
        }))
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

//=== Helpers =============================================================

fn typed<E: Event>(channel: &Rc<dyn ErasedChannel>) -> Option<&EventChannel<E>> {
    channel.as_any().downcast_ref::<EventChannel<E>>()
}

/// Tracks publish nesting for the lifetime of one dispatch pass.
struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
}

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self { depth }
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

//=========================================================================
// Tests
//=========================================================================
