//=========================================================================
// Event Channel
//=========================================================================
//
// Ordered subscription list for a single event type.
//
// Dispatch discipline:
//   publish() → snapshot (clone) → stable sort by order → invoke
//
// Handlers may subscribe or unsubscribe while a publish is running. The
// snapshot taken at the start of the pass is never touched, so changes
// only become visible to the next publish.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::{debug, error};

//=== Internal Dependencies ===============================================

use super::EventBusError;
use crate::core::FaultPolicy;

//=== Public API ==========================================================

/// Marker trait for types that can be published on an event bus.
///
/// Automatically implemented for all `'static` types.
pub trait Event: 'static {}

// Blanket implementation
impl<T: 'static> Event for T {}

/// Result returned by every event handler.
pub type HandlerResult = anyhow::Result<()>;

//=== Handler =============================================================

/// Shareable callback handle for events of type `E`.
///
/// Two handles are the same subscriber when they were cloned from the same
/// original. Subscribing a handle that is already present is a no-op, and
/// unsubscribing uses the same identity.
pub struct Handler<E: Event> {
    callback: Rc<dyn Fn(&E) -> HandlerResult>,
}

impl<E: Event> Handler<E> {
    /// Wraps a closure into a new, distinct handler.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&E) -> HandlerResult + 'static,
    {
        Self {
            callback: Rc::new(callback),
        }
    }

    /// Returns true if both handles refer to the same callback.
    pub fn same_as(&self, other: &Handler<E>) -> bool {
        Rc::ptr_eq(&self.callback, &other.callback)
    }

    fn call(&self, event: &E) -> HandlerResult {
        (self.callback)(event)
    }
}

impl<E: Event> Clone for Handler<E> {
    fn clone(&self) -> Self {
        Self {
            callback: Rc::clone(&self.callback),
        }
    }
}

impl<E: Event> fmt::Debug for Handler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("event", &type_name::<E>())
            .field("callback", &Rc::as_ptr(&self.callback).cast::<()>())
            .finish()
    }
}

//=== Subscription ========================================================

struct Subscription<E: Event> {
    handler: Handler<E>,
    order: i32,
}

impl<E: Event> Clone for Subscription<E> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            order: self.order,
        }
    }
}

//=== EventChannel ========================================================

/// Priority-ordered subscriber list for one event type.
///
/// Can be used on its own when the set of event types is fixed at
/// construction, or through [`super::EventBus`] which keeps one channel
/// per published type.
pub struct EventChannel<E: Event> {
    subscriptions: RefCell<Vec<Subscription<E>>>,
    fault_policy: FaultPolicy,
}

impl<E: Event> EventChannel<E> {
    //--- Construction -----------------------------------------------------

    /// Creates an empty channel with the fail-fast policy.
    pub fn new() -> Self {
        Self::with_fault_policy(FaultPolicy::default())
    }

    /// Creates an empty channel with the given fault policy.
    pub fn with_fault_policy(fault_policy: FaultPolicy) -> Self {
        Self {
            subscriptions: RefCell::new(Vec::new()),
            fault_policy,
        }
    }

    //--- Subscriptions ----------------------------------------------------

    /// Subscribes `handler` with the given execution order.
    ///
    /// Lower orders run first. Returns false and keeps the original order
    /// if the handler is already subscribed.
    pub fn subscribe(&self, handler: &Handler<E>, order: i32) -> bool {
        let mut subscriptions = self.subscriptions.borrow_mut();

        if subscriptions.iter().any(|s| s.handler.same_as(handler)) {
            debug!("Handler for {} already subscribed, ignoring", type_name::<E>());
            return false;
        }

        subscriptions.push(Subscription {
            handler: handler.clone(),
            order,
        });
        true
    }

    /// Removes every subscription of `handler`.
    ///
    /// Returns false if the handler was not subscribed. That case is not
    /// an error.
    pub fn unsubscribe(&self, handler: &Handler<E>) -> bool {
        let mut subscriptions = self.subscriptions.borrow_mut();
        let before = subscriptions.len();
        subscriptions.retain(|s| !s.handler.same_as(handler));
        subscriptions.len() != before
    }

    //--- Dispatch ---------------------------------------------------------

    /// Invokes every subscriber with `event`, lowest order first.
    ///
    /// Returns the number of handlers that completed successfully. Under
    /// [`FaultPolicy::FailFast`] the first failing handler ends the pass
    /// and its error is returned.
    pub fn publish(&self, event: &E) -> Result<usize, EventBusError> {
        self.publish_with_policy(event, self.fault_policy)
    }

    /// Publishes with a policy chosen by the caller instead of the
    /// channel's own.
    pub(super) fn publish_with_policy(
        &self,
        event: &E,
        fault_policy: FaultPolicy,
    ) -> Result<usize, EventBusError> {
        let snapshot = self.snapshot();
        let mut delivered = 0;

        for subscription in &snapshot {
            match subscription.handler.call(event) {
                Ok(()) => delivered += 1,
                Err(source) if fault_policy.aborts() => {
                    return Err(EventBusError::HandlerFault {
                        event: type_name::<E>(),
                        order: subscription.order,
                        source,
                    });
                }
                Err(source) => {
                    error!(
                        "Handler for {} (order {}) failed: {:#}",
                        type_name::<E>(),
                        subscription.order,
                        source
                    );
                }
            }
        }

        Ok(delivered)
    }

    // Copy first, then sort, so the live list keeps insertion order and
    // re-entrant mutation cannot disturb the running pass.
    fn snapshot(&self) -> Vec<Subscription<E>> {
        let mut snapshot = self.subscriptions.borrow().clone();
        snapshot.sort_by_key(|s| s.order);
        snapshot
    }

    //--- Query API --------------------------------------------------------

    /// Returns the number of subscribed handlers.
    pub fn len(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    /// Returns true if nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.borrow().is_empty()
    }

    /// Returns true if `handler` is subscribed.
    pub fn contains(&self, handler: &Handler<E>) -> bool {
        self.subscriptions
            .borrow()
            .iter()
            .any(|s| s.handler.same_as(handler))
    }

    /// Removes all subscriptions.
    pub fn clear(&self) {
        // Handlers are dropped after the borrow ends
        let removed = std::mem::take(&mut *self.subscriptions.borrow_mut());
        drop(removed);
    }
}

impl<E: Event> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

//=== Type-Erased Storage =================================================

/// Type-erased view of an [`EventChannel`] so channels of different event
/// types can share one map inside the bus.
pub(super) trait ErasedChannel {
    /// Removes all subscriptions.
    fn clear(&self);

    /// Returns the number of subscribed handlers.
    fn len(&self) -> usize;

    /// Downcasts to `&dyn Any` for typed access.
    fn as_any(&self) -> &dyn Any;
}

impl<E: Event> ErasedChannel for EventChannel<E> {
    fn clear(&self) {
        EventChannel::clear(self);
    }

    fn len(&self) -> usize {
        EventChannel::len(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

//=========================================================================
// Tests
//=========================================================================
