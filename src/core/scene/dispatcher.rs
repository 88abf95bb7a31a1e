//=========================================================================
// Scene Dispatcher
//=========================================================================
//
// Walks ordered observer lists through the scene lifecycle phases.
//
// Activation of scene X:
//   1. sync  initialize(X)        ascending order
//   2. async initialize_async(X)  ascending order, one awaited at a time
//   3. sync  ready(X)             ascending order
//   4. async ready_async(X)       ascending order, one awaited at a time
//
// Deactivation of scene X:
//   1. sync  dispose(X)
//   2. async dispose_async(X)
//
// A sequence borrows the dispatcher mutably until it finishes, so
// sequences never overlap: signals are handled strictly one at a time in
// the order they are dispatched.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;
use std::pin::pin;

use futures::future::{self, Either};
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

//=== Internal Dependencies ===============================================

use super::{
    AsyncSceneObserver, DiscoveryQuery, DispatchError, ObserverDiscovery, ObserverResult,
    SceneKey, SceneObserver, ScenePhase, SceneSignal,
};
use crate::core::FaultPolicy;

//=== ObserverId ==========================================================

/// Handle of a synchronous observer inside one dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

struct ObserverEntry<S: SceneKey> {
    id: ObserverId,
    observer: Box<dyn SceneObserver<S>>,
}

//=== SceneDispatcher =====================================================

/// Delivers scene lifecycle phases to discovered observers.
///
/// The synchronous list can change at runtime through
/// [`subscribe`](Self::subscribe) and [`unsubscribe`](Self::unsubscribe).
/// The asynchronous list is fixed once discovery ran.
pub struct SceneDispatcher<S: SceneKey> {
    observers: Vec<ObserverEntry<S>>,
    async_observers: Vec<Box<dyn AsyncSceneObserver<S>>>,
    fault_policy: FaultPolicy,
    next_id: u64,
}

impl<S: SceneKey> SceneDispatcher<S> {
    //--- Construction -----------------------------------------------------

    /// Creates a dispatcher without observers.
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
            async_observers: Vec::new(),
            fault_policy: FaultPolicy::default(),
            next_id: 0,
        }
    }

    /// Creates a dispatcher from a discovery scan.
    ///
    /// Both lists are sorted by execution order; observers with equal
    /// order keep the order discovery returned them in.
    pub fn discover<D>(discovery: &mut D, query: &DiscoveryQuery) -> Self
    where
        D: ObserverDiscovery<S> + ?Sized,
    {
        let mut dispatcher = Self::new();

        for observer in discovery.discover_observers(query) {
            let id = dispatcher.allocate_id();
            dispatcher.observers.push(ObserverEntry { id, observer });
        }
        dispatcher.observers.sort_by_key(|e| e.observer.execution_order());

        dispatcher.async_observers = discovery.discover_async_observers(query);
        dispatcher.async_observers.sort_by_key(|o| o.execution_order());

        info!(
            "Scene dispatcher discovered {} sync and {} async observers ({:?})",
            dispatcher.observers.len(),
            dispatcher.async_observers.len(),
            query
        );

        dispatcher
    }

    /// Sets the reaction to failing observer hooks.
    pub fn with_fault_policy(mut self, fault_policy: FaultPolicy) -> Self {
        self.fault_policy = fault_policy;
        self
    }

    //--- Subscriptions ----------------------------------------------------

    /// Adds a synchronous observer and re-sorts the list.
    ///
    /// The new observer runs after existing observers of equal order.
    pub fn subscribe(&mut self, observer: Box<dyn SceneObserver<S>>) -> ObserverId {
        let id = self.allocate_id();
        debug!(
            "Subscribing {} with execution order {}",
            id,
            observer.execution_order()
        );

        self.observers.push(ObserverEntry { id, observer });
        self.observers.sort_by_key(|e| e.observer.execution_order());
        id
    }

    /// Removes a synchronous observer and hands it back.
    ///
    /// Returns `None` if `id` is unknown.
    pub fn unsubscribe(&mut self, id: ObserverId) -> Option<Box<dyn SceneObserver<S>>> {
        let Some(pos) = self.observers.iter().position(|e| e.id == id) else {
            debug!("{} not subscribed, skipping removal", id);
            return None;
        };

        debug!("Unsubscribing {}", id);
        Some(self.observers.remove(pos).observer)
    }

    //--- Lifecycle Sequences ----------------------------------------------

    /// Runs the sequence matching `signal`.
    pub async fn dispatch(
        &mut self,
        signal: SceneSignal<S>,
        cancel: &CancellationToken,
    ) -> Result<(), DispatchError> {
        match signal {
            SceneSignal::Activated(scene) => self.activate(scene, cancel).await,
            SceneSignal::Deactivated(scene) => self.deactivate(scene, cancel).await,
        }
    }

    /// Runs initialize, initialize_async, ready and ready_async for
    /// `scene`, strictly in that order.
    pub async fn activate(
        &mut self,
        scene: S,
        cancel: &CancellationToken,
    ) -> Result<(), DispatchError> {
        debug!("Activating scene {:?}", scene);

        self.run_sync_phase(ScenePhase::Initialize, scene)?;
        self.run_async_phase(ScenePhase::Initialize, scene, cancel).await?;
        self.run_sync_phase(ScenePhase::Ready, scene)?;
        self.run_async_phase(ScenePhase::Ready, scene, cancel).await?;

        debug!("Scene {:?} ready", scene);
        Ok(())
    }

    /// Runs dispose and dispose_async for `scene`.
    pub async fn deactivate(
        &mut self,
        scene: S,
        cancel: &CancellationToken,
    ) -> Result<(), DispatchError> {
        debug!("Deactivating scene {:?}", scene);

        self.run_sync_phase(ScenePhase::Dispose, scene)?;
        self.run_async_phase(ScenePhase::Dispose, scene, cancel).await?;

        debug!("Scene {:?} disposed", scene);
        Ok(())
    }

    //--- Query API --------------------------------------------------------

    /// Returns the synchronous observer ids in dispatch order.
    pub fn observer_ids(&self) -> impl Iterator<Item = ObserverId> + '_ {
        self.observers.iter().map(|e| e.id)
    }

    /// Returns the number of synchronous observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Returns the number of asynchronous observers.
    pub fn async_observer_count(&self) -> usize {
        self.async_observers.len()
    }

    //--- Internal Helpers -------------------------------------------------

    fn allocate_id(&mut self) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        id
    }

    fn run_sync_phase(&mut self, phase: ScenePhase, scene: S) -> Result<(), DispatchError> {
        let policy = self.fault_policy;

        for entry in &mut self.observers {
            let order = entry.observer.execution_order();
            let result = match phase {
                ScenePhase::Initialize => entry.observer.initialize(scene),
                ScenePhase::Ready => entry.observer.ready(scene),
                ScenePhase::Dispose => entry.observer.dispose(scene),
            };
            check(policy, phase, order, scene, result)?;
        }

        Ok(())
    }

    async fn run_async_phase(
        &mut self,
        phase: ScenePhase,
        scene: S,
        cancel: &CancellationToken,
    ) -> Result<(), DispatchError> {
        let policy = self.fault_policy;

        for observer in &mut self.async_observers {
            if cancel.is_cancelled() {
                return Err(cancelled(phase, scene));
            }

            let order = observer.execution_order();
            let call = match phase {
                ScenePhase::Initialize => observer.initialize_async(scene),
                ScenePhase::Ready => observer.ready_async(scene),
                ScenePhase::Dispose => observer.dispose_async(scene),
            };

            let cancelled_signal = pin!(cancel.cancelled());
            let result = match future::select(call, cancelled_signal).await {
                Either::Left((result, _)) => result,
                Either::Right(((), _)) => return Err(cancelled(phase, scene)),
            };

            check(policy, phase, order, scene, result)?;
        }

        Ok(())
    }
}

impl<S: SceneKey> Default for SceneDispatcher<S> {
    fn default() -> Self {
        Self::new()
    }
}

//=== Helpers =============================================================

fn check<S: SceneKey>(
    policy: FaultPolicy,
    phase: ScenePhase,
    order: i32,
    scene: S,
    result: ObserverResult,
) -> Result<(), DispatchError> {
    let Err(source) = result else {
        return Ok(());
    };

    if policy.aborts() {
        return Err(DispatchError::ObserverFault {
            phase,
            order,
            scene: format!("{:?}", scene),
            source,
        });
    }

    error!(
        "{} hook of observer with order {} failed for scene {:?}: {:#}",
        phase, order, scene, source
    );
    Ok(())
}

fn cancelled<S: SceneKey>(phase: ScenePhase, scene: S) -> DispatchError {
    warn!("{} phase for scene {:?} cancelled", phase, scene);
    DispatchError::Cancelled {
        phase,
        scene: format!("{:?}", scene),
    }
}

//=========================================================================
// Tests
//=========================================================================
