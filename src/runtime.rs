//=========================================================================
// Aetheric Runtime
//
// Entry point wiring the coordination primitives together.
//
// Architecture:
// ```text
//     RuntimeBuilder ──build()──> Runtime ──pump()──> SceneDispatcher
//         │                        │                     ▲
//         ├─ with_fault_policy()   ├─ GlobalContext      │
//         ├─ with_*_depth()        │   └─ EventBus       │
//         └─ with_discovery()      └─ SignalCollector ───┘
//                                        ▲
//                 host ── SignalSender ──┘
// ```
//
//=========================================================================

//=== External Dependencies ===============================================

use std::marker::PhantomData;
use std::rc::Rc;

use log::{debug, info};
use tokio_util::sync::CancellationToken;

//=== Internal Dependencies ===============================================

use crate::core::event_bus::{EventBus, DEFAULT_MAX_DISPATCH_DEPTH};
use crate::core::globals::GlobalContext;
use crate::core::scene::{
    signal_channel, DiscoveryQuery, DispatchError, ObserverDiscovery, SceneDispatcher, SceneKey,
    SceneSignal, SignalCollector, SignalSender, TickControl,
};
use crate::core::FaultPolicy;

//=== RuntimeBuilder ======================================================

/// Builder for configuring and constructing a [`Runtime`].
///
/// # Default Values
///
/// - **Fault policy**: [`FaultPolicy::FailFast`]
/// - **Max dispatch depth**: 32 nested publishes
/// - **Signal capacity**: 64 signals
/// - **Signals per pump**: 16
/// - **Discovery**: whole hierarchy, inactive observers included
///
/// # Examples
///
/// ```
/// use aetheric_runtime::prelude::*;
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum Level { Menu }
/// impl SceneKey for Level {}
///
/// struct Music;
/// impl SceneObserver<Level> for Music {
///     fn ready(&mut self, scene: Level) -> ObserverResult {
///         println!("{:?} is ready", scene);
///         Ok(())
///     }
/// }
///
/// let mut observers = ObserverSet::new();
/// observers.add(ObserverPlacement::root(), Music);
///
/// let (mut runtime, signals) = RuntimeBuilder::<Level>::new()
///     .with_signal_capacity(8)
///     .build(&mut observers);
///
/// signals.activated(Level::Menu).unwrap();
/// runtime.pump_blocking(&CancellationToken::new()).unwrap();
/// runtime.shutdown();
/// ```
pub struct RuntimeBuilder<S: SceneKey> {
    fault_policy: FaultPolicy,
    max_dispatch_depth: usize,
    signal_capacity: usize,
    max_signals_per_pump: usize,
    discovery: DiscoveryQuery,
    _phantom: PhantomData<S>,
}

impl<S: SceneKey> RuntimeBuilder<S> {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            fault_policy: FaultPolicy::default(),
            max_dispatch_depth: DEFAULT_MAX_DISPATCH_DEPTH,
            signal_capacity: 64,
            max_signals_per_pump: 16,
            discovery: DiscoveryQuery::default(),
            _phantom: PhantomData,
        }
    }

    /// Sets how the event bus and the scene dispatcher react to failing
    /// handlers.
    ///
    /// Default: [`FaultPolicy::FailFast`]
    pub fn with_fault_policy(mut self, fault_policy: FaultPolicy) -> Self {
        self.fault_policy = fault_policy;
        self
    }

    /// Sets how deeply publishes may nest inside handlers.
    ///
    /// Default: 32
    ///
    /// # Panics
    ///
    /// Panics if `depth == 0`.
    pub fn with_max_dispatch_depth(mut self, depth: usize) -> Self {
        assert!(depth > 0, "Dispatch depth must be positive");
        self.max_dispatch_depth = depth;
        self
    }

    /// Sets the capacity of the host → runtime signal channel.
    ///
    /// Senders get [`SignalError::Full`](crate::core::scene::SignalError::Full)
    /// once this many signals wait undispatched.
    ///
    /// Default: 64
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn with_signal_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "Signal capacity must be positive");
        self.signal_capacity = capacity;
        self
    }

    /// Sets how many signals one [`Runtime::pump`] drains from the channel.
    ///
    /// Default: 16
    ///
    /// # Panics
    ///
    /// Panics if `count == 0`.
    pub fn with_max_signals_per_pump(mut self, count: usize) -> Self {
        assert!(count > 0, "Signals per pump must be positive");
        self.max_signals_per_pump = count;
        self
    }

    /// Sets the query used to discover scene observers.
    ///
    /// Default: [`DiscoveryQuery::hierarchy`]
    pub fn with_discovery(mut self, query: DiscoveryQuery) -> Self {
        self.discovery = query;
        self
    }

    /// Builds the runtime, discovering observers from `discovery`.
    ///
    /// Returns the runtime and the sender the host reports scene changes
    /// through. The sender may be cloned and moved to other threads.
    pub fn build<D>(self, discovery: &mut D) -> (Runtime<S>, SignalSender<S>)
    where
        D: ObserverDiscovery<S> + ?Sized,
    {
        info!(
            "Building runtime (faults: {:?}, depth: {}, signals: {}/{})",
            self.fault_policy,
            self.max_dispatch_depth,
            self.signal_capacity,
            self.max_signals_per_pump
        );

        let events = EventBus::new()
            .with_fault_policy(self.fault_policy)
            .with_max_dispatch_depth(self.max_dispatch_depth);
        let dispatcher = SceneDispatcher::discover(discovery, &self.discovery)
            .with_fault_policy(self.fault_policy);
        let (sender, collector) = signal_channel(self.signal_capacity, self.max_signals_per_pump);

        let runtime = Runtime {
            context: Rc::new(GlobalContext::with_event_bus(events)),
            dispatcher,
            collector,
        };

        (runtime, sender)
    }
}

impl<S: SceneKey> Default for RuntimeBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

//=== Runtime =============================================================

/// Owns the shared context and drives scene lifecycle dispatch.
///
/// The runtime is single-threaded. Host threads report scene changes
/// through a [`SignalSender`]; the owning thread calls
/// [`pump`](Self::pump) (or [`pump_blocking`](Self::pump_blocking)) once
/// per frame to run the queued lifecycle sequences.
pub struct Runtime<S: SceneKey> {
    context: Rc<GlobalContext>,
    dispatcher: SceneDispatcher<S>,
    collector: SignalCollector<S>,
}

impl<S: SceneKey> Runtime<S> {
    //--- Accessors --------------------------------------------------------

    /// Returns the shared context. Clone the `Rc` to hand it to handlers.
    pub fn context(&self) -> &Rc<GlobalContext> {
        &self.context
    }

    /// Returns the scene dispatcher.
    pub fn dispatcher(&self) -> &SceneDispatcher<S> {
        &self.dispatcher
    }

    /// Returns the scene dispatcher for subscribing observers at runtime.
    pub fn dispatcher_mut(&mut self) -> &mut SceneDispatcher<S> {
        &mut self.dispatcher
    }

    /// Returns signals collected but not yet dispatched.
    pub fn pending_signals(&self) -> &[SceneSignal<S>] {
        self.collector.signals()
    }

    //--- Pump -------------------------------------------------------------

    /// Collects waiting signals and runs their lifecycle sequences one
    /// after another, in send order.
    ///
    /// Returns [`TickControl::Exit`] once every sender is gone; signals
    /// collected in that pump still run first. If a sequence fails, the
    /// signals after it stay pending for the next pump and the error is
    /// returned.
    pub async fn pump(&mut self, cancel: &CancellationToken) -> Result<TickControl, DispatchError> {
        let control = self.collector.collect_frame();
        let mut signals = self.collector.take_signals().into_iter();

        while let Some(signal) = signals.next() {
            debug!("Dispatching {:?}", signal);

            if let Err(err) = self.dispatcher.dispatch(signal, cancel).await {
                self.collector.restore(signals.collect());
                return Err(err);
            }
        }

        Ok(control)
    }

    /// Runs [`pump`](Self::pump) to completion on the current thread.
    ///
    /// Blocks for as long as an async observer is suspended.
    pub fn pump_blocking(&mut self, cancel: &CancellationToken) -> Result<TickControl, DispatchError> {
        futures::executor::block_on(self.pump(cancel))
    }

    //--- Shutdown ---------------------------------------------------------

    /// Tears down the shared context and drops the runtime.
    ///
    /// Undispatched signals are discarded.
    pub fn shutdown(self) {
        info!(
            "Shutting down runtime ({} signals discarded)",
            self.collector.signals().len()
        );
        self.context.teardown();
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::EventBusError;
    use crate::core::scene::{ObserverPlacement, ObserverResult, ObserverSet, SceneObserver};
    use anyhow::bail;
    use std::cell::RefCell;

    //--- Fixtures ---------------------------------------------------------

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Level {
        Menu,
        Forest,
    }

    impl SceneKey for Level {}

    type Log = Rc<RefCell<Vec<String>>>;

    struct Tracker {
        log: Log,
        broken: Option<Level>,
    }

    impl SceneObserver<Level> for Tracker {
        fn initialize(&mut self, scene: Level) -> ObserverResult {
            if self.broken == Some(scene) {
                bail!("cannot load {:?}", scene);
            }
            self.log.borrow_mut().push(format!("init {:?}", scene));
            Ok(())
        }

        fn dispose(&mut self, scene: Level) -> ObserverResult {
            self.log.borrow_mut().push(format!("dispose {:?}", scene));
            Ok(())
        }
    }

    fn tracked(broken: Option<Level>) -> (ObserverSet<Level>, Log) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let mut set = ObserverSet::new();
        set.add(
            ObserverPlacement::root(),
            Tracker {
                log: Rc::clone(&log),
                broken,
            },
        );
        (set, log)
    }

    struct Ping;

    //--- Builder Tests ----------------------------------------------------

    #[test]
    fn builder_defaults() {
        let builder = RuntimeBuilder::<Level>::new();
        assert_eq!(builder.fault_policy, FaultPolicy::FailFast);
        assert_eq!(builder.max_dispatch_depth, 32);
        assert_eq!(builder.signal_capacity, 64);
        assert_eq!(builder.max_signals_per_pump, 16);
        assert_eq!(builder.discovery, DiscoveryQuery::hierarchy());
    }

    #[test]
    fn builder_fluent_api_chaining() {
        let builder = RuntimeBuilder::<Level>::new()
            .with_fault_policy(FaultPolicy::Isolate)
            .with_max_dispatch_depth(4)
            .with_signal_capacity(8)
            .with_max_signals_per_pump(2)
            .with_discovery(DiscoveryQuery::subtree().with_include_inactive(false));

        assert_eq!(builder.fault_policy, FaultPolicy::Isolate);
        assert_eq!(builder.max_dispatch_depth, 4);
        assert_eq!(builder.signal_capacity, 8);
        assert_eq!(builder.max_signals_per_pump, 2);
        assert!(!builder.discovery.include_inactive);
    }

    #[test]
    #[should_panic(expected = "Dispatch depth must be positive")]
    fn builder_with_max_dispatch_depth_panics_on_zero() {
        RuntimeBuilder::<Level>::new().with_max_dispatch_depth(0);
    }

    #[test]
    #[should_panic(expected = "Signal capacity must be positive")]
    fn builder_with_signal_capacity_panics_on_zero() {
        RuntimeBuilder::<Level>::new().with_signal_capacity(0);
    }

    #[test]
    #[should_panic(expected = "Signals per pump must be positive")]
    fn builder_with_max_signals_per_pump_panics_on_zero() {
        RuntimeBuilder::<Level>::new().with_max_signals_per_pump(0);
    }

    #[test]
    fn build_applies_discovery_query() {
        let (mut set, _log) = tracked(None);
        let (runtime, _signals) = RuntimeBuilder::<Level>::new()
            .with_discovery(DiscoveryQuery::subtree())
            .build(&mut set);

        assert_eq!(runtime.dispatcher().observer_count(), 0);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn build_applies_dispatch_depth() {
        let (mut set, _log) = tracked(None);
        let (runtime, _signals) = RuntimeBuilder::<Level>::new()
            .with_max_dispatch_depth(1)
            .build(&mut set);

        let context = Rc::downgrade(runtime.context());
        runtime.context().events.subscribe(0, move |_: &Ping| {
            if let Some(context) = context.upgrade() {
                context.events.publish(Ping)?;
            }
            Ok(())
        });

        let err = runtime.context().events.publish(Ping).unwrap_err();
        assert!(matches!(err, EventBusError::HandlerFault { .. }));
    }

    //--- Pump Tests -------------------------------------------------------

    #[test]
    fn pump_runs_signals_in_send_order() {
        let (mut set, log) = tracked(None);
        let (mut runtime, signals) = RuntimeBuilder::<Level>::new().build(&mut set);

        signals.activated(Level::Menu).unwrap();
        signals.deactivated(Level::Menu).unwrap();
        signals.activated(Level::Forest).unwrap();

        let control = runtime.pump_blocking(&CancellationToken::new()).unwrap();

        assert_eq!(control, TickControl::Continue);
        assert_eq!(
            *log.borrow(),
            vec!["init Menu", "dispose Menu", "init Forest"]
        );
        assert!(runtime.pending_signals().is_empty());
    }

    #[test]
    fn pump_is_bounded_per_call() {
        let (mut set, log) = tracked(None);
        let (mut runtime, signals) = RuntimeBuilder::<Level>::new()
            .with_max_signals_per_pump(1)
            .build(&mut set);

        signals.activated(Level::Menu).unwrap();
        signals.activated(Level::Forest).unwrap();

        runtime.pump_blocking(&CancellationToken::new()).unwrap();
        assert_eq!(*log.borrow(), vec!["init Menu"]);

        runtime.pump_blocking(&CancellationToken::new()).unwrap();
        assert_eq!(*log.borrow(), vec!["init Menu", "init Forest"]);
    }

    #[test]
    fn pump_reports_exit_after_last_signal() {
        let (mut set, log) = tracked(None);
        let (mut runtime, signals) = RuntimeBuilder::<Level>::new().build(&mut set);

        signals.deactivated(Level::Forest).unwrap();
        drop(signals);

        let control = runtime.pump_blocking(&CancellationToken::new()).unwrap();

        assert_eq!(control, TickControl::Exit);
        assert_eq!(*log.borrow(), vec!["dispose Forest"]);
    }

    #[test]
    fn failed_sequence_keeps_later_signals_pending() {
        let (mut set, log) = tracked(Some(Level::Forest));
        let (mut runtime, signals) = RuntimeBuilder::<Level>::new().build(&mut set);

        signals.activated(Level::Menu).unwrap();
        signals.activated(Level::Forest).unwrap();
        signals.deactivated(Level::Menu).unwrap();

        let err = runtime.pump_blocking(&CancellationToken::new()).unwrap_err();

        assert!(matches!(err, DispatchError::ObserverFault { .. }));
        assert_eq!(*log.borrow(), vec!["init Menu"]);
        assert_eq!(
            runtime.pending_signals(),
            &[SceneSignal::Deactivated(Level::Menu)]
        );

        runtime.pump_blocking(&CancellationToken::new()).unwrap();
        assert_eq!(*log.borrow(), vec!["init Menu", "dispose Menu"]);
    }

    #[test]
    fn isolating_runtime_skips_failed_observers() {
        let (mut set, log) = tracked(Some(Level::Forest));
        let (mut runtime, signals) = RuntimeBuilder::<Level>::new()
            .with_fault_policy(FaultPolicy::Isolate)
            .build(&mut set);

        signals.activated(Level::Forest).unwrap();
        signals.deactivated(Level::Forest).unwrap();

        runtime.pump_blocking(&CancellationToken::new()).unwrap();

        assert_eq!(*log.borrow(), vec!["dispose Forest"]);
    }

    //--- Shutdown Tests ---------------------------------------------------

    #[test]
    fn shutdown_tears_down_shared_context() {
        let (mut set, _log) = tracked(None);
        let (runtime, _signals) = RuntimeBuilder::<Level>::new().build(&mut set);
        let context = Rc::clone(runtime.context());
        context.events.subscribe(0, |_: &Ping| Ok(()));

        runtime.shutdown();

        assert_eq!(context.events.subscriber_count::<Ping>(), 0);
    }
}
