//=========================================================================
// Scene Signals
//=========================================================================
//
// Host-to-dispatcher channel for scene activation changes.
//
// Architecture:
//   host threads → SignalSender → crossbeam channel → SignalCollector
//                                                        ↓
//                                         collect_frame() → pending signals
//
// Collection is bounded per frame so a flood of signals cannot starve
// the host loop. Signals keep their send order.
//
//=========================================================================

//=== External Dependencies ===============================================

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use log::warn;
use thiserror::Error;

//=== Internal Dependencies ===============================================

use super::SceneKey;

//=== SceneSignal =========================================================

/// Scene activation change reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneSignal<S: SceneKey> {
    /// The scene became active (finished loading).
    Activated(S),

    /// The scene became inactive (unloaded).
    Deactivated(S),
}

impl<S: SceneKey> SceneSignal<S> {
    /// Returns the scene the signal refers to.
    pub fn scene(&self) -> S {
        match self {
            Self::Activated(scene) | Self::Deactivated(scene) => *scene,
        }
    }
}

//=== TickControl =========================================================

/// Pump loop control signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,

    /// Every sender was dropped and the channel is drained.
    Exit,
}

//=== SignalError =========================================================

/// Failure to hand a signal to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("scene signal channel is full")]
    Full,

    #[error("scene signal channel is disconnected")]
    Disconnected,
}

//=== SignalSender ========================================================

/// Cloneable host-side handle for reporting scene changes.
#[derive(Debug)]
pub struct SignalSender<S: SceneKey> {
    sender: Sender<SceneSignal<S>>,
}

impl<S: SceneKey> Clone for SignalSender<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<S: SceneKey> SignalSender<S> {
    /// Reports that `scene` became active.
    pub fn activated(&self, scene: S) -> Result<(), SignalError> {
        self.send(SceneSignal::Activated(scene))
    }

    /// Reports that `scene` became inactive.
    pub fn deactivated(&self, scene: S) -> Result<(), SignalError> {
        self.send(SceneSignal::Deactivated(scene))
    }

    /// Queues `signal` without blocking.
    pub fn send(&self, signal: SceneSignal<S>) -> Result<(), SignalError> {
        self.sender.try_send(signal).map_err(|e| match e {
            TrySendError::Full(_) => SignalError::Full,
            TrySendError::Disconnected(_) => SignalError::Disconnected,
        })
    }
}

//=== SignalCollector =====================================================

/// Collects scene signals with bounded polling.
#[derive(Debug)]
pub struct SignalCollector<S: SceneKey> {
    receiver: Receiver<SceneSignal<S>>,
    pending: Vec<SceneSignal<S>>,
    max_per_frame: usize,
}

impl<S: SceneKey> SignalCollector<S> {
    /// Creates a collector draining at most `max_per_frame` signals per
    /// call to [`collect_frame`](Self::collect_frame).
    ///
    /// # Panics
    ///
    /// Panics if `max_per_frame == 0`.
    pub fn new(receiver: Receiver<SceneSignal<S>>, max_per_frame: usize) -> Self {
        assert!(max_per_frame > 0, "Signals per frame must be positive");
        Self {
            receiver,
            pending: Vec::with_capacity(4),
            max_per_frame,
        }
    }

    /// Moves waiting signals into the pending list.
    ///
    /// Returns [`TickControl::Exit`] once every sender is gone and the
    /// channel is empty. Signals collected before that point stay pending.
    pub fn collect_frame(&mut self) -> TickControl {
        let mut drained = 0;

        while drained < self.max_per_frame {
            match self.receiver.try_recv() {
                Ok(signal) => {
                    self.pending.push(signal);
                    drained += 1;
                }
                Err(TryRecvError::Disconnected) => return TickControl::Exit,
                Err(TryRecvError::Empty) => break,
            }
        }

        if drained >= self.max_per_frame && !self.receiver.is_empty() {
            warn!(
                "Scene signal backlog: drained {} signals this frame, {} still queued",
                drained,
                self.receiver.len()
            );
        }

        TickControl::Continue
    }

    /// Returns the signals waiting to be dispatched.
    pub fn signals(&self) -> &[SceneSignal<S>] {
        &self.pending
    }

    /// Takes ownership of the pending signals, leaving an empty list.
    pub fn take_signals(&mut self) -> Vec<SceneSignal<S>> {
        std::mem::take(&mut self.pending)
    }

    /// Puts undispatched signals back in front of the pending list.
    pub fn restore(&mut self, signals: Vec<SceneSignal<S>>) {
        let later = std::mem::replace(&mut self.pending, signals);
        self.pending.extend(later);
    }
}

//=== Channel Construction ================================================

/// Creates a bounded signal channel.
///
/// # Panics
///
/// Panics if `capacity == 0` or `max_per_frame == 0`.
pub fn signal_channel<S: SceneKey>(
    capacity: usize,
    max_per_frame: usize,
) -> (SignalSender<S>, SignalCollector<S>) {
    assert!(capacity > 0, "Signal capacity must be positive");
    let (sender, receiver) = bounded(capacity);
    (SignalSender { sender }, SignalCollector::new(receiver, max_per_frame))
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Level {
        Menu,
        Forest,
    }

    impl SceneKey for Level {}

    #[test]
    fn collect_handles_empty_channel() {
        let (_tx, mut collector) = signal_channel::<Level>(8, 4);

        assert_eq!(collector.collect_frame(), TickControl::Continue);
        assert!(collector.signals().is_empty());
    }

    #[test]
    fn collect_keeps_send_order() {
        let (tx, mut collector) = signal_channel(8, 4);

        tx.activated(Level::Menu).unwrap();
        tx.deactivated(Level::Menu).unwrap();
        tx.activated(Level::Forest).unwrap();

        collector.collect_frame();

        assert_eq!(
            collector.take_signals(),
            vec![
                SceneSignal::Activated(Level::Menu),
                SceneSignal::Deactivated(Level::Menu),
                SceneSignal::Activated(Level::Forest),
            ]
        );
        assert!(collector.signals().is_empty());
    }

    #[test]
    fn collect_is_bounded_per_frame() {
        let (tx, mut collector) = signal_channel(8, 2);

        for _ in 0..3 {
            tx.activated(Level::Menu).unwrap();
        }

        collector.collect_frame();
        assert_eq!(collector.signals().len(), 2);

        collector.collect_frame();
        assert_eq!(collector.signals().len(), 3);
    }

    #[test]
    fn collect_returns_exit_after_senders_drop() {
        let (tx, mut collector) = signal_channel(8, 4);
        tx.activated(Level::Forest).unwrap();
        drop(tx);

        assert_eq!(collector.collect_frame(), TickControl::Exit);
        assert_eq!(collector.signals(), &[SceneSignal::Activated(Level::Forest)]);
    }

    #[test]
    fn full_channel_rejects_signal() {
        let (tx, _collector) = signal_channel(1, 1);

        tx.activated(Level::Menu).unwrap();

        assert_eq!(tx.activated(Level::Forest), Err(SignalError::Full));
    }

    #[test]
    fn send_fails_once_collector_is_gone() {
        let (tx, collector) = signal_channel::<Level>(4, 4);
        drop(collector);

        assert_eq!(tx.deactivated(Level::Menu), Err(SignalError::Disconnected));
    }

    #[test]
    fn restore_puts_signals_in_front() {
        let (tx, mut collector) = signal_channel(8, 8);
        tx.activated(Level::Forest).unwrap();
        collector.collect_frame();

        collector.restore(vec![SceneSignal::Deactivated(Level::Menu)]);

        assert_eq!(
            collector.signals(),
            &[
                SceneSignal::Deactivated(Level::Menu),
                SceneSignal::Activated(Level::Forest),
            ]
        );
    }

    #[test]
    fn signal_reports_its_scene() {
        assert_eq!(SceneSignal::Activated(Level::Menu).scene(), Level::Menu);
        assert_eq!(SceneSignal::Deactivated(Level::Forest).scene(), Level::Forest);
    }

    #[test]
    #[should_panic(expected = "Signal capacity must be positive")]
    fn zero_capacity_panics() {
        signal_channel::<Level>(0, 1);
    }
}
