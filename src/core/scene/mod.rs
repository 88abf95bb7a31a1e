//=========================================================================
// Scene Lifecycle
//=========================================================================
//
// Ordered scene lifecycle notifications for synchronous and
// asynchronous observers.
//
// Architecture:
//   ObserverDiscovery ──discover()──> SceneDispatcher
//                                       ├─ observers (sync, sorted)
//                                       └─ async_observers (sorted)
//
//   SignalSender ──SceneSignal──> SignalCollector ──> dispatch()
//
// Activation:   initialize → initialize_async → ready → ready_async
// Deactivation: dispose → dispose_async
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt::{self, Debug};
use std::hash::Hash;

use async_trait::async_trait;

//=== Module Declarations =================================================

mod discovery;
mod dispatcher;
mod error;
mod signal;

//=== Public API ==========================================================

pub use discovery::{DiscoveryQuery, DiscoveryScope, ObserverDiscovery, ObserverPlacement, ObserverSet};
pub use dispatcher::{ObserverId, SceneDispatcher};
pub use error::DispatchError;
pub use signal::{signal_channel, SceneSignal, SignalCollector, SignalError, SignalSender, TickControl};

/// Result returned by every observer hook.
pub type ObserverResult = anyhow::Result<()>;

//=== Scene Key Trait =====================================================

/// Marker trait for scene identifiers.
///
/// Scene keys are handed to every observer hook and travel through the
/// signal channel, so they must be cheap to copy and sendable.
/// Typically implemented by game-specific enums or handle newtypes.
pub trait SceneKey: Clone + Copy + Eq + Hash + Debug + Send + 'static {}

//=== Scene Phase =========================================================

/// Stage of a scene lifecycle sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenePhase {
    /// Scene became active, observers set themselves up.
    Initialize,

    /// Every observer finished initializing.
    Ready,

    /// Scene became inactive, observers release what they hold.
    Dispose,
}

impl fmt::Display for ScenePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialize => "initialize",
            Self::Ready => "ready",
            Self::Dispose => "dispose",
        };
        f.write_str(name)
    }
}

//=== Observer Traits =====================================================

/// Receives scene lifecycle notifications synchronously.
///
/// Observers run in ascending [`execution_order`](Self::execution_order);
/// observers with equal order keep the order they were discovered or
/// subscribed in. All hooks default to doing nothing.
pub trait SceneObserver<S: SceneKey> {
    /// Sort key, lower runs first.
    fn execution_order(&self) -> i32 {
        0
    }

    /// Called when `scene` becomes active, before any async observer.
    fn initialize(&mut self, _scene: S) -> ObserverResult {
        Ok(())
    }

    /// Called once every observer finished initializing `scene`.
    fn ready(&mut self, _scene: S) -> ObserverResult {
        Ok(())
    }

    /// Called when `scene` becomes inactive.
    fn dispose(&mut self, _scene: S) -> ObserverResult {
        Ok(())
    }
}

/// Receives scene lifecycle notifications as futures.
///
/// Each hook is awaited to completion before the next observer is called,
/// so async observers never overlap. A hook that never completes holds
/// the whole sequence at that point.
#[async_trait(?Send)]
pub trait AsyncSceneObserver<S: SceneKey> {
    /// Sort key, lower runs first.
    fn execution_order(&self) -> i32 {
        0
    }

    /// Awaited after every sync observer initialized `scene`.
    async fn initialize_async(&mut self, _scene: S) -> ObserverResult {
        Ok(())
    }

    /// Awaited after every sync observer reported `scene` ready.
    async fn ready_async(&mut self, _scene: S) -> ObserverResult {
        Ok(())
    }

    /// Awaited after every sync observer disposed `scene`.
    async fn dispose_async(&mut self, _scene: S) -> ObserverResult {
        Ok(())
    }
}

//=== Tests ===============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_display_names() {
        assert_eq!(ScenePhase::Initialize.to_string(), "initialize");
        assert_eq!(ScenePhase::Ready.to_string(), "ready");
        assert_eq!(ScenePhase::Dispose.to_string(), "dispose");
    }
}
