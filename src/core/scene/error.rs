//=========================================================================
// Scene Dispatch Errors
//=========================================================================

use thiserror::Error;

use super::ScenePhase;

/// Errors that end a scene lifecycle sequence early.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// An observer hook failed while the fail-fast policy was active.
    /// Later observers and phases of the sequence did not run.
    #[error("{phase} hook of observer with order {order} failed for scene {scene}")]
    ObserverFault {
        phase: ScenePhase,
        order: i32,
        scene: String,
        #[source]
        source: anyhow::Error,
    },

    /// The cancellation token fired while the sequence was suspended on,
    /// or about to call, an async observer.
    #[error("{phase} phase for scene {scene} was cancelled")]
    Cancelled { phase: ScenePhase, scene: String },
}

impl DispatchError {
    /// Returns the phase the sequence stopped in.
    pub fn phase(&self) -> ScenePhase {
        match self {
            Self::ObserverFault { phase, .. } | Self::Cancelled { phase, .. } => *phase,
        }
    }
}
