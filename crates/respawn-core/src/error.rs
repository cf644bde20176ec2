//! Errors surfaced by the orchestrator and respawn attempts.

use crate::collaborators::LifecycleError;
use crate::store::StoreError;

/// Errors that can occur while handling deaths and respawns.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RespawnError {
    /// The orchestrator task has stopped and no longer accepts requests.
    #[error("respawn orchestrator is not running")]
    Closed,

    /// The world the entity should respawn in is not loaded.
    #[error("world `{world}` is not available")]
    WorldUnavailable {
        /// Name of the missing world.
        world: String,
    },

    /// A host lifecycle call failed.
    #[error("lifecycle error: {source}")]
    Lifecycle {
        /// The underlying lifecycle error.
        #[from]
        source: LifecycleError,
    },

    /// A profile store operation failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },
}
