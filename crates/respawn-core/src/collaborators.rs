//! Host-side collaborators the orchestrator drives.
//!
//! The orchestrator never touches the host directly. It removes and creates
//! entities through an [`EntityLifecycle`], looks up worlds through a
//! [`WorldProvider`], and tells operators what happened through a
//! [`Notifier`]. The engine binary implements these over NATS; tests use
//! in-memory fakes.

use async_trait::async_trait;
use respawn_types::{DeathReason, EntityHandle, EntityId, Lifespan, Location};
use serde::{Deserialize, Serialize};

/// Errors reported by host collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// The host refused the request.
    #[error("host rejected request: {message}")]
    Rejected {
        /// Reason given by the host.
        message: String,
    },

    /// The host could not be reached or did not answer.
    #[error("host unavailable: {message}")]
    Unavailable {
        /// Description of the transport failure.
        message: String,
    },

    /// An entity with the requested name already exists.
    #[error("an entity named `{name}` already exists")]
    NameCollision {
        /// The requested name.
        name: String,
    },
}

/// A world the host has loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldRef {
    /// World name.
    pub name: String,
}

/// Creates, removes, and checks for managed entities on the host.
#[async_trait]
pub trait EntityLifecycle: Send + Sync {
    /// Remove a dead or unwanted entity from the world.
    async fn remove_entity(&self, entity_id: EntityId, reason: DeathReason) -> Result<(), LifecycleError>;

    /// Create an entity named `name` at `location`.
    async fn create_entity(
        &self,
        name: &str,
        location: &Location,
        lifespan: Lifespan,
    ) -> Result<EntityHandle, LifecycleError>;

    /// Whether the entity is currently present in the world.
    async fn is_present(&self, entity_id: EntityId) -> Result<bool, LifecycleError>;
}

/// Resolves world names to loaded worlds.
#[async_trait]
pub trait WorldProvider: Send + Sync {
    /// Look up a world. `Ok(None)` means it is not loaded right now.
    async fn resolve_world(&self, name: &str) -> Result<Option<WorldRef>, LifecycleError>;
}

/// Operator-facing notice about a managed entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// A respawn has been scheduled.
    RespawnScheduled {
        /// The entity.
        entity_id: EntityId,
        /// Its display name.
        display_name: String,
        /// Why it died.
        reason: DeathReason,
        /// Seconds until the respawn.
        delay_secs: u64,
    },
    /// The entity was re-created.
    RespawnSucceeded {
        /// The entity.
        entity_id: EntityId,
        /// Its display name.
        display_name: String,
        /// Where it was re-created.
        location: Location,
    },
    /// A respawn attempt failed; the record is kept for a later retry.
    RespawnFailed {
        /// The entity.
        entity_id: EntityId,
        /// Its display name.
        display_name: String,
        /// What went wrong.
        error: String,
    },
    /// The death would have been respawned but the entity is on cooldown.
    CooldownBlocked {
        /// The entity.
        entity_id: EntityId,
        /// Its display name.
        display_name: String,
        /// Seconds left on the cooldown.
        remaining_secs: u64,
    },
    /// The entity died and will not be respawned.
    Died {
        /// The entity.
        entity_id: EntityId,
        /// Its display name.
        display_name: String,
        /// Why it died.
        reason: DeathReason,
        /// The host's death message, when there was one.
        message: Option<String>,
    },
}

impl Notice {
    /// The entity the notice is about.
    pub const fn entity_id(&self) -> EntityId {
        match self {
            Self::RespawnScheduled { entity_id, .. }
            | Self::RespawnSucceeded { entity_id, .. }
            | Self::RespawnFailed { entity_id, .. }
            | Self::CooldownBlocked { entity_id, .. }
            | Self::Died { entity_id, .. } => *entity_id,
        }
    }
}

/// Delivers notices to operators.
///
/// Called from the orchestrator's own task, so implementations must return
/// immediately and do any I/O in the background.
pub trait Notifier: Send + Sync {
    /// Deliver a notice. Failures are the implementation's to log.
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match &notice {
            Notice::RespawnScheduled {
                entity_id,
                display_name,
                reason,
                delay_secs,
            } => tracing::info!(
                entity_id = %entity_id,
                name = %display_name,
                reason = %reason,
                delay_secs,
                "{display_name} will respawn in {delay_secs}s"
            ),
            Notice::RespawnSucceeded {
                entity_id,
                display_name,
                location,
            } => tracing::info!(
                entity_id = %entity_id,
                name = %display_name,
                location = %location,
                "{display_name} respawned"
            ),
            Notice::RespawnFailed {
                entity_id,
                display_name,
                error,
            } => tracing::warn!(
                entity_id = %entity_id,
                name = %display_name,
                error = %error,
                "{display_name} failed to respawn"
            ),
            Notice::CooldownBlocked {
                entity_id,
                display_name,
                remaining_secs,
            } => tracing::info!(
                entity_id = %entity_id,
                name = %display_name,
                remaining_secs,
                "{display_name} is on respawn cooldown"
            ),
            Notice::Died {
                entity_id,
                display_name,
                reason,
                message,
            } => tracing::info!(
                entity_id = %entity_id,
                name = %display_name,
                reason = %reason,
                message = message.as_deref().unwrap_or(""),
                "{display_name} died and will not respawn"
            ),
        }
    }
}
