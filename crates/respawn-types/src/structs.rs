//! Core data structs: locations, death signals and respawn records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{DamageCause, DeathReason};
use crate::ids::EntityId;

/// A position in a named world, with orientation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Identifier of the world the position belongs to.
    pub world: String,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate (height).
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
    /// Horizontal rotation in degrees.
    pub yaw: f32,
    /// Vertical rotation in degrees.
    pub pitch: f32,
}

impl Location {
    /// Create a location facing yaw 0, pitch 0.
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    /// Set the orientation.
    #[must_use]
    pub const fn facing(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }
}

impl core::fmt::Display for Location {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} at ({:.1}, {:.1}, {:.1})",
            self.world, self.x, self.y, self.z
        )
    }
}

/// Raw signals the host reports when a managed entity dies.
///
/// Produced once per death and consumed immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeathSignal {
    /// The entity that died.
    pub entity_id: EntityId,
    /// Display name at the time of death.
    pub display_name: String,
    /// Structured cause code, when the host provides one.
    #[serde(default)]
    pub cause: Option<DamageCause>,
    /// Human-readable death message, e.g. `"Bob was slain by Zombie"`.
    #[serde(default)]
    pub message: Option<String>,
    /// When the host observed the death.
    pub observed_at: DateTime<Utc>,
    /// Where the entity died.
    pub location: Location,
}

/// Durable per-entity respawn state.
///
/// One record per entity. Created or updated on death or on a location
/// update, deleted on successful respawn or explicit cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespawnRecord {
    /// The entity this record belongs to.
    pub entity_id: EntityId,
    /// Name used when re-creating the entity.
    pub display_name: String,
    /// Last known position; respawns happen here.
    pub last_location: Location,
    /// Reason of the most recent death, absent until the entity first dies.
    pub death_reason: Option<DeathReason>,
    /// Whether a respawn is still owed to this entity.
    pub eligible: bool,
    /// When the cooldown for this entity was last stamped.
    pub last_respawn_at: Option<DateTime<Utc>>,
    /// Last time the record was written.
    pub updated_at: DateTime<Utc>,
}

/// Handle the host returns after creating an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityHandle {
    /// Identity of the created entity.
    pub entity_id: EntityId,
    /// Name the entity was created with.
    pub display_name: String,
}
