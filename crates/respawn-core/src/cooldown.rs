//! Per-entity respawn cooldowns.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use respawn_types::EntityId;

/// Read/write access to the last approved respawn time per entity.
///
/// The eligibility policy reads and stamps cooldowns through this trait so
/// it never owns the storage.
pub trait CooldownState {
    /// When the entity's cooldown was last stamped, if ever.
    fn last_respawn_at(&self, entity_id: EntityId) -> Option<DateTime<Utc>>;

    /// Stamp the entity's cooldown at `at`.
    fn stamp(&mut self, entity_id: EntityId, at: DateTime<Utc>);
}

/// In-memory cooldown map owned by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct CooldownLedger {
    stamps: HashMap<EntityId, DateTime<Utc>>,
}

impl CooldownLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stamp loaded from a persisted record, keeping the later of
    /// the two when one already exists.
    pub fn seed(&mut self, entity_id: EntityId, at: DateTime<Utc>) {
        self.stamps
            .entry(entity_id)
            .and_modify(|existing| *existing = (*existing).max(at))
            .or_insert(at);
    }

    /// Forget stamps whose window has fully elapsed.
    pub fn prune(&mut self, now: DateTime<Utc>, window: Duration) {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        self.stamps
            .retain(|_, at| now.signed_duration_since(*at).num_milliseconds() < window_ms);
    }

    /// Number of entities currently tracked.
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    /// Whether no entity is tracked.
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

impl CooldownState for CooldownLedger {
    fn last_respawn_at(&self, entity_id: EntityId) -> Option<DateTime<Utc>> {
        self.stamps.get(&entity_id).copied()
    }

    fn stamp(&mut self, entity_id: EntityId, at: DateTime<Utc>) {
        self.stamps.insert(entity_id, at);
    }
}
