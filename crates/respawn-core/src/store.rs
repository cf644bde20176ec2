//! Durable respawn records.
//!
//! [`ProfileStore`] is the persistence seam for [`RespawnRecord`]s. The
//! engine backs it with `PostgreSQL`; [`InMemoryProfileStore`] serves tests
//! and deployments that do not need restart recovery.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use respawn_types::{DeathReason, EntityId, RespawnRecord};
use tokio::sync::Mutex;

/// Errors reported by a [`ProfileStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the operation.
    #[error("profile store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// A stored record could not be decoded.
    #[error("corrupt respawn record for {entity_id}: {message}")]
    Corrupt {
        /// The entity whose record is corrupt.
        entity_id: EntityId,
        /// What is wrong with it.
        message: String,
    },
}

/// Keyed storage of respawn records, one per entity.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert or fully replace the record for `record.entity_id`.
    async fn upsert(&self, record: &RespawnRecord) -> Result<(), StoreError>;

    /// Fetch the record for an entity.
    async fn get(&self, entity_id: EntityId) -> Result<Option<RespawnRecord>, StoreError>;

    /// Delete the record for an entity. Returns whether one existed.
    async fn delete(&self, entity_id: EntityId) -> Result<bool, StoreError>;

    /// Update eligibility (and the death reason, when given) of an existing
    /// record. Returns whether a record existed.
    async fn set_eligibility(
        &self,
        entity_id: EntityId,
        eligible: bool,
        reason: Option<DeathReason>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// All records still owed a respawn, oldest update first.
    async fn eligible_records(&self) -> Result<Vec<RespawnRecord>, StoreError>;
}

/// A [`ProfileStore`] held in process memory.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProfileStore {
    records: Arc<Mutex<HashMap<EntityId, RespawnRecord>>>,
}

impl InMemoryProfileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored record.
    pub async fn snapshot(&self) -> Vec<RespawnRecord> {
        self.records.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn upsert(&self, record: &RespawnRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .await
            .insert(record.entity_id, record.clone());
        Ok(())
    }

    async fn get(&self, entity_id: EntityId) -> Result<Option<RespawnRecord>, StoreError> {
        Ok(self.records.lock().await.get(&entity_id).cloned())
    }

    async fn delete(&self, entity_id: EntityId) -> Result<bool, StoreError> {
        Ok(self.records.lock().await.remove(&entity_id).is_some())
    }

    async fn set_eligibility(
        &self,
        entity_id: EntityId,
        eligible: bool,
        reason: Option<DeathReason>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(&entity_id) else {
            return Ok(false);
        };
        record.eligible = eligible;
        if reason.is_some() {
            record.death_reason = reason;
        }
        record.updated_at = at;
        Ok(true)
    }

    async fn eligible_records(&self) -> Result<Vec<RespawnRecord>, StoreError> {
        let mut eligible: Vec<RespawnRecord> = self
            .records
            .lock()
            .await
            .values()
            .filter(|record| record.eligible)
            .cloned()
            .collect();
        eligible.sort_by_key(|record| (record.updated_at, record.entity_id));
        Ok(eligible)
    }
}
