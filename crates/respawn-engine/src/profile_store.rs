//! [`ProfileStore`] backed by `PostgreSQL`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use respawn_core::store::{ProfileStore, StoreError};
use respawn_db::{DbError, PostgresPool, RespawnStore};
use respawn_types::{DeathReason, EntityId, RespawnRecord};

/// Respawn records in the `entity_respawn` table.
#[derive(Clone)]
pub struct PostgresProfileStore {
    pool: PostgresPool,
}

impl PostgresProfileStore {
    /// Use an already migrated pool.
    pub const fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }

    fn records(&self) -> RespawnStore<'_> {
        RespawnStore::new(self.pool.pool())
    }
}

fn store_error(e: DbError) -> StoreError {
    match e {
        DbError::Corrupt { entity_id, message } => StoreError::Corrupt { entity_id, message },
        other => StoreError::Unavailable {
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    async fn upsert(&self, record: &RespawnRecord) -> Result<(), StoreError> {
        self.records().upsert(record).await.map_err(store_error)
    }

    async fn get(&self, entity_id: EntityId) -> Result<Option<RespawnRecord>, StoreError> {
        self.records().get(entity_id).await.map_err(store_error)
    }

    async fn delete(&self, entity_id: EntityId) -> Result<bool, StoreError> {
        self.records().delete(entity_id).await.map_err(store_error)
    }

    async fn set_eligibility(
        &self,
        entity_id: EntityId,
        eligible: bool,
        reason: Option<DeathReason>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.records()
            .set_eligibility(entity_id, eligible, reason, at)
            .await
            .map_err(store_error)
    }

    async fn eligible_records(&self) -> Result<Vec<RespawnRecord>, StoreError> {
        self.records().eligible_records().await.map_err(store_error)
    }
}
