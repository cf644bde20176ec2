//! Respawn record persistence.
//!
//! The `entity_respawn` table stores one row per managed entity. The
//! location is flattened into columns; the death reason is stored by its
//! stable upper-case name.

use chrono::{DateTime, Utc};
use respawn_types::{DeathReason, EntityId, Location, RespawnRecord};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbError;

/// Operations on the `entity_respawn` table.
pub struct RespawnStore<'a> {
    pool: &'a PgPool,
}

impl<'a> RespawnStore<'a> {
    /// Create a new respawn store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert or fully replace the row for `record.entity_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the statement fails.
    pub async fn upsert(&self, record: &RespawnRecord) -> Result<(), DbError> {
        let location = &record.last_location;
        sqlx::query(
            r"INSERT INTO entity_respawn
              (entity_id, display_name, world, x, y, z, yaw, pitch,
               death_reason, eligible, last_respawn_at, updated_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
              ON CONFLICT (entity_id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                world = EXCLUDED.world,
                x = EXCLUDED.x,
                y = EXCLUDED.y,
                z = EXCLUDED.z,
                yaw = EXCLUDED.yaw,
                pitch = EXCLUDED.pitch,
                death_reason = EXCLUDED.death_reason,
                eligible = EXCLUDED.eligible,
                last_respawn_at = EXCLUDED.last_respawn_at,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(record.entity_id.into_inner())
        .bind(&record.display_name)
        .bind(&location.world)
        .bind(location.x)
        .bind(location.y)
        .bind(location.z)
        .bind(location.yaw)
        .bind(location.pitch)
        .bind(record.death_reason.map(DeathReason::as_str))
        .bind(record.eligible)
        .bind(record.last_respawn_at)
        .bind(record.updated_at)
        .execute(self.pool)
        .await?;

        tracing::debug!(
            entity_id = %record.entity_id,
            eligible = record.eligible,
            "Upserted respawn record"
        );
        Ok(())
    }

    /// Fetch the record for an entity.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails, or
    /// [`DbError::Corrupt`] if the stored death reason is unrecognised.
    pub async fn get(&self, entity_id: EntityId) -> Result<Option<RespawnRecord>, DbError> {
        let row = sqlx::query_as::<_, RespawnRow>(
            r"SELECT entity_id, display_name, world, x, y, z, yaw, pitch,
                     death_reason, eligible, last_respawn_at, updated_at
              FROM entity_respawn
              WHERE entity_id = $1",
        )
        .bind(entity_id.into_inner())
        .fetch_optional(self.pool)
        .await?;

        row.map(RespawnRecord::try_from).transpose()
    }

    /// Delete the record for an entity. Returns whether a row existed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the statement fails.
    pub async fn delete(&self, entity_id: EntityId) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM entity_respawn WHERE entity_id = $1")
            .bind(entity_id.into_inner())
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update eligibility, and the death reason when one is given.
    /// Returns whether a row existed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the statement fails.
    pub async fn set_eligibility(
        &self,
        entity_id: EntityId,
        eligible: bool,
        reason: Option<DeathReason>,
        at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r"UPDATE entity_respawn
              SET eligible = $2,
                  death_reason = COALESCE($3, death_reason),
                  updated_at = $4
              WHERE entity_id = $1",
        )
        .bind(entity_id.into_inner())
        .bind(eligible)
        .bind(reason.map(DeathReason::as_str))
        .bind(at)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All records still owed a respawn, oldest update first.
    ///
    /// Rows that cannot be decoded are logged and skipped so that one bad
    /// row does not block the whole recovery scan.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn eligible_records(&self) -> Result<Vec<RespawnRecord>, DbError> {
        let rows = sqlx::query_as::<_, RespawnRow>(
            r"SELECT entity_id, display_name, world, x, y, z, yaw, pitch,
                     death_reason, eligible, last_respawn_at, updated_at
              FROM entity_respawn
              WHERE eligible
              ORDER BY updated_at ASC, entity_id ASC",
        )
        .fetch_all(self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match RespawnRecord::try_from(row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable respawn record"),
            }
        }
        Ok(records)
    }
}

/// A row from the `entity_respawn` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RespawnRow {
    /// Entity identifier.
    pub entity_id: Uuid,
    /// Name used when re-creating the entity.
    pub display_name: String,
    /// World of the last known location.
    pub world: String,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
    /// Horizontal rotation.
    pub yaw: f32,
    /// Vertical rotation.
    pub pitch: f32,
    /// Upper-case death reason name, if the entity has died.
    pub death_reason: Option<String>,
    /// Whether a respawn is still owed.
    pub eligible: bool,
    /// Cooldown stamp.
    pub last_respawn_at: Option<DateTime<Utc>>,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RespawnRow> for RespawnRecord {
    type Error = DbError;

    fn try_from(row: RespawnRow) -> Result<Self, Self::Error> {
        let entity_id = EntityId::from(row.entity_id);
        let death_reason = row
            .death_reason
            .as_deref()
            .map(str::parse::<DeathReason>)
            .transpose()
            .map_err(|e| DbError::Corrupt {
                entity_id,
                message: e.to_string(),
            })?;

        Ok(Self {
            entity_id,
            display_name: row.display_name,
            last_location: Location::new(row.world, row.x, row.y, row.z).facing(row.yaw, row.pitch),
            death_reason,
            eligible: row.eligible,
            last_respawn_at: row.last_respawn_at,
            updated_at: row.updated_at,
        })
    }
}
