//! Startup recovery of entities that were owed a respawn when the service
//! last stopped.
//!
//! Once the host reports ready and the stabilization delay has passed, the
//! orchestrator loads every eligible record, drops the entities the host
//! already has, and schedules the rest with a fixed stagger so the host is
//! not asked to create them all at once.

use std::time::Duration;

use respawn_types::RespawnRecord;

use crate::collaborators::EntityLifecycle;

/// One entity to restore and when.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryStep {
    /// The record to restore from.
    pub record: RespawnRecord,
    /// Delay from the start of the scan.
    pub delay: Duration,
}

/// Keep only the records whose entity is not currently present.
///
/// A failed presence check counts as absent; the fire-time check gets a
/// second chance before anything is created.
pub async fn find_absent(
    records: Vec<RespawnRecord>,
    lifecycle: &dyn EntityLifecycle,
) -> Vec<RespawnRecord> {
    let mut absent = Vec::with_capacity(records.len());
    for record in records {
        match lifecycle.is_present(record.entity_id).await {
            Ok(true) => {
                tracing::debug!(
                    entity_id = %record.entity_id,
                    name = %record.display_name,
                    "Already present, skipping recovery"
                );
            }
            Ok(false) => absent.push(record),
            Err(e) => {
                tracing::warn!(
                    entity_id = %record.entity_id,
                    error = %e,
                    "Presence check failed during recovery, assuming absent"
                );
                absent.push(record);
            }
        }
    }
    absent
}

/// Assign each record a delay of `index * stagger`, in input order.
pub fn plan(records: Vec<RespawnRecord>, stagger: Duration) -> Vec<RecoveryStep> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| RecoveryStep {
            record,
            delay: stagger.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use chrono::Utc;
    use respawn_types::{DeathReason, EntityHandle, EntityId, Lifespan, Location};

    use super::*;
    use crate::collaborators::LifecycleError;

    fn record(name: &str) -> RespawnRecord {
        RespawnRecord {
            entity_id: EntityId::new(),
            display_name: name.to_owned(),
            last_location: Location::new("world", 0.0, 64.0, 0.0),
            death_reason: Some(DeathReason::Environment),
            eligible: true,
            last_respawn_at: None,
            updated_at: Utc::now(),
        }
    }

    struct Presence {
        present: HashSet<EntityId>,
        broken: HashSet<EntityId>,
    }

    #[async_trait]
    impl EntityLifecycle for Presence {
        async fn remove_entity(&self, _: EntityId, _: DeathReason) -> Result<(), LifecycleError> {
            Ok(())
        }

        async fn create_entity(
            &self,
            name: &str,
            _: &Location,
            _: Lifespan,
        ) -> Result<EntityHandle, LifecycleError> {
            Err(LifecycleError::Rejected {
                message: format!("not creating {name}"),
            })
        }

        async fn is_present(&self, entity_id: EntityId) -> Result<bool, LifecycleError> {
            if self.broken.contains(&entity_id) {
                return Err(LifecycleError::Unavailable {
                    message: "presence check failed".to_owned(),
                });
            }
            Ok(self.present.contains(&entity_id))
        }
    }

    #[test]
    fn plan_staggers_from_zero() {
        let records = vec![record("a"), record("b"), record("c")];
        let delays: Vec<Duration> = plan(records, Duration::from_secs(2))
            .into_iter()
            .map(|step| step.delay)
            .collect();
        assert_eq!(
            delays,
            vec![Duration::ZERO, Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn present_entities_are_skipped() {
        let online = record("online");
        let offline = record("offline");
        let unknown = record("unknown");
        let lifecycle = Presence {
            present: HashSet::from([online.entity_id]),
            broken: HashSet::from([unknown.entity_id]),
        };

        let absent = find_absent(
            vec![online, offline.clone(), unknown.clone()],
            &lifecycle,
        )
        .await;
        assert_eq!(absent, vec![offline, unknown]);
    }
}
