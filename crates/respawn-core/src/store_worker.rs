//! Serialized access to the profile store.
//!
//! The orchestrator never awaits the store itself. It posts a
//! [`StoreRequest`] to a worker task that executes requests one at a time in
//! arrival order, so writes for the same entity cannot overtake each other.
//! Requests whose outcome matters to the orchestrator produce a
//! [`StoreReply`]; plain writes only log their failures.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use respawn_types::{DeathReason, EntityId, Location, RespawnRecord};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::policy::Eligibility;
use crate::scheduler::ScheduledTask;
use crate::store::{ProfileStore, StoreError};

/// What the orchestrator needs to finish handling a death once the record
/// has been written.
#[derive(Debug, Clone)]
pub(crate) struct DeathContext {
    pub record: RespawnRecord,
    pub eligibility: Eligibility,
    pub message: Option<String>,
}

/// Work for the store worker.
#[derive(Debug)]
pub(crate) enum StoreRequest {
    /// Write the record produced by a death.
    RecordDeath { death: Box<DeathContext> },
    /// Merge a fresh location into the entity's record, creating it if needed.
    RecordLocation {
        entity_id: EntityId,
        display_name: String,
        location: Location,
        at: DateTime<Utc>,
    },
    /// Flip eligibility on an existing record.
    SetEligibility {
        entity_id: EntityId,
        eligible: bool,
        reason: Option<DeathReason>,
        at: DateTime<Utc>,
    },
    /// Re-read the record right before a respawn.
    LoadForRespawn {
        entity_id: EntityId,
        task: ScheduledTask,
    },
    /// Delete the record.
    Delete { entity_id: EntityId, purpose: &'static str },
    /// Load everything still owed a respawn.
    LoadEligible,
}

/// Results the orchestrator waits for.
#[derive(Debug)]
pub(crate) enum StoreReply {
    DeathRecorded {
        death: Box<DeathContext>,
        result: Result<(), StoreError>,
    },
    LoadedForRespawn {
        entity_id: EntityId,
        task: ScheduledTask,
        result: Result<Option<RespawnRecord>, StoreError>,
    },
    EligibleLoaded {
        result: Result<Vec<RespawnRecord>, StoreError>,
    },
}

/// Start the worker. It stops once every request sender is dropped.
pub(crate) fn spawn(
    store: Arc<dyn ProfileStore>,
    replies: mpsc::UnboundedSender<StoreReply>,
) -> (mpsc::UnboundedSender<StoreRequest>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<StoreRequest>();
    let handle = tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            if let Some(reply) = execute(store.as_ref(), request).await {
                if replies.send(reply).is_err() {
                    tracing::debug!("Orchestrator gone, store worker stopping");
                    break;
                }
            }
        }
    });
    (tx, handle)
}

async fn execute(store: &dyn ProfileStore, request: StoreRequest) -> Option<StoreReply> {
    match request {
        StoreRequest::RecordDeath { death } => {
            let result = store.upsert(&death.record).await;
            Some(StoreReply::DeathRecorded { death, result })
        }
        StoreRequest::RecordLocation {
            entity_id,
            display_name,
            location,
            at,
        } => {
            if let Err(e) = record_location(store, entity_id, display_name, location, at).await {
                tracing::warn!(entity_id = %entity_id, error = %e, "Failed to persist location update");
            }
            None
        }
        StoreRequest::SetEligibility {
            entity_id,
            eligible,
            reason,
            at,
        } => {
            match store.set_eligibility(entity_id, eligible, reason, at).await {
                Ok(true) => {
                    tracing::debug!(entity_id = %entity_id, eligible, "Eligibility updated");
                }
                Ok(false) => {
                    tracing::trace!(entity_id = %entity_id, "No record to update eligibility on");
                }
                Err(e) => {
                    tracing::warn!(entity_id = %entity_id, eligible, error = %e, "Failed to update eligibility");
                }
            }
            None
        }
        StoreRequest::LoadForRespawn { entity_id, task } => {
            let result = store.get(entity_id).await;
            Some(StoreReply::LoadedForRespawn {
                entity_id,
                task,
                result,
            })
        }
        StoreRequest::Delete { entity_id, purpose } => {
            match store.delete(entity_id).await {
                Ok(existed) => {
                    tracing::debug!(entity_id = %entity_id, existed, purpose, "Respawn record deleted");
                }
                Err(e) => {
                    tracing::warn!(entity_id = %entity_id, purpose, error = %e, "Failed to delete respawn record");
                }
            }
            None
        }
        StoreRequest::LoadEligible => {
            let result = store.eligible_records().await;
            Some(StoreReply::EligibleLoaded { result })
        }
    }
}

/// Merge a location update into the stored record.
///
/// Keeps the death reason and cooldown stamp of an existing record. The
/// entity is alive, so the record becomes eligible for restoration.
async fn record_location(
    store: &dyn ProfileStore,
    entity_id: EntityId,
    display_name: String,
    location: Location,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let existing = store.get(entity_id).await?;
    let record = RespawnRecord {
        entity_id,
        display_name,
        last_location: location,
        death_reason: existing.as_ref().and_then(|r| r.death_reason),
        eligible: true,
        last_respawn_at: existing.and_then(|r| r.last_respawn_at),
        updated_at: at,
    };
    store.upsert(&record).await
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::store::InMemoryProfileStore;

    #[tokio::test]
    async fn requests_apply_in_order() {
        let store = InMemoryProfileStore::new();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
        let (tx, _worker) = spawn(Arc::new(store.clone()), reply_tx);
        let id = EntityId::new();
        let now = Utc::now();

        let sent = [
            tx.send(StoreRequest::RecordLocation {
                entity_id: id,
                display_name: "Bob".to_owned(),
                location: Location::new("world", 1.0, 2.0, 3.0),
                at: now,
            }),
            tx.send(StoreRequest::SetEligibility {
                entity_id: id,
                eligible: false,
                reason: Some(DeathReason::Command),
                at: now,
            }),
            tx.send(StoreRequest::LoadEligible),
        ];
        assert!(sent.iter().all(Result::is_ok));

        match reply_rx.recv().await {
            Some(StoreReply::EligibleLoaded { result }) => {
                assert_eq!(result.map(|records| records.len()), Ok(0));
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        let stored = store.get(id).await.ok().flatten();
        assert_eq!(stored.as_ref().map(|r| r.eligible), Some(false));
        assert_eq!(stored.and_then(|r| r.death_reason), Some(DeathReason::Command));
    }
}
