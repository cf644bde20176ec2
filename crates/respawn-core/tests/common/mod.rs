//! Shared fakes for orchestrator integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use respawn_core::clock::ManualClock;
use respawn_core::collaborators::{
    EntityLifecycle, LifecycleError, Notice, Notifier, WorldProvider, WorldRef,
};
use respawn_core::config::{ConfigHandle, RespawnConfig};
use respawn_core::orchestrator::{self, Collaborators, OrchestratorHandle};
use respawn_core::store::{InMemoryProfileStore, ProfileStore, StoreError};
use respawn_types::{
    DamageCause, DeathReason, DeathSignal, EntityHandle, EntityId, Lifespan, Location,
    RespawnRecord,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A create call the fake host received.
#[derive(Debug, Clone)]
pub struct Created {
    pub name: String,
    pub location: Location,
    pub lifespan: Lifespan,
    pub at: Instant,
}

/// Fake host recording every lifecycle call.
#[derive(Debug, Default)]
pub struct FakeHost {
    pub present: Mutex<HashSet<EntityId>>,
    pub removed: Mutex<Vec<(EntityId, DeathReason)>>,
    pub created: Mutex<Vec<Created>>,
    pub create_error: Mutex<Option<LifecycleError>>,
}

impl FakeHost {
    pub fn created(&self) -> Vec<Created> {
        self.created.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<(EntityId, DeathReason)> {
        self.removed.lock().unwrap().clone()
    }

    pub fn set_present(&self, entity_id: EntityId) {
        self.present.lock().unwrap().insert(entity_id);
    }

    pub fn fail_creates_with(&self, error: LifecycleError) {
        *self.create_error.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl EntityLifecycle for FakeHost {
    async fn remove_entity(
        &self,
        entity_id: EntityId,
        reason: DeathReason,
    ) -> Result<(), LifecycleError> {
        self.removed.lock().unwrap().push((entity_id, reason));
        self.present.lock().unwrap().remove(&entity_id);
        Ok(())
    }

    async fn create_entity(
        &self,
        name: &str,
        location: &Location,
        lifespan: Lifespan,
    ) -> Result<EntityHandle, LifecycleError> {
        if let Some(error) = self.create_error.lock().unwrap().clone() {
            return Err(error);
        }
        self.created.lock().unwrap().push(Created {
            name: name.to_owned(),
            location: location.clone(),
            lifespan,
            at: Instant::now(),
        });
        Ok(EntityHandle {
            entity_id: EntityId::new(),
            display_name: name.to_owned(),
        })
    }

    async fn is_present(&self, entity_id: EntityId) -> Result<bool, LifecycleError> {
        Ok(self.present.lock().unwrap().contains(&entity_id))
    }
}

/// Worlds that can be loaded and unloaded by the test.
#[derive(Debug)]
pub struct FakeWorlds {
    pub loaded: Mutex<HashSet<String>>,
}

impl FakeWorlds {
    pub fn with(names: &[&str]) -> Self {
        Self {
            loaded: Mutex::new(names.iter().map(|n| (*n).to_owned()).collect()),
        }
    }

    pub fn unload(&self, name: &str) {
        self.loaded.lock().unwrap().remove(name);
    }
}

#[async_trait]
impl WorldProvider for FakeWorlds {
    async fn resolve_world(&self, name: &str) -> Result<Option<WorldRef>, LifecycleError> {
        Ok(self
            .loaded
            .lock()
            .unwrap()
            .contains(name)
            .then(|| WorldRef {
                name: name.to_owned(),
            }))
    }
}

/// Collects every notice.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

/// A store that is always down.
#[derive(Debug, Default)]
pub struct FailingStore;

fn down() -> StoreError {
    StoreError::Unavailable {
        message: "database offline".to_owned(),
    }
}

#[async_trait]
impl ProfileStore for FailingStore {
    async fn upsert(&self, _: &RespawnRecord) -> Result<(), StoreError> {
        Err(down())
    }

    async fn get(&self, _: EntityId) -> Result<Option<RespawnRecord>, StoreError> {
        Err(down())
    }

    async fn delete(&self, _: EntityId) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn set_eligibility(
        &self,
        _: EntityId,
        _: bool,
        _: Option<DeathReason>,
        _: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn eligible_records(&self) -> Result<Vec<RespawnRecord>, StoreError> {
        Err(down())
    }
}

/// A running orchestrator wired to fakes.
pub struct Harness {
    pub handle: OrchestratorHandle,
    pub config: ConfigHandle,
    pub store: InMemoryProfileStore,
    pub host: Arc<FakeHost>,
    pub worlds: Arc<FakeWorlds>,
    pub notices: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    pub join: JoinHandle<()>,
}

pub fn start_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Config with auto-respawn on and library defaults otherwise.
pub fn enabled_config() -> RespawnConfig {
    let mut config = RespawnConfig::default();
    config.auto_respawn.enabled = true;
    config
}

pub fn start(config: RespawnConfig) -> Harness {
    start_inner(config, None, InMemoryProfileStore::new())
}

pub fn start_with_records(config: RespawnConfig, store: InMemoryProfileStore) -> Harness {
    start_inner(config, None, store)
}

pub fn start_with_store(config: RespawnConfig, store: Arc<dyn ProfileStore>) -> Harness {
    start_inner(config, Some(store), InMemoryProfileStore::new())
}

fn start_inner(
    config: RespawnConfig,
    override_store: Option<Arc<dyn ProfileStore>>,
    store: InMemoryProfileStore,
) -> Harness {
    let host = Arc::new(FakeHost::default());
    let worlds = Arc::new(FakeWorlds::with(&["world", "world_nether"]));
    let notices = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(ManualClock::new(start_instant()));
    let collaborators = Collaborators {
        store: override_store.unwrap_or_else(|| Arc::new(store.clone())),
        lifecycle: host.clone(),
        worlds: worlds.clone(),
        notifier: notices.clone(),
        clock: clock.clone(),
    };
    let (handle, config, join) = orchestrator::spawn_with_config(config, collaborators);
    Harness {
        handle,
        config,
        store,
        host,
        worlds,
        notices,
        clock,
        join,
    }
}

/// Let every task that can make progress without time passing do so.
pub async fn settle() {
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

pub fn death_signal(
    entity_id: EntityId,
    cause: Option<DamageCause>,
    message: &str,
    observed_at: DateTime<Utc>,
) -> DeathSignal {
    DeathSignal {
        entity_id,
        display_name: "Bob".to_owned(),
        cause,
        message: Some(message.to_owned()),
        observed_at,
        location: Location::new("world", 120.5, 64.0, -33.5).facing(180.0, 10.0),
    }
}

pub fn eligible_record(name: &str, updated_at: DateTime<Utc>) -> RespawnRecord {
    RespawnRecord {
        entity_id: EntityId::new(),
        display_name: name.to_owned(),
        last_location: Location::new("world", 10.0, 70.0, 10.0),
        death_reason: Some(DeathReason::HostileMob),
        eligible: true,
        last_respawn_at: None,
        updated_at,
    }
}
