//! The respawn orchestrator.
//!
//! A single tokio task owns all mutable respawn state: the scheduler, the
//! cooldown ledger, the command-kill marks and the per-entity phase map.
//! Everything else talks to it through an [`OrchestratorHandle`], which
//! posts [`Command`]s to its mailbox. Store I/O goes through the store
//! worker; host calls run on spawned tasks. Both post their results back to
//! the same task, so no state is ever shared behind a lock.
//!
//! # Lifecycle of a death
//!
//! ```text
//! Alive -> Dying -> Eligible   -> Scheduled -> Respawning -> Alive
//!                                                          \-> FailedRetained
//!               \-> Ineligible
//! any pending phase -> Cancelled (command kill, operator cancel)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use respawn_types::{
    DeathReason, DeathSignal, EntityHandle, EntityId, Lifespan, Location, RespawnRecord,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::classifier;
use crate::clock::Clock;
use crate::collaborators::{EntityLifecycle, LifecycleError, Notice, Notifier, WorldProvider};
use crate::config::{ConfigHandle, RespawnConfig};
use crate::cooldown::{CooldownLedger, CooldownState};
use crate::error::RespawnError;
use crate::policy::{self, Eligibility};
use crate::recovery;
use crate::scheduler::{RespawnScheduler, ScheduledTask, TimerFired};
use crate::store::ProfileStore;
use crate::store_worker::{self, DeathContext, StoreReply, StoreRequest};

/// Where an entity is in the death/respawn cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RespawnPhase {
    /// In the world.
    Alive,
    /// Death reported, record being written.
    Dying,
    /// Approved for respawn, not yet scheduled.
    Eligible,
    /// Will not be respawned.
    Ineligible,
    /// A respawn task is pending.
    Scheduled,
    /// The host is re-creating the entity.
    Respawning,
    /// The last respawn attempt failed; the record is kept.
    FailedRetained,
    /// A pending respawn was called off.
    Cancelled,
}

impl RespawnPhase {
    /// Whether a death or respawn is in flight for the entity.
    pub const fn is_in_flight(self) -> bool {
        matches!(
            self,
            Self::Dying | Self::Eligible | Self::Scheduled | Self::Respawning
        )
    }
}

/// Where a scheduled task came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOrigin {
    /// Scheduled after a death.
    Death,
    /// Scheduled by the startup recovery scan.
    Recovery,
}

/// The host-side and persistence dependencies of the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    /// Durable respawn records.
    pub store: Arc<dyn ProfileStore>,
    /// Entity removal, creation and presence.
    pub lifecycle: Arc<dyn EntityLifecycle>,
    /// World lookup.
    pub worlds: Arc<dyn WorldProvider>,
    /// Operator notices.
    pub notifier: Arc<dyn Notifier>,
    /// Wall-clock time.
    pub clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Requests accepted by the orchestrator task.
#[derive(Debug)]
pub enum Command {
    /// A managed entity died.
    ReportDeath(Box<DeathSignal>),
    /// An operator command is about to kill the entity.
    MarkCommandKill {
        /// The entity.
        entity_id: EntityId,
        /// When the command was issued.
        at: DateTime<Utc>,
    },
    /// A living entity moved somewhere worth remembering.
    TrackLocation {
        /// The entity.
        entity_id: EntityId,
        /// Its current display name.
        display_name: String,
        /// Its new position.
        location: Location,
    },
    /// The entity is back in the world by other means.
    EntityJoined {
        /// The entity.
        entity_id: EntityId,
    },
    /// Operator cancellation: drop any pending respawn and the record.
    CancelRespawn {
        /// The entity.
        entity_id: EntityId,
    },
    /// The host is ready; run the recovery scan once.
    StartRecovery,
    /// Query an entity's phase.
    Status {
        /// The entity.
        entity_id: EntityId,
        /// Where to send the answer.
        reply: oneshot::Sender<Option<RespawnPhase>>,
    },
    /// Query all pending tasks.
    PendingTasks {
        /// Where to send the answer.
        reply: oneshot::Sender<Vec<ScheduledTask>>,
    },
    /// Cancel all timers and stop.
    Shutdown,
}

/// Cloneable handle to a running orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl OrchestratorHandle {
    fn send(&self, command: Command) -> Result<(), RespawnError> {
        self.commands.send(command).map_err(|_closed| RespawnError::Closed)
    }

    /// Report a death.
    pub fn report_death(&self, signal: DeathSignal) -> Result<(), RespawnError> {
        self.send(Command::ReportDeath(Box::new(signal)))
    }

    /// Mark the entity as killed by an operator command at `at`.
    pub fn mark_command_kill(&self, entity_id: EntityId, at: DateTime<Utc>) -> Result<(), RespawnError> {
        self.send(Command::MarkCommandKill { entity_id, at })
    }

    /// Record a living entity's location.
    pub fn track_location(
        &self,
        entity_id: EntityId,
        display_name: impl Into<String>,
        location: Location,
    ) -> Result<(), RespawnError> {
        self.send(Command::TrackLocation {
            entity_id,
            display_name: display_name.into(),
            location,
        })
    }

    /// Tell the orchestrator the entity is back in the world.
    pub fn entity_joined(&self, entity_id: EntityId) -> Result<(), RespawnError> {
        self.send(Command::EntityJoined { entity_id })
    }

    /// Cancel any pending respawn and forget the entity's record.
    pub fn cancel_respawn(&self, entity_id: EntityId) -> Result<(), RespawnError> {
        self.send(Command::CancelRespawn { entity_id })
    }

    /// Start the recovery scan. Only the first call has any effect.
    pub fn start_recovery(&self) -> Result<(), RespawnError> {
        self.send(Command::StartRecovery)
    }

    /// The entity's current phase, if the orchestrator has seen it.
    /// Settled entities are forgotten some minutes after their last change.
    pub async fn status(&self, entity_id: EntityId) -> Result<Option<RespawnPhase>, RespawnError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { entity_id, reply })?;
        rx.await.map_err(|_dropped| RespawnError::Closed)
    }

    /// All pending respawn tasks, earliest first.
    pub async fn pending_tasks(&self) -> Result<Vec<ScheduledTask>, RespawnError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::PendingTasks { reply })?;
        rx.await.map_err(|_dropped| RespawnError::Closed)
    }

    /// Stop the orchestrator, cancelling every pending respawn. Creations
    /// already in flight still complete on the host.
    pub fn shutdown(&self) -> Result<(), RespawnError> {
        self.send(Command::Shutdown)
    }
}

/// Results from spawned tasks and internal timers.
#[derive(Debug)]
enum Internal {
    Removed {
        entity_id: EntityId,
        result: Result<(), LifecycleError>,
    },
    Respawned {
        record: Box<RespawnRecord>,
        outcome: RespawnOutcome,
    },
    RecoveryDue,
    RecoveryPlanned {
        absent: Vec<RespawnRecord>,
    },
}

#[derive(Debug)]
enum RespawnOutcome {
    Created(EntityHandle),
    AlreadyPresent,
    Failed(RespawnError),
}

/// Start the orchestrator and its store worker.
///
/// Returns the handle used to talk to it and the join handle of the
/// orchestrator task, which completes after [`OrchestratorHandle::shutdown`]
/// or once every handle is dropped.
pub fn spawn(config: ConfigHandle, collaborators: Collaborators) -> (OrchestratorHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (replies_tx, replies_rx) = mpsc::unbounded_channel();
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let (store_tx, _store_worker) = store_worker::spawn(Arc::clone(&collaborators.store), replies_tx);

    let join = tokio::spawn(async move {
        let (scheduler, fired_rx) = RespawnScheduler::new();
        let orchestrator = Orchestrator {
            config,
            collaborators,
            scheduler,
            cooldowns: CooldownLedger::new(),
            command_marks: HashMap::new(),
            phases: HashMap::new(),
            recovery_started: false,
            store_tx,
            internal_tx,
        };
        orchestrator
            .run(commands_rx, fired_rx, replies_rx, internal_rx)
            .await;
    });

    (
        OrchestratorHandle {
            commands: commands_tx,
        },
        join,
    )
}

/// How often settled state is pruned.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

/// How long a settled phase stays queryable through `status`.
const SETTLED_RETENTION: Duration = Duration::from_secs(600);

/// The death currently being handled for an entity.
#[derive(Debug, Clone, Copy)]
struct RecentDeath {
    observed_at: DateTime<Utc>,
    reason: DeathReason,
    eligibility: Eligibility,
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    phase: RespawnPhase,
    since: DateTime<Utc>,
    death: Option<RecentDeath>,
}

struct Orchestrator {
    config: ConfigHandle,
    collaborators: Collaborators,
    scheduler: RespawnScheduler<TaskOrigin>,
    cooldowns: CooldownLedger,
    command_marks: HashMap<EntityId, DateTime<Utc>>,
    phases: HashMap<EntityId, Tracked>,
    recovery_started: bool,
    store_tx: mpsc::UnboundedSender<StoreRequest>,
    internal_tx: mpsc::UnboundedSender<Internal>,
}

impl Orchestrator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut fired: mpsc::UnboundedReceiver<TimerFired>,
        mut replies: mpsc::UnboundedReceiver<StoreReply>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        tracing::info!("Respawn orchestrator started");
        let mut housekeeping = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                Some(timer) = fired.recv() => self.on_timer(timer),
                Some(reply) = replies.recv() => self.on_store_reply(reply),
                Some(event) = internal.recv() => self.on_internal(event),
                _ = housekeeping.tick() => self.prune_settled(),
            }
        }
        let cancelled = self.scheduler.cancel_all();
        tracing::info!(cancelled, "Respawn orchestrator stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::ReportDeath(signal) => self.on_death(*signal),
            Command::MarkCommandKill { entity_id, at } => self.on_command_kill(entity_id, at),
            Command::TrackLocation {
                entity_id,
                display_name,
                location,
            } => self.on_location(entity_id, display_name, location),
            Command::EntityJoined { entity_id } => self.on_joined(entity_id),
            Command::CancelRespawn { entity_id } => self.on_cancel(entity_id),
            Command::StartRecovery => self.on_start_recovery(),
            Command::Status { entity_id, reply } => {
                let _ = reply.send(self.phase(entity_id));
            }
            Command::PendingTasks { reply } => {
                let _ = reply.send(self.scheduler.pending_tasks());
            }
            // Handled by the run loop.
            Command::Shutdown => {}
        }
    }

    // -------------------------------------------------------------------
    // Deaths
    // -------------------------------------------------------------------

    fn on_death(&mut self, signal: DeathSignal) {
        let entity_id = signal.entity_id;
        if let Some(phase) = self.phase(entity_id).filter(|p| p.is_in_flight()) {
            tracing::debug!(
                entity_id = %entity_id,
                phase = ?phase,
                "Death reported while a respawn is already in flight, ignoring"
            );
            return;
        }

        let config = self.config.snapshot();
        let now = self.collaborators.clock.now();
        self.cooldowns
            .prune(now, config.auto_respawn.cooldown_window());

        let mark = self.command_marks.get(&entity_id).copied();
        let reason = classifier::classify(&signal, mark, &config.classifier);
        self.prune_marks(now, config.classifier.command_debounce());
        let eligibility = policy::evaluate(
            entity_id,
            reason,
            now,
            &mut self.cooldowns,
            &config.auto_respawn,
        );

        tracing::info!(
            entity_id = %entity_id,
            name = %signal.display_name,
            reason = %reason,
            decision = %eligibility,
            "Managed entity died"
        );

        self.phases.insert(
            entity_id,
            Tracked {
                phase: RespawnPhase::Dying,
                since: now,
                death: Some(RecentDeath {
                    observed_at: signal.observed_at,
                    reason,
                    eligibility,
                }),
            },
        );
        let record = RespawnRecord {
            entity_id,
            display_name: signal.display_name,
            last_location: signal.location,
            death_reason: Some(reason),
            eligible: eligibility.is_eligible(),
            last_respawn_at: self.cooldowns.last_respawn_at(entity_id),
            updated_at: now,
        };
        self.request(StoreRequest::RecordDeath {
            death: Box::new(DeathContext {
                record,
                eligibility,
                message: signal.message,
            }),
        });
    }

    fn on_death_recorded(&mut self, death: DeathContext, result: Result<(), crate::store::StoreError>) {
        let entity_id = death.record.entity_id;
        let config = self.config.snapshot();

        match self.phase(entity_id) {
            Some(RespawnPhase::Dying) => {}
            Some(RespawnPhase::Cancelled) => {
                // A command kill landed while the record was being written.
                tracing::info!(entity_id = %entity_id, "Respawn cancelled before scheduling");
                if config.auto_respawn.remove_on_ineligible_death {
                    self.remove(entity_id, DeathReason::Command);
                }
                return;
            }
            other => {
                tracing::debug!(entity_id = %entity_id, phase = ?other, "Death superseded, nothing to do");
                return;
            }
        }

        // A command mark that landed after the death may have changed the
        // decision while the record was being written.
        let (reason, eligibility) = self
            .phases
            .get(&entity_id)
            .and_then(|tracked| tracked.death)
            .map_or_else(
                || {
                    (
                        death.record.death_reason.unwrap_or(DeathReason::Unknown),
                        death.eligibility,
                    )
                },
                |recent| (recent.reason, recent.eligibility),
            );

        if let Err(e) = result {
            tracing::warn!(
                entity_id = %entity_id,
                reason = %reason,
                error = %e,
                "Failed to persist death, treating as ineligible"
            );
            self.set_phase(entity_id, RespawnPhase::Ineligible);
            self.remove(entity_id, reason);
            if config.auto_respawn.notify_on_ineligible_death {
                self.collaborators.notifier.notify(Notice::Died {
                    entity_id,
                    display_name: death.record.display_name,
                    reason,
                    message: death.message,
                });
            }
            return;
        }

        if eligibility.is_eligible() {
            self.set_phase(entity_id, RespawnPhase::Eligible);
            self.remove(entity_id, reason);
            let delay = config.auto_respawn.respawn_delay();
            let handle = self.scheduler.schedule(entity_id, delay, TaskOrigin::Death);
            self.set_phase(entity_id, RespawnPhase::Scheduled);
            tracing::info!(
                entity_id = %entity_id,
                reason = %reason,
                delay_secs = delay.as_secs(),
                attempt = handle.task.attempt,
                "Respawn scheduled"
            );
            self.collaborators.notifier.notify(Notice::RespawnScheduled {
                entity_id,
                display_name: death.record.display_name,
                reason,
                delay_secs: delay.as_secs(),
            });
            return;
        }

        self.set_phase(entity_id, RespawnPhase::Ineligible);
        if config.auto_respawn.remove_on_ineligible_death {
            self.remove(entity_id, reason);
        } else {
            tracing::info!(entity_id = %entity_id, "Leaving ineligible entity in place");
        }
        if config.auto_respawn.notify_on_ineligible_death {
            let notice = match eligibility {
                Eligibility::CoolingDown { remaining } => Notice::CooldownBlocked {
                    entity_id,
                    display_name: death.record.display_name,
                    remaining_secs: remaining.as_secs(),
                },
                _ => Notice::Died {
                    entity_id,
                    display_name: death.record.display_name,
                    reason,
                    message: death.message,
                },
            };
            self.collaborators.notifier.notify(notice);
        }
    }

    // -------------------------------------------------------------------
    // Marks, locations, joins, cancellation
    // -------------------------------------------------------------------

    fn on_command_kill(&mut self, entity_id: EntityId, at: DateTime<Utc>) {
        let config = self.config.snapshot();
        let now = self.collaborators.clock.now();
        self.prune_marks(now, config.classifier.command_debounce());
        self.command_marks.insert(entity_id, at);

        if let Some(eligibility) = self.reclassify_as_command(entity_id, at, now, &config) {
            if eligibility.is_eligible() {
                tracing::info!(
                    entity_id = %entity_id,
                    "Death reclassified as command kill, respawn still allowed"
                );
                self.request(StoreRequest::SetEligibility {
                    entity_id,
                    eligible: true,
                    reason: Some(DeathReason::Command),
                    at: now,
                });
                return;
            }
            tracing::info!(
                entity_id = %entity_id,
                decision = %eligibility,
                "Death reclassified as command kill"
            );
        }

        let cancelled = self.scheduler.cancel(entity_id);
        if cancelled || self.phase(entity_id).is_some_and(RespawnPhase::is_in_flight) {
            self.set_phase(entity_id, RespawnPhase::Cancelled);
        }
        tracing::info!(
            entity_id = %entity_id,
            cancelled_pending = cancelled,
            "Marked as killed by command, will not auto-respawn"
        );
        self.request(StoreRequest::SetEligibility {
            entity_id,
            eligible: false,
            reason: Some(DeathReason::Command),
            at: now,
        });
    }

    /// Re-decide a death still being handled as a command kill, when the
    /// mark falls within the de-bounce window of that death.
    fn reclassify_as_command(
        &mut self,
        entity_id: EntityId,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
        config: &RespawnConfig,
    ) -> Option<Eligibility> {
        let Tracked { phase, death, .. } = *self.phases.get(&entity_id)?;
        if !matches!(phase, RespawnPhase::Dying | RespawnPhase::Scheduled) {
            return None;
        }
        let death = death?;
        if !classifier::within_debounce(at, death.observed_at, config.classifier.command_debounce()) {
            return None;
        }

        let eligibility = policy::reevaluate(
            entity_id,
            death.eligibility,
            DeathReason::Command,
            now,
            &mut self.cooldowns,
            &config.auto_respawn,
        );
        if let Some(tracked) = self.phases.get_mut(&entity_id) {
            tracked.death = Some(RecentDeath {
                reason: DeathReason::Command,
                eligibility,
                ..death
            });
        }
        Some(eligibility)
    }

    fn on_location(&mut self, entity_id: EntityId, display_name: String, location: Location) {
        let config = self.config.snapshot();
        if !config.auto_respawn.enabled || !config.auto_respawn.track_location_updates {
            return;
        }
        if self.phase(entity_id).is_some_and(RespawnPhase::is_in_flight) {
            tracing::debug!(entity_id = %entity_id, "Ignoring location update during respawn");
            return;
        }
        tracing::trace!(entity_id = %entity_id, location = %location, "Tracking location");
        self.set_phase(entity_id, RespawnPhase::Alive);
        self.request(StoreRequest::RecordLocation {
            entity_id,
            display_name,
            location,
            at: self.collaborators.clock.now(),
        });
    }

    fn on_joined(&mut self, entity_id: EntityId) {
        if self.scheduler.cancel(entity_id) {
            tracing::info!(entity_id = %entity_id, "Entity rejoined, pending respawn cancelled");
        }
        self.set_phase(entity_id, RespawnPhase::Alive);
        self.request(StoreRequest::SetEligibility {
            entity_id,
            eligible: false,
            reason: None,
            at: self.collaborators.clock.now(),
        });
    }

    fn on_cancel(&mut self, entity_id: EntityId) {
        let cancelled = self.scheduler.cancel(entity_id);
        tracing::info!(entity_id = %entity_id, cancelled_pending = cancelled, "Respawn cancelled by operator");
        self.set_phase(entity_id, RespawnPhase::Cancelled);
        self.request(StoreRequest::Delete {
            entity_id,
            purpose: "operator cancel",
        });
    }

    // -------------------------------------------------------------------
    // Firing
    // -------------------------------------------------------------------

    fn on_timer(&mut self, fired: TimerFired) {
        let Some((task, origin)) = self.scheduler.take_fired(fired) else {
            return;
        };
        tracing::debug!(entity_id = %task.entity_id, origin = ?origin, attempt = task.attempt, "Respawn timer fired");
        self.request(StoreRequest::LoadForRespawn {
            entity_id: task.entity_id,
            task,
        });
    }

    fn on_loaded_for_respawn(
        &mut self,
        entity_id: EntityId,
        task: ScheduledTask,
        result: Result<Option<RespawnRecord>, crate::store::StoreError>,
    ) {
        if self.phase(entity_id) != Some(RespawnPhase::Scheduled) {
            tracing::debug!(entity_id = %entity_id, "Respawn no longer wanted, skipping");
            return;
        }
        if self.scheduler.pending(entity_id).is_some() {
            // Rescheduled while the record was loading; the newer task wins.
            return;
        }

        let record = match result {
            Ok(Some(record)) if record.eligible => record,
            Ok(_) => {
                tracing::info!(entity_id = %entity_id, "No eligible record at fire time, skipping respawn");
                self.set_phase(entity_id, RespawnPhase::Cancelled);
                return;
            }
            Err(e) => {
                tracing::warn!(entity_id = %entity_id, error = %e, "Failed to load record for respawn");
                self.set_phase(entity_id, RespawnPhase::FailedRetained);
                return;
            }
        };

        tracing::info!(
            entity_id = %entity_id,
            name = %record.display_name,
            location = %record.last_location,
            attempt = task.attempt,
            "Respawning"
        );
        self.set_phase(entity_id, RespawnPhase::Respawning);

        let lifecycle = Arc::clone(&self.collaborators.lifecycle);
        let worlds = Arc::clone(&self.collaborators.worlds);
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = attempt_respawn(lifecycle.as_ref(), worlds.as_ref(), &record).await;
            let _ = internal.send(Internal::Respawned {
                record: Box::new(record),
                outcome,
            });
        });
    }

    fn on_respawned(&mut self, record: RespawnRecord, outcome: RespawnOutcome) {
        let entity_id = record.entity_id;
        match outcome {
            RespawnOutcome::Created(handle) => {
                tracing::info!(entity_id = %entity_id, name = %handle.display_name, "Respawned");
                self.set_phase(entity_id, RespawnPhase::Alive);
                self.command_marks.remove(&entity_id);
                self.request(StoreRequest::Delete {
                    entity_id,
                    purpose: "respawned",
                });
                self.collaborators.notifier.notify(Notice::RespawnSucceeded {
                    entity_id,
                    display_name: record.display_name,
                    location: record.last_location,
                });
            }
            RespawnOutcome::AlreadyPresent => {
                tracing::info!(entity_id = %entity_id, "Already present at fire time, skipping respawn");
                self.set_phase(entity_id, RespawnPhase::Alive);
                self.request(StoreRequest::SetEligibility {
                    entity_id,
                    eligible: false,
                    reason: None,
                    at: self.collaborators.clock.now(),
                });
            }
            RespawnOutcome::Failed(error) => {
                tracing::error!(entity_id = %entity_id, error = %error, "Respawn failed, keeping record");
                self.set_phase(entity_id, RespawnPhase::FailedRetained);
                self.collaborators.notifier.notify(Notice::RespawnFailed {
                    entity_id,
                    display_name: record.display_name,
                    error: error.to_string(),
                });
            }
        }
    }

    // -------------------------------------------------------------------
    // Recovery
    // -------------------------------------------------------------------

    fn on_start_recovery(&mut self) {
        if self.recovery_started {
            tracing::debug!("Recovery already started, ignoring");
            return;
        }
        self.recovery_started = true;
        let delay = self.config.snapshot().recovery.stabilization_delay();
        tracing::info!(delay_secs = delay.as_secs(), "Recovery scan scheduled");
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = internal.send(Internal::RecoveryDue);
        });
    }

    fn on_recovery_due(&mut self) {
        if !self.config.snapshot().auto_respawn.enabled {
            tracing::info!("Auto-respawn disabled, skipping recovery scan");
            return;
        }
        self.request(StoreRequest::LoadEligible);
    }

    fn on_eligible_loaded(&mut self, result: Result<Vec<RespawnRecord>, crate::store::StoreError>) {
        let records = match result {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load records for recovery");
                return;
            }
        };
        tracing::info!(count = records.len(), "Eligible records found for recovery");
        if records.is_empty() {
            return;
        }

        let lifecycle = Arc::clone(&self.collaborators.lifecycle);
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let absent = recovery::find_absent(records, lifecycle.as_ref()).await;
            let _ = internal.send(Internal::RecoveryPlanned { absent });
        });
    }

    fn on_recovery_planned(&mut self, absent: Vec<RespawnRecord>) {
        let candidates: Vec<RespawnRecord> = absent
            .into_iter()
            .filter(|record| {
                let busy = self
                    .phase(record.entity_id)
                    .is_some_and(RespawnPhase::is_in_flight);
                if busy {
                    tracing::debug!(entity_id = %record.entity_id, "Respawn already in flight, not recovering");
                }
                !busy
            })
            .collect();

        let stagger = self.config.snapshot().recovery.stagger();
        let steps = recovery::plan(candidates, stagger);
        let scheduled = steps.len();
        for step in steps {
            let entity_id = step.record.entity_id;
            if let Some(at) = step.record.last_respawn_at {
                self.cooldowns.seed(entity_id, at);
            }
            self.scheduler.schedule(entity_id, step.delay, TaskOrigin::Recovery);
            self.set_phase(entity_id, RespawnPhase::Scheduled);
            tracing::info!(
                entity_id = %entity_id,
                name = %step.record.display_name,
                delay_ms = step.delay.as_millis(),
                "Recovery respawn scheduled"
            );
        }
        tracing::info!(scheduled, "Recovery scan complete");
    }

    // -------------------------------------------------------------------
    // Plumbing
    // -------------------------------------------------------------------

    fn on_store_reply(&mut self, reply: StoreReply) {
        match reply {
            StoreReply::DeathRecorded { death, result } => self.on_death_recorded(*death, result),
            StoreReply::LoadedForRespawn {
                entity_id,
                task,
                result,
            } => self.on_loaded_for_respawn(entity_id, task, result),
            StoreReply::EligibleLoaded { result } => self.on_eligible_loaded(result),
        }
    }

    fn on_internal(&mut self, event: Internal) {
        match event {
            Internal::Removed { entity_id, result } => match result {
                Ok(()) => tracing::debug!(entity_id = %entity_id, "Dead entity removed"),
                Err(e) => tracing::warn!(entity_id = %entity_id, error = %e, "Failed to remove dead entity"),
            },
            Internal::Respawned { record, outcome } => self.on_respawned(*record, outcome),
            Internal::RecoveryDue => self.on_recovery_due(),
            Internal::RecoveryPlanned { absent } => self.on_recovery_planned(absent),
        }
    }

    fn phase(&self, entity_id: EntityId) -> Option<RespawnPhase> {
        self.phases.get(&entity_id).map(|tracked| tracked.phase)
    }

    /// Move the entity to `phase`. The death being handled is kept until
    /// the entity is alive again.
    fn set_phase(&mut self, entity_id: EntityId, phase: RespawnPhase) {
        let since = self.collaborators.clock.now();
        let tracked = self.phases.entry(entity_id).or_insert(Tracked {
            phase,
            since,
            death: None,
        });
        tracked.phase = phase;
        tracked.since = since;
        if phase == RespawnPhase::Alive {
            tracked.death = None;
        }
    }

    fn prune_marks(&mut self, now: DateTime<Utc>, window: Duration) {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        self.command_marks
            .retain(|_, at| now.signed_duration_since(*at).num_milliseconds() < window_ms);
    }

    /// Forget expired command marks and settled phases.
    fn prune_settled(&mut self) {
        let config = self.config.snapshot();
        let now = self.collaborators.clock.now();
        self.prune_marks(now, config.classifier.command_debounce());
        self.cooldowns.prune(now, config.auto_respawn.cooldown_window());

        let retention_ms = i64::try_from(SETTLED_RETENTION.as_millis()).unwrap_or(i64::MAX);
        let before = self.phases.len();
        self.phases.retain(|_, tracked| {
            tracked.phase.is_in_flight()
                || now.signed_duration_since(tracked.since).num_milliseconds() < retention_ms
        });
        let dropped = before.saturating_sub(self.phases.len());
        if dropped > 0 {
            tracing::debug!(dropped, tracked = self.phases.len(), "Pruned settled entities");
        }
    }

    fn request(&self, request: StoreRequest) {
        if self.store_tx.send(request).is_err() {
            tracing::error!("Store worker stopped, request dropped");
        }
    }

    fn remove(&self, entity_id: EntityId, reason: DeathReason) {
        let lifecycle = Arc::clone(&self.collaborators.lifecycle);
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = lifecycle.remove_entity(entity_id, reason).await;
            let _ = internal.send(Internal::Removed { entity_id, result });
        });
    }
}

/// Check presence, resolve the world, and create. Runs off the orchestrator task.
async fn attempt_respawn(
    lifecycle: &dyn EntityLifecycle,
    worlds: &dyn WorldProvider,
    record: &RespawnRecord,
) -> RespawnOutcome {
    match lifecycle.is_present(record.entity_id).await {
        Ok(true) => return RespawnOutcome::AlreadyPresent,
        Ok(false) => {}
        Err(e) => return RespawnOutcome::Failed(e.into()),
    }

    let world = &record.last_location.world;
    match worlds.resolve_world(world).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return RespawnOutcome::Failed(RespawnError::WorldUnavailable {
                world: world.clone(),
            });
        }
        Err(e) => return RespawnOutcome::Failed(e.into()),
    }

    match lifecycle
        .create_entity(&record.display_name, &record.last_location, Lifespan::Unlimited)
        .await
    {
        Ok(handle) => RespawnOutcome::Created(handle),
        Err(e) => RespawnOutcome::Failed(e.into()),
    }
}

/// Convenience for building a [`ConfigHandle`] and spawning in one call.
pub fn spawn_with_config(
    config: RespawnConfig,
    collaborators: Collaborators,
) -> (OrchestratorHandle, ConfigHandle, JoinHandle<()>) {
    let handle = ConfigHandle::new(config);
    let (orchestrator, join) = spawn(handle.clone(), collaborators);
    (orchestrator, handle, join)
}
