//! Death classification, eligibility, scheduling and orchestration for
//! automatically respawning managed entities.
//!
//! When a managed entity dies, the [`orchestrator`] classifies the death,
//! decides whether a respawn is owed, persists the decision, and schedules
//! the respawn at the entity's last known location. Records survive
//! restarts, and a one-shot recovery scan restores entities that were still
//! owed a respawn when the service last stopped.
//!
//! # Modules
//!
//! - [`classifier`] -- Pure mapping from death signals to a [`DeathReason`].
//! - [`clock`] -- Wall-clock abstraction with a manual clock for tests.
//! - [`collaborators`] -- Host-side traits: lifecycle, worlds, notifier.
//! - [`config`] -- Configuration loading from `respawn-config.yaml` into
//!   strongly-typed structs, plus the reloadable [`ConfigHandle`].
//! - [`cooldown`] -- Per-entity cooldown ledger.
//! - [`error`] -- [`RespawnError`].
//! - [`orchestrator`] -- The actor that ties everything together.
//! - [`policy`] -- Respawn eligibility evaluation.
//! - [`recovery`] -- Startup recovery planning.
//! - [`scheduler`] -- Delayed, cancellable per-entity timers.
//! - [`store`] -- [`ProfileStore`] trait and in-memory implementation.
//!
//! [`DeathReason`]: respawn_types::DeathReason
//! [`ConfigHandle`]: config::ConfigHandle
//! [`RespawnError`]: error::RespawnError
//! [`ProfileStore`]: store::ProfileStore

pub mod classifier;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod orchestrator;
pub mod policy;
pub mod recovery;
pub mod scheduler;
pub mod store;
mod store_worker;

pub use error::RespawnError;
pub use orchestrator::{Collaborators, OrchestratorHandle, RespawnPhase};
