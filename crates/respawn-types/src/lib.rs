//! Shared type definitions for the managed-entity respawn service.
//!
//! Every crate in the workspace speaks in these types: the host bridge
//! decodes them off the wire, the core classifies and schedules with them,
//! and the data layer persists them.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for entity identifiers
//! - [`enums`] -- Death reasons, structured damage causes, lifespans
//! - [`structs`] -- Locations, death signals, respawn records, entity handles

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{DamageCause, DeathReason, Lifespan, UnknownDeathReason};
pub use ids::EntityId;
pub use structs::{DeathSignal, EntityHandle, Location, RespawnRecord};
