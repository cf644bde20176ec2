//! `PostgreSQL` persistence for managed-entity respawn records.
//!
//! One row per entity in `entity_respawn` holds the last known location,
//! the most recent death reason, whether a respawn is still owed, and the
//! cooldown stamp. The engine wraps [`RespawnStore`] in its `ProfileStore`
//! adapter; everything here speaks plain `sqlx`.
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool, configuration, migrations
//! - [`respawn_store`] -- Upsert, lookup, eligibility updates and recovery scan
//! - [`error`] -- Shared error types

pub mod error;
pub mod postgres;
pub mod respawn_store;

// Re-export primary types for convenience.
pub use error::DbError;
pub use postgres::{PostgresConfig, PostgresPool};
pub use respawn_store::{RespawnRow, RespawnStore};
