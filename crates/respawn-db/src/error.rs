//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] errors or describes a row that could not be turned back into
//! a domain record.

use respawn_types::EntityId;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row holds a value the domain types cannot represent.
    #[error("Corrupt row for entity {entity_id}: {message}")]
    Corrupt {
        /// The entity the row belongs to.
        entity_id: EntityId,
        /// What is wrong with the row.
        message: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
