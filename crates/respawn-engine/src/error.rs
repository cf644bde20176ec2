//! Error types for the respawn engine binary.

/// Top-level error for the respawn engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: respawn_core::config::ConfigError,
    },

    /// Database connection or migration failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying data-layer error.
        #[from]
        source: respawn_db::DbError,
    },

    /// The orchestrator stopped unexpectedly.
    #[error("orchestrator error: {source}")]
    Orchestrator {
        /// The underlying orchestrator error.
        #[from]
        source: respawn_core::RespawnError,
    },

    /// NATS connection or messaging failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },
}
