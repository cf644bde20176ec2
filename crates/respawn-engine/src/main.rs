//! Respawn engine binary.
//!
//! Wires the respawn orchestrator to its production collaborators: the
//! `PostgreSQL` profile store, the host plugin over NATS, and NATS operator
//! notices.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `$RESPAWN_CONFIG` or `respawn-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `PostgreSQL` and run migrations
//! 4. Connect to NATS
//! 5. Spawn the orchestrator and the host bridge
//! 6. Reload configuration on `SIGHUP`
//! 7. Shut down on Ctrl-C, or when the host bridge stops

mod error;
mod host_bridge;
mod nats_host;
mod notifier;
mod profile_store;
mod wire;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use respawn_core::clock::{Clock, SystemClock};
use respawn_core::collaborators::EntityLifecycle;
use respawn_core::config::{ConfigHandle, RespawnConfig};
use respawn_core::orchestrator;
use respawn_core::Collaborators;
use respawn_db::{PostgresConfig, PostgresPool};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::nats_host::NatsHost;
use crate::notifier::NatsNotifier;
use crate::profile_store::PostgresProfileStore;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "respawn-config.yaml";

/// Application entry point for the respawn engine.
///
/// # Errors
///
/// Returns an error if configuration, the database, or NATS cannot be set
/// up, or if the host bridge fails while running.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = config_path();
    let config = load_config(&config_path)?;

    // 2. Initialize structured logging. RUST_LOG wins over the config file.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!(
        path = %config_path.display(),
        enabled = config.auto_respawn.enabled,
        respawn_delay_secs = config.auto_respawn.respawn_delay_secs,
        cooldown_secs = config.auto_respawn.cooldown_secs,
        "respawn-engine starting"
    );

    // 3. Connect to PostgreSQL.
    let pool = PostgresPool::connect(&PostgresConfig::new(&config.infrastructure.postgres_url))
        .await
        .map_err(EngineError::from)?;
    pool.run_migrations().await.map_err(EngineError::from)?;
    info!("PostgreSQL connected and migrated");

    // 4. Connect to NATS.
    let nats_url = &config.infrastructure.nats_url;
    info!(nats_url = nats_url, "Connecting to NATS");
    let client = async_nats::connect(nats_url)
        .await
        .map_err(|e| EngineError::Nats {
            message: format!("{e}"),
        })?;
    info!("NATS connected");

    // 5. Spawn the orchestrator and the host bridge.
    let host = Arc::new(NatsHost::new(
        client.clone(),
        config.infrastructure.host_request_timeout(),
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let collaborators = Collaborators {
        store: Arc::new(PostgresProfileStore::new(pool.clone())),
        lifecycle: Arc::clone(&host) as Arc<dyn EntityLifecycle>,
        worlds: host,
        notifier: Arc::new(NatsNotifier::new(client.clone())),
        clock: Arc::clone(&clock),
    };
    let (handle, config_handle, orchestrator_task) = orchestrator::spawn_with_config(config, collaborators);

    let mut bridge = tokio::spawn(host_bridge::run(client, handle.clone(), clock));

    // 6. Reload configuration on SIGHUP.
    #[cfg(unix)]
    let reloader = tokio::spawn(reload_on_sighup(config_path, config_handle));

    // 7. Run until Ctrl-C or until the host bridge stops.
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C, shutting down");
        }
        info!("Shutdown requested");
    };
    let exit = host_bridge::wait_for_exit(&mut bridge, shutdown).await;

    if let Err(e) = handle.shutdown() {
        warn!(error = %e, "Orchestrator already stopped");
    }
    bridge.abort();
    #[cfg(unix)]
    reloader.abort();
    if let Err(e) = orchestrator_task.await {
        warn!(error = %e, "Orchestrator task ended abnormally");
    }
    pool.close().await;

    info!("respawn-engine shutdown complete");
    exit.map_err(Into::into)
}

/// `$RESPAWN_CONFIG` when set, else [`DEFAULT_CONFIG_PATH`].
fn config_path() -> PathBuf {
    std::env::var_os("RESPAWN_CONFIG").map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load configuration, falling back to defaults when the file is missing.
fn load_config(path: &Path) -> Result<RespawnConfig, EngineError> {
    if path.exists() {
        Ok(RespawnConfig::from_file(path)?)
    } else {
        // Logging is not up yet.
        eprintln!("config file {} not found, using defaults", path.display());
        Ok(RespawnConfig::parse("")?)
    }
}

/// Re-read the config file on every `SIGHUP`. A file that fails to load
/// leaves the current configuration in place.
#[cfg(unix)]
async fn reload_on_sighup(path: PathBuf, handle: ConfigHandle) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGHUP handler, config reload disabled");
            return;
        }
    };
    while hangups.recv().await.is_some() {
        match handle.reload(&path) {
            Ok(()) => {
                let config = handle.snapshot();
                info!(
                    enabled = config.auto_respawn.enabled,
                    respawn_delay_secs = config.auto_respawn.respawn_delay_secs,
                    cooldown_secs = config.auto_respawn.cooldown_secs,
                    "Configuration reloaded"
                );
            }
            Err(e) => warn!(error = %e, "Config reload failed, keeping current configuration"),
        }
    }
}
