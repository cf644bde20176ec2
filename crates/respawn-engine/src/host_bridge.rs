//! Feeds host events from NATS into the orchestrator.
//!
//! The bridge subscribes to every host event subject, decodes each message
//! with [`wire::decode_event`], and forwards it to the
//! [`OrchestratorHandle`]. Undecodable messages are logged and dropped.
//! The first `host.ready` starts the recovery scan.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt as _;
use futures::stream::select_all;
use respawn_core::clock::Clock;
use respawn_core::{OrchestratorHandle, RespawnError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::wire::{self, HostEvent};

const SUBJECTS: [&str; 5] = [wire::DEATH, wire::COMMAND_KILL, wire::LOCATION, wire::JOINED, wire::READY];

/// Subscribe to host events and forward them until the subscriptions end or
/// the orchestrator stops.
pub async fn run(
    client: async_nats::Client,
    handle: OrchestratorHandle,
    clock: Arc<dyn Clock>,
) -> Result<(), EngineError> {
    let mut subscriptions = Vec::with_capacity(SUBJECTS.len());
    for subject in SUBJECTS {
        let sub = client
            .subscribe(subject)
            .await
            .map_err(|e| EngineError::Nats {
                message: format!("failed to subscribe to {subject}: {e}"),
            })?;
        subscriptions.push(sub);
    }
    info!(subjects = ?SUBJECTS, "Host bridge subscribed");

    let mut events = select_all(subscriptions);
    while let Some(message) = events.next().await {
        let event = match wire::decode_event(message.subject.as_str(), &message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping host message");
                continue;
            }
        };
        if let Err(RespawnError::Closed) = dispatch(event, &handle, clock.as_ref()) {
            info!("Orchestrator stopped, host bridge exiting");
            return Ok(());
        }
    }

    warn!("Host event subscriptions ended");
    Ok(())
}

/// Forward one decoded event to the orchestrator.
pub fn dispatch(event: HostEvent, handle: &OrchestratorHandle, clock: &dyn Clock) -> Result<(), RespawnError> {
    match event {
        HostEvent::Death(signal) => {
            debug!(entity_id = %signal.entity_id, "Death reported");
            handle.report_death(*signal)
        }
        HostEvent::CommandKill(kill) => {
            let at = kill.at.unwrap_or_else(|| clock.now());
            handle.mark_command_kill(kill.entity_id, at)
        }
        HostEvent::Location(update) => {
            handle.track_location(update.entity_id, update.display_name, update.location)
        }
        HostEvent::Joined(joined) => handle.entity_joined(joined.entity_id),
        HostEvent::Ready => {
            info!("Host ready");
            handle.start_recovery()
        }
    }
}

/// Wait until `shutdown` completes or the bridge task ends, whichever comes
/// first. A bridge that ends on its own is logged; a failed one is returned.
pub async fn wait_for_exit<F>(
    bridge: &mut JoinHandle<Result<(), EngineError>>,
    shutdown: F,
) -> Result<(), EngineError>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        () = shutdown => Ok(()),
        outcome = bridge => match outcome {
            Ok(Ok(())) => {
                warn!("Host bridge stopped, shutting down");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "Host bridge failed, shutting down");
                Err(e)
            }
            Err(e) => {
                error!(error = %e, "Host bridge task ended abnormally, shutting down");
                Err(EngineError::Nats {
                    message: format!("host bridge task: {e}"),
                })
            }
        },
    }
}
