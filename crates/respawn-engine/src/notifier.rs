//! Operator notices published to NATS.

use respawn_core::collaborators::{Notice, Notifier, TracingNotifier};
use tracing::warn;

use crate::wire;

/// Logs every notice and publishes it as JSON on `respawn.notice.{entity_id}`.
///
/// Publishing happens on a spawned task so the orchestrator never waits on
/// the network.
#[derive(Clone)]
pub struct NatsNotifier {
    client: async_nats::Client,
}

impl NatsNotifier {
    /// Wrap a connected client.
    pub const fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

impl Notifier for NatsNotifier {
    fn notify(&self, notice: Notice) {
        let subject = wire::notice_subject(notice.entity_id());
        let payload = match serde_json::to_vec(&notice) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, subject, "Failed to encode notice");
                return;
            }
        };
        TracingNotifier.notify(notice);

        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                warn!(error = %e, subject, "Failed to publish notice");
            }
        });
    }
}
