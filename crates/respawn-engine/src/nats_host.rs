//! Host collaborators over NATS request/reply.
//!
//! [`NatsHost`] implements [`EntityLifecycle`] and [`WorldProvider`] by
//! sending JSON requests on the `host.*` subjects (see [`crate::wire`]) and
//! waiting for a [`HostReply`] within the configured timeout. A request that
//! times out or cannot be delivered surfaces as
//! [`LifecycleError::Unavailable`].

use std::time::Duration;

use async_trait::async_trait;
use respawn_core::collaborators::{EntityLifecycle, LifecycleError, WorldProvider, WorldRef};
use respawn_types::{DeathReason, EntityHandle, EntityId, Lifespan, Location};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::wire::{self, CreateRequest, HostReply, PresenceRequest, RemoveRequest, ResolveWorldRequest};

/// Talks to the host plugin over NATS.
#[derive(Clone)]
pub struct NatsHost {
    client: async_nats::Client,
    timeout: Duration,
}

impl NatsHost {
    /// Wrap a connected client.
    pub const fn new(client: async_nats::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn request<Req, Resp>(
        &self,
        subject: &'static str,
        body: &Req,
    ) -> Result<HostReply<Resp>, LifecycleError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body).map_err(|e| LifecycleError::Rejected {
            message: format!("failed to encode request: {e}"),
        })?;

        debug!(subject, "Sending host request");
        let message = tokio::time::timeout(self.timeout, self.client.request(subject, payload.into()))
            .await
            .map_err(|_elapsed| LifecycleError::Unavailable {
                message: format!("no reply on {subject} within {}ms", self.timeout.as_millis()),
            })?
            .map_err(|e| LifecycleError::Unavailable {
                message: format!("request on {subject} failed: {e}"),
            })?;

        serde_json::from_slice(&message.payload).map_err(|e| LifecycleError::Rejected {
            message: format!("malformed reply on {subject}: {e}"),
        })
    }
}

#[async_trait]
impl EntityLifecycle for NatsHost {
    async fn remove_entity(&self, entity_id: EntityId, reason: DeathReason) -> Result<(), LifecycleError> {
        let reply: HostReply<()> = self
            .request(wire::REMOVE, &RemoveRequest { entity_id, reason })
            .await?;
        reply.into_result("")
    }

    async fn create_entity(
        &self,
        name: &str,
        location: &Location,
        lifespan: Lifespan,
    ) -> Result<EntityHandle, LifecycleError> {
        let request = CreateRequest {
            name: name.to_owned(),
            location: location.clone(),
            lifespan,
        };
        let reply: HostReply<EntityHandle> = self.request(wire::CREATE, &request).await?;
        reply.into_result(name)
    }

    async fn is_present(&self, entity_id: EntityId) -> Result<bool, LifecycleError> {
        let reply: HostReply<bool> = self
            .request(wire::PRESENT, &PresenceRequest { entity_id })
            .await?;
        reply.into_result("")
    }
}

#[async_trait]
impl WorldProvider for NatsHost {
    async fn resolve_world(&self, name: &str) -> Result<Option<WorldRef>, LifecycleError> {
        let request = ResolveWorldRequest {
            name: name.to_owned(),
        };
        let reply: HostReply<Option<WorldRef>> = self.request(wire::RESOLVE_WORLD, &request).await?;
        reply.into_result(name)
    }
}
