//! NATS subjects and JSON payloads exchanged with the host.
//!
//! # Subject Convention
//!
//! Host to service (events):
//!
//! - `host.entity.death` -- a [`DeathSignal`]
//! - `host.entity.command_kill` -- a [`CommandKillEvent`]
//! - `host.entity.location` -- a [`LocationEvent`]
//! - `host.entity.joined` -- a [`JoinedEvent`]
//! - `host.ready` -- empty; the host finished loading
//!
//! Service to host (request/reply, answered with a [`HostReply`]):
//!
//! - `host.entity.create`, `host.entity.remove`, `host.entity.present`,
//!   `host.world.resolve`
//!
//! Replies always carry a `value`; requests without a result answer
//! `{"status": "ok", "value": null}`.
//!
//! Service to operators: `respawn.notice.{entity_id}`.

use chrono::{DateTime, Utc};
use respawn_core::collaborators::LifecycleError;
use respawn_types::{DeathReason, DeathSignal, EntityId, Lifespan, Location};
use serde::{Deserialize, Serialize};

/// Death events.
pub const DEATH: &str = "host.entity.death";
/// Command-kill marks.
pub const COMMAND_KILL: &str = "host.entity.command_kill";
/// Location updates of living entities.
pub const LOCATION: &str = "host.entity.location";
/// Entities that came back by other means.
pub const JOINED: &str = "host.entity.joined";
/// Host readiness.
pub const READY: &str = "host.ready";

/// Create an entity.
pub const CREATE: &str = "host.entity.create";
/// Remove an entity.
pub const REMOVE: &str = "host.entity.remove";
/// Ask whether an entity is present.
pub const PRESENT: &str = "host.entity.present";
/// Resolve a world by name.
pub const RESOLVE_WORLD: &str = "host.world.resolve";

/// Subject a notice about `entity_id` is published on.
pub fn notice_subject(entity_id: EntityId) -> String {
    format!("respawn.notice.{entity_id}")
}

/// An operator command is about to kill the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandKillEvent {
    /// The entity.
    pub entity_id: EntityId,
    /// When the command ran. Defaults to the time the event is received.
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

/// A living entity moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationEvent {
    /// The entity.
    pub entity_id: EntityId,
    /// Its current display name.
    pub display_name: String,
    /// Where it is now.
    pub location: Location,
}

/// An entity is back in the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedEvent {
    /// The entity.
    pub entity_id: EntityId,
}

/// Payload of [`CREATE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Name to create the entity with.
    pub name: String,
    /// Where to create it.
    pub location: Location,
    /// How long it should live.
    pub lifespan: Lifespan,
}

/// Payload of [`REMOVE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveRequest {
    /// The entity to remove.
    pub entity_id: EntityId,
    /// Why it is being removed.
    pub reason: DeathReason,
}

/// Payload of [`PRESENT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRequest {
    /// The entity to look for.
    pub entity_id: EntityId,
}

/// Payload of [`RESOLVE_WORLD`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveWorldRequest {
    /// World name.
    pub name: String,
}

/// Classes of host-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostErrorKind {
    /// The host refused the request.
    Rejected,
    /// The requested name is taken.
    NameCollision,
}

/// The host's answer to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HostReply<T> {
    /// The request succeeded.
    Ok {
        /// The result.
        value: T,
    },
    /// The request failed.
    Error {
        /// Failure class.
        kind: HostErrorKind,
        /// Human-readable detail.
        message: String,
    },
}

impl<T> HostReply<T> {
    /// Convert into a lifecycle result. `name` fills in collision errors.
    pub fn into_result(self, name: &str) -> Result<T, LifecycleError> {
        match self {
            Self::Ok { value } => Ok(value),
            Self::Error {
                kind: HostErrorKind::Rejected,
                message,
            } => Err(LifecycleError::Rejected { message }),
            Self::Error {
                kind: HostErrorKind::NameCollision,
                ..
            } => Err(LifecycleError::NameCollision {
                name: name.to_owned(),
            }),
        }
    }
}

/// A decoded host event.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// A managed entity died.
    Death(Box<DeathSignal>),
    /// A command kill was issued.
    CommandKill(CommandKillEvent),
    /// A living entity moved.
    Location(LocationEvent),
    /// An entity rejoined.
    Joined(JoinedEvent),
    /// The host is ready.
    Ready,
}

/// Errors decoding a host event.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The subject is not one the bridge handles.
    #[error("unexpected subject `{0}`")]
    UnknownSubject(String),

    /// The payload is not valid JSON for the subject.
    #[error("invalid payload on `{subject}`: {source}")]
    Payload {
        /// The subject the payload arrived on.
        subject: String,
        /// The JSON error.
        source: serde_json::Error,
    },
}

/// Decode a payload received on `subject`.
pub fn decode_event(subject: &str, payload: &[u8]) -> Result<HostEvent, DecodeError> {
    let json_err = |source| DecodeError::Payload {
        subject: subject.to_owned(),
        source,
    };
    match subject {
        DEATH => serde_json::from_slice(payload)
            .map(|signal| HostEvent::Death(Box::new(signal)))
            .map_err(json_err),
        COMMAND_KILL => serde_json::from_slice(payload)
            .map(HostEvent::CommandKill)
            .map_err(json_err),
        LOCATION => serde_json::from_slice(payload)
            .map(HostEvent::Location)
            .map_err(json_err),
        JOINED => serde_json::from_slice(payload)
            .map(HostEvent::Joined)
            .map_err(json_err),
        READY => Ok(HostEvent::Ready),
        other => Err(DecodeError::UnknownSubject(other.to_owned())),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use respawn_types::DamageCause;

    use super::*;

    #[test]
    fn decodes_death_signal() {
        let payload = br#"{
            "entity_id": "0190a7f2-3c44-7d1e-8a5b-2f6c9e0d1a2b",
            "display_name": "Bob",
            "cause": "ENTITY_ATTACK",
            "message": "Bob was slain by Zombie",
            "observed_at": "2026-03-01T12:00:00Z",
            "location": {"world": "world", "x": 1.0, "y": 64.0, "z": 2.0, "yaw": 0.0, "pitch": 0.0}
        }"#;
        match decode_event(DEATH, payload) {
            Ok(HostEvent::Death(signal)) => {
                assert_eq!(signal.display_name, "Bob");
                assert_eq!(signal.cause, Some(DamageCause::EntityAttack));
            }
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn command_kill_time_is_optional() {
        let payload = br#"{"entity_id": "0190a7f2-3c44-7d1e-8a5b-2f6c9e0d1a2b"}"#;
        match decode_event(COMMAND_KILL, payload) {
            Ok(HostEvent::CommandKill(event)) => assert!(event.at.is_none()),
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn ready_ignores_payload() {
        assert!(matches!(decode_event(READY, b""), Ok(HostEvent::Ready)));
    }

    #[test]
    fn rejects_bad_payload_and_unknown_subject() {
        assert!(matches!(
            decode_event(JOINED, b"not json"),
            Err(DecodeError::Payload { .. })
        ));
        assert!(matches!(
            decode_event("host.entity.sneeze", b"{}"),
            Err(DecodeError::UnknownSubject(_))
        ));
    }

    #[test]
    fn host_reply_maps_to_lifecycle_errors() {
        let ok: HostReply<bool> = serde_json::from_str(r#"{"status": "ok", "value": true}"#)
            .unwrap_or(HostReply::Ok { value: false });
        assert_eq!(ok.into_result("Bob"), Ok(true));

        let taken: Result<HostReply<bool>, _> = serde_json::from_str(
            r#"{"status": "error", "kind": "name_collision", "message": "taken"}"#,
        );
        assert_eq!(
            taken.ok().map(|reply| reply.into_result("Bob")),
            Some(Err(LifecycleError::NameCollision {
                name: "Bob".to_owned()
            }))
        );
    }
}
