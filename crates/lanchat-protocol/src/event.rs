//! Events exchanged between the chat server and its clients
//!
//! # Wire schema
//!
//! Each frame payload is a UTF-8 JSON object:
//!
//! ```text
//! {"v":1,"kind":"auth_success","username":"alice",
//!  "message":{"initiator":"System","from":"System","content":"...","timestamp":1700000000000}}
//! ```
//!
//! - `v`: schema version, currently [`PROTOCOL_VERSION`]
//! - `kind`: one of `auth`, `auth_success`, `auth_reject`, `broadcast`, `error`
//! - `message`: required for every kind except `auth`
//! - `username`: required for `auth_success`, absent otherwise
//!
//! # Handshake
//!
//! 1. Client sends `auth` without a message, server answers `auth` with a prompt
//! 2. Client sends `auth` carrying the chosen name
//! 3. Server answers `auth` (re-prompt), `auth_reject` (banned, connection closes)
//!    or `auth_success`
//! 4. Afterwards both sides exchange `broadcast` events

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::message::Message;

/// Current schema version written into every payload
pub const PROTOCOL_VERSION: u16 = 1;

/// Event kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Auth,
    AuthSuccess,
    AuthReject,
    Broadcast,
    Error,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Auth => "auth",
            EventKind::AuthSuccess => "auth_success",
            EventKind::AuthReject => "auth_reject",
            EventKind::Broadcast => "broadcast",
            EventKind::Error => "error",
        };
        f.write_str(name)
    }
}

/// Protocol events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Authentication request (client) or prompt (server)
    Auth { message: Option<Message> },

    /// Authentication accepted
    AuthSuccess {
        /// Name the server registered the session under
        username: String,
        /// Welcome text
        message: Message,
    },

    /// Authentication refused; the server closes the connection after sending
    AuthReject { message: Message },

    /// Chat message fan-out
    Broadcast { message: Message },

    /// Request could not be handled
    Error { message: Message },
}

/// Flat on-the-wire representation
#[derive(Debug, Serialize, Deserialize)]
struct WireEvent {
    v: u16,
    kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
}

#[derive(Deserialize)]
struct VersionTag {
    v: u16,
}

impl Event {
    /// Prompt or request without a message
    pub fn auth() -> Self {
        Event::Auth { message: None }
    }

    /// `auth` carrying a message
    pub fn auth_with(message: Message) -> Self {
        Event::Auth {
            message: Some(message),
        }
    }

    /// `broadcast` carrying a message
    pub fn broadcast(message: Message) -> Self {
        Event::Broadcast { message }
    }

    /// `error` with a system notice
    pub fn error(content: impl Into<String>) -> Self {
        Event::Error {
            message: Message::system(content),
        }
    }

    /// Get the kind tag for this event
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Auth { .. } => EventKind::Auth,
            Event::AuthSuccess { .. } => EventKind::AuthSuccess,
            Event::AuthReject { .. } => EventKind::AuthReject,
            Event::Broadcast { .. } => EventKind::Broadcast,
            Event::Error { .. } => EventKind::Error,
        }
    }

    /// The message carried by this event, if any
    pub fn message(&self) -> Option<&Message> {
        match self {
            Event::Auth { message } => message.as_ref(),
            Event::AuthSuccess { message, .. }
            | Event::AuthReject { message }
            | Event::Broadcast { message }
            | Event::Error { message } => Some(message),
        }
    }

    /// Serialize into a frame payload
    pub fn to_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        let (message, username) = match self {
            Event::Auth { message } => (message.clone(), None),
            Event::AuthSuccess { username, message } => {
                (Some(message.clone()), Some(username.clone()))
            }
            Event::AuthReject { message }
            | Event::Broadcast { message }
            | Event::Error { message } => (Some(message.clone()), None),
        };

        let wire = WireEvent {
            v: PROTOCOL_VERSION,
            kind: self.kind(),
            message,
            username,
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    /// Deserialize from a frame payload
    pub fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        let tag: VersionTag = serde_json::from_slice(payload)?;
        if tag.v != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(tag.v));
        }

        let wire: WireEvent = serde_json::from_slice(payload)?;
        let kind = wire.kind;
        let require_message = |message: Option<Message>| {
            message.ok_or(ProtocolError::MissingField {
                kind,
                field: "message",
            })
        };

        let event = match kind {
            EventKind::Auth => Event::Auth {
                message: wire.message,
            },
            EventKind::AuthSuccess => Event::AuthSuccess {
                username: wire.username.ok_or(ProtocolError::MissingField {
                    kind,
                    field: "username",
                })?,
                message: require_message(wire.message)?,
            },
            EventKind::AuthReject => Event::AuthReject {
                message: require_message(wire.message)?,
            },
            EventKind::Broadcast => Event::Broadcast {
                message: require_message(wire.message)?,
            },
            EventKind::Error => Event::Error {
                message: require_message(wire.message)?,
            },
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Initiator;

    #[test]
    fn test_payload_roundtrip_every_kind() {
        let msg = Message::at(Initiator::User, "alice", "hi", 1);
        for event in [
            Event::auth(),
            Event::auth_with(msg.clone()),
            Event::AuthSuccess {
                username: "alice".to_string(),
                message: msg.clone(),
            },
            Event::AuthReject {
                message: msg.clone(),
            },
            Event::broadcast(msg.clone()),
            Event::Error { message: msg },
        ] {
            let payload = event.to_payload().unwrap();
            assert_eq!(Event::from_payload(&payload).unwrap(), event);
        }
    }

    #[test]
    fn test_wire_shape() {
        let payload = Event::auth().to_payload().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["v"], 1);
        assert_eq!(value["kind"], "auth");
        assert!(value.get("message").is_none());
        assert!(value.get("username").is_none());
    }

    #[test]
    fn test_missing_required_field() {
        let payload = br#"{"v":1,"kind":"broadcast"}"#;
        let err = Event::from_payload(payload).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MissingField {
                kind: EventKind::Broadcast,
                field: "message"
            }
        ));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_auth_success_requires_username() {
        let payload = br#"{"v":1,"kind":"auth_success","message":{"initiator":"System","from":"System","content":"hi","timestamp":0}}"#;
        assert!(matches!(
            Event::from_payload(payload),
            Err(ProtocolError::MissingField {
                field: "username",
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let payload = br#"{"v":1,"kind":"exec"}"#;
        assert!(matches!(
            Event::from_payload(payload),
            Err(ProtocolError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let payload = br#"{"v":2,"kind":"auth"}"#;
        assert!(matches!(
            Event::from_payload(payload),
            Err(ProtocolError::UnsupportedVersion(2))
        ));
    }
}
