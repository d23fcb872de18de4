//! Client side of the sign-in handshake
//!
//! The handshake is a pure state machine: [`Handshake::request`] builds the
//! event to send for the current phase and [`Handshake::on_reply`] applies
//! the server's answer. The client drives it over the socket one round trip
//! at a time.
//!
//! ```text
//! Connecting --prompt--> AwaitingUsername --auth_success--> Authenticated
//!     |                    |    ^
//!     |                    +----+ re-prompt
//!     +--------------------+--auth_reject--> Rejected
//!     +--------------------+--closed-------> Disconnected
//! ```

use std::fmt;

use lanchat_protocol::{Event, Message};

use crate::error::HandshakeError;

/// Shown when the server asks for a name without saying so
const DEFAULT_PROMPT: &str = "What is your name?";

/// Surfaced when the socket closes mid-handshake
pub const CONNECTION_LOST: &str = "Connection to the server was lost.";

/// Where a client is in the sign-in sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakePhase {
    /// Socket open, nothing exchanged yet
    Connecting,
    /// The server asked for a name
    AwaitingUsername,
    /// Signed in
    Authenticated,
    /// Refused by the server
    Rejected,
    /// The connection is gone
    Disconnected,
}

impl HandshakePhase {
    /// True once no further handshake steps exist
    pub fn is_concluded(self) -> bool {
        matches!(
            self,
            HandshakePhase::Authenticated | HandshakePhase::Rejected | HandshakePhase::Disconnected
        )
    }
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakePhase::Connecting => write!(f, "connecting"),
            HandshakePhase::AwaitingUsername => write!(f, "awaiting username"),
            HandshakePhase::Authenticated => write!(f, "authenticated"),
            HandshakePhase::Rejected => write!(f, "rejected"),
            HandshakePhase::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Effect of one server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The server wants a (new) name
    Prompted(Message),
    /// Signed in; `known_as` is now set
    Authenticated(Message),
    /// Refused for good
    Rejected(Message),
    /// The reply does not move the handshake; the phase is unchanged
    Ignored(Message),
}

impl Transition {
    /// The server message to surface to the user
    pub fn message(&self) -> &Message {
        match self {
            Transition::Prompted(m)
            | Transition::Authenticated(m)
            | Transition::Rejected(m)
            | Transition::Ignored(m) => m,
        }
    }
}

/// Handshake state for one connection
#[derive(Debug, Clone)]
pub struct Handshake {
    phase: HandshakePhase,
    known_as: Option<String>,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            phase: HandshakePhase::Connecting,
            known_as: None,
        }
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Name the server accepted, once authenticated
    pub fn known_as(&self) -> Option<&str> {
        self.known_as.as_deref()
    }

    /// Build the request for the current phase.
    ///
    /// `input` is the user's typed name and is only read while awaiting a
    /// username.
    pub fn request(&self, input: Option<&str>) -> Result<Event, HandshakeError> {
        match self.phase {
            HandshakePhase::Connecting => Ok(Event::auth()),
            HandshakePhase::AwaitingUsername => {
                let name = input.ok_or(HandshakeError::MissingUsername)?;
                Ok(Event::auth_with(Message::user(name, name)))
            }
            phase => Err(HandshakeError::Concluded(phase)),
        }
    }

    /// Apply the server's reply to the last request
    pub fn on_reply(&mut self, reply: &Event) -> Transition {
        let message = reply
            .message()
            .cloned()
            .unwrap_or_else(|| Message::system(DEFAULT_PROMPT));

        if self.phase.is_concluded() {
            return Transition::Ignored(message);
        }

        match reply {
            Event::Auth { .. } => {
                self.phase = HandshakePhase::AwaitingUsername;
                Transition::Prompted(message)
            }
            Event::AuthSuccess { username, .. } => {
                self.phase = HandshakePhase::Authenticated;
                self.known_as = Some(username.clone());
                Transition::Authenticated(message)
            }
            Event::AuthReject { .. } => {
                self.phase = HandshakePhase::Rejected;
                Transition::Rejected(message)
            }
            Event::Broadcast { .. } | Event::Error { .. } => Transition::Ignored(message),
        }
    }

    /// Record that the connection closed. Returns the message to surface.
    pub fn disconnected(&mut self) -> Message {
        self.phase = HandshakePhase::Disconnected;
        Message::system(CONNECTION_LOST)
    }
}
