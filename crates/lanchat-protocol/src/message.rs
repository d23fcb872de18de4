//! Chat message carried inside events

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Display name used for server-generated messages
pub const SYSTEM_SENDER: &str = "System";

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Initiator {
    /// Typed by the local user
    User,
    /// Produced by a local chat bot
    ChatBot,
    /// Produced by the server or the application itself
    System,
    /// Relayed from another peer by the server
    Network,
}

impl fmt::Display for Initiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Initiator::User => write!(f, "User"),
            Initiator::ChatBot => write!(f, "ChatBot"),
            Initiator::System => write!(f, "System"),
            Initiator::Network => write!(f, "Network"),
        }
    }
}

/// A single chat entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced the message
    pub initiator: Initiator,
    /// Display name of the sender
    pub from: String,
    /// Message text
    pub content: String,
    /// Unix time in milliseconds
    pub timestamp: u64,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(initiator: Initiator, from: impl Into<String>, content: impl Into<String>) -> Self {
        Self::at(initiator, from, content, now_millis())
    }

    /// Create a message with an explicit timestamp
    pub fn at(
        initiator: Initiator,
        from: impl Into<String>,
        content: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            initiator,
            from: from.into(),
            content: content.into(),
            timestamp,
        }
    }

    /// Message typed by a user
    pub fn user(from: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Initiator::User, from, content)
    }

    /// Server or application notice
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Initiator::System, SYSTEM_SENDER, content)
    }

    /// Copy of this message as the server relays it: attributed to the
    /// sender's authenticated name and marked as coming from the network.
    pub fn relayed_from(&self, username: &str) -> Self {
        Self {
            initiator: Initiator::Network,
            from: username.to_string(),
            content: self.content.clone(),
            timestamp: self.timestamp,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.initiator, self.from, self.content)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
