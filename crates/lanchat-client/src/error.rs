//! Client error types

use std::io;
use std::time::Duration;

use thiserror::Error;

use lanchat_protocol::ProtocolError;

use crate::handshake::HandshakePhase;

/// Errors returned by [`ChatClient`](crate::ChatClient) operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server could not be reached
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Not signed in to the chat")]
    NotAuthenticated,

    #[error("Not connected to a server")]
    NotConnected,

    /// The server did not answer a handshake request in time
    #[error("No reply from the server within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),
}

/// Misuse of the handshake state machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// No further steps exist in this phase
    #[error("Handshake already concluded ({0})")]
    Concluded(HandshakePhase),

    /// The server asked for a name but none was given
    #[error("A username is required")]
    MissingUsername,
}
