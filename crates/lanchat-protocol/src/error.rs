//! Protocol error types

use std::io;

use thiserror::Error;

use crate::event::EventKind;

/// Violations of the framing layer.
///
/// A frame error leaves the byte stream out of sync, so the connection it
/// came from cannot be used any further.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Header is not a space-padded ASCII decimal
    #[error("Invalid frame header: {0:?}")]
    InvalidHeader(String),

    /// Payload exceeds maximum size
    #[error("Payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Peer closed the stream in the middle of a frame
    #[error("Incomplete frame: expected {expected} bytes, got {actual}")]
    IncompleteFrame { expected: usize, actual: usize },
}

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Framing violation
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Peer closed, reset or aborted the connection
    #[error("Connection closed")]
    ConnectionClosed,

    /// A complete frame whose payload is not a valid event
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// Event is missing a field its kind requires
    #[error("Event `{kind}` is missing required field `{field}`")]
    MissingField {
        kind: EventKind,
        field: &'static str,
    },

    /// Payload declares a schema version we do not speak
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl ProtocolError {
    /// Whether this error means the peer is gone
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, ProtocolError::ConnectionClosed)
    }

    /// Whether the stream is still usable after this error.
    ///
    /// Payload-level errors consume exactly one frame, so the next read
    /// starts on a frame boundary.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidPayload(_)
                | ProtocolError::MissingField { .. }
                | ProtocolError::UnsupportedVersion(_)
        )
    }
}

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed,
            _ => ProtocolError::Io(err),
        }
    }
}
