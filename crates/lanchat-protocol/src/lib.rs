//! lanchat-protocol: Wire protocol for LanChat peers
//!
//! This crate defines the length-framed protocol spoken between the chat
//! server and its clients: a fixed-width ASCII length header followed by a
//! JSON-encoded [`Event`].

pub mod codec;
pub mod error;
pub mod event;
pub mod frame;
pub mod message;
pub mod stream;

pub use codec::{pack, unpack, Frame, FrameCodec};
pub use error::{FrameError, ProtocolError};
pub use event::{Event, EventKind, PROTOCOL_VERSION};
pub use frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use message::{Initiator, Message};
pub use stream::{split, EventReader, EventWriter};
