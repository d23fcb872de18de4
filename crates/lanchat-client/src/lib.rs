//! lanchat-client: Client side of the LanChat protocol
//!
//! Connects to a chat server, walks the user through signing in, and then
//! listens in the background for messages relayed by the server.

pub mod client;
pub mod error;
pub mod events;
pub mod handshake;
mod listener;

pub use client::{ChatClient, StepOutcome};
pub use error::{ClientError, HandshakeError};
pub use events::{ChannelEvents, ChatEvents, ClientEvent, NoopEvents};
pub use handshake::{Handshake, HandshakePhase, Transition};
