//! lanchat-server: Multi-client chat server
//!
//! The server accepts TCP connections, runs the name handshake on each
//! one, keeps the registry of authenticated sessions and the ban list, and
//! relays every chat message to all other sessions.

pub mod broadcast;
pub mod error;
pub mod registry;
pub mod server;
pub mod state;

pub use error::ServerError;
pub use server::ChatServer;
pub use state::ServerState;
