//! Server configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;
use super::{DEFAULT_HOST, DEFAULT_PORT};

/// Configuration for the chat server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to (0 picks a free port)
    pub port: u16,

    /// How long a connection may stay silent before it is dropped
    #[serde(with = "duration_secs")]
    pub idle_timeout: Duration,

    /// Upper bound on waiting for connection tasks during `stop()`
    #[serde(with = "duration_secs")]
    pub shutdown_timeout: Duration,

    /// Events queued per connection before broadcasts to it are dropped
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            idle_timeout: Duration::from_secs(1000),
            shutdown_timeout: Duration::from_secs(5),
            outbound_queue: 256,
        }
    }
}

impl ServerConfig {
    /// Configuration bound to the given host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Get the bind address (host:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
