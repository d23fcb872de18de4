//! State shared by the accept loop and every connection handler

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lanchat_core::config::ServerConfig;

use crate::broadcast::BroadcastEngine;
use crate::registry::{ConnectionId, Registry};

/// Global state for a running server
pub struct ServerState {
    /// Configuration
    pub config: ServerConfig,
    /// Sessions and bans
    pub registry: Arc<Registry>,
    /// Fan-out over the registry
    pub broadcaster: BroadcastEngine,
    next_connection: AtomicU64,
}

impl ServerState {
    /// Create empty server state
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(Registry::new());
        Self {
            config,
            broadcaster: BroadcastEngine::new(Arc::clone(&registry)),
            registry,
            next_connection: AtomicU64::new(1),
        }
    }

    /// Allocate an id for a newly accepted connection
    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }
}
