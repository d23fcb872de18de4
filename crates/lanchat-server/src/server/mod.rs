//! Chat server lifecycle and administration

mod handler;
mod listener;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use lanchat_core::config::ServerConfig;
use lanchat_protocol::Message;

use crate::error::ServerError;
use crate::state::ServerState;

/// A running chat server.
///
/// Dropping the server cancels every task it spawned; call [`stop`] to
/// also wait for them.
///
/// [`stop`]: ChatServer::stop
pub struct ChatServer {
    /// Shared server state
    state: Arc<ServerState>,
    /// Address the listening socket is bound to
    local_addr: SocketAddr,
    /// Root token; every connection holds a child
    cancel: CancellationToken,
    /// Accept loop, handlers and writers
    tracker: TaskTracker,
    stopped: AtomicBool,
}

impl ChatServer {
    /// Bind and start accepting connections in the background.
    ///
    /// Returns as soon as the socket is listening.
    pub async fn start(config: ServerConfig) -> Result<Self, ServerError> {
        let address = config.bind_address();
        let bind_error = |source| ServerError::Bind {
            address: address.clone(),
            source,
        };

        let listener = TcpListener::bind(&address).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        tracing::info!("Chat server listening on {}", local_addr);

        let state = Arc::new(ServerState::new(config));
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        tracker.spawn(listener::accept_loop(
            listener,
            Arc::clone(&state),
            cancel.clone(),
            tracker.clone(),
        ));

        Ok(Self {
            state,
            local_addr,
            cancel,
            tracker,
            stopped: AtomicBool::new(false),
        })
    }

    /// Stop accepting, close every client socket and wait for all
    /// connection tasks, bounded by the configured shutdown timeout.
    ///
    /// Calling it again is a no-op.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!("Stopping chat server on {}", self.local_addr);
        self.cancel.cancel();
        self.tracker.close();

        let timeout = self.state.config.shutdown_timeout;
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                "{} server tasks still running after {:?}",
                self.tracker.len(),
                timeout
            );
        } else {
            tracing::info!("Chat server stopped");
        }
    }

    /// Whether `stop` has been called
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Send a message to every session except `exclude`.
    ///
    /// Best-effort: returns how many sessions it was queued for.
    pub fn broadcast(&self, message: Message, exclude: Option<&str>) -> usize {
        self.state.broadcaster.broadcast(message, exclude)
    }

    /// Ban a username for the lifetime of this server.
    ///
    /// If the user is online, the host they connect from is banned as well
    /// and their socket is closed immediately. Returns true when a live
    /// session was terminated.
    pub fn ban(&self, username: &str) -> bool {
        match self.state.registry.ban(username) {
            Some(session) => {
                session.endpoint.close();
                let online = self.state.registry.len();
                tracing::info!(
                    "Banned {} and closed their session from {}",
                    username,
                    session.endpoint.addr
                );
                self.state.broadcaster.notice(
                    format!("{} has been banned. {} online.", username, online),
                    None,
                );
                true
            }
            None => {
                tracing::info!("Banned {} (not connected)", username);
                false
            }
        }
    }

    /// Whether a username is banned
    pub fn is_banned(&self, username: &str) -> bool {
        self.state.registry.is_banned_name(username)
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address other machines should connect to.
    ///
    /// When bound to a wildcard address this resolves the machine's host
    /// name to a LAN address; otherwise it is the bound address.
    pub async fn advertised_addr(&self) -> SocketAddr {
        if !self.local_addr.ip().is_unspecified() {
            return self.local_addr;
        }

        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        let resolved = tokio::net::lookup_host((hostname.as_str(), self.local_addr.port())).await;
        let advertised = match resolved {
            Ok(mut addrs) => addrs
                .find(|addr| addr.is_ipv4() && !addr.ip().is_loopback())
                .unwrap_or(self.local_addr),
            Err(e) => {
                tracing::debug!("Failed to resolve {}: {}", hostname, e);
                self.local_addr
            }
        };
        advertised
    }

    /// Number of authenticated sessions
    pub fn count(&self) -> usize {
        self.state.registry.len()
    }

    /// Names of authenticated sessions, sorted
    pub fn usernames(&self) -> Vec<String> {
        self.state.registry.usernames()
    }

    /// Shared state, for embedding the server in a larger application
    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }
}

impl Drop for ChatServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
