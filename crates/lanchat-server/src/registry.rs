//! Session registry and ban list
//!
//! All registry state sits behind one mutex. Lookups that feed a broadcast
//! copy the recipients out under the lock and send after releasing it, so a
//! session joining or leaving mid-broadcast never races the iteration.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lanchat_core::{Username, ValidationError};
use lanchat_protocol::Event;

/// Identifies one accepted connection for the lifetime of the server
pub type ConnectionId = u64;

/// Server-side handle to one connection's socket
#[derive(Clone)]
pub struct Endpoint {
    /// Connection identifier
    pub id: ConnectionId,
    /// Peer address
    pub addr: SocketAddr,
    /// Queue drained by the connection's writer task
    outbound: mpsc::Sender<Event>,
    /// Cancels the connection's reader and writer
    cancel: CancellationToken,
}

impl Endpoint {
    pub(crate) fn new(
        id: ConnectionId,
        addr: SocketAddr,
        outbound: mpsc::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            addr,
            outbound,
            cancel,
        }
    }

    /// Queue an event without waiting.
    ///
    /// Returns false when the queue is full or the writer has gone away.
    pub fn try_send(&self, event: Event) -> bool {
        match self.outbound.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Outbound queue for {} is full, dropping event", self.addr);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::trace!("Outbound queue for {} is closed", self.addr);
                false
            }
        }
    }

    /// Queue an event, waiting for room.
    ///
    /// Returns false when the writer has gone away or the connection is
    /// closed while waiting.
    pub async fn send(&self, event: Event) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.outbound.send(event) => sent.is_ok(),
        }
    }

    /// Forcibly close the connection's socket
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// An authenticated session
#[derive(Clone)]
pub struct SessionHandle {
    /// Name the session registered under
    pub username: String,
    /// Socket handle
    pub endpoint: Endpoint,
}

/// Result of a successful registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Registered name
    pub username: String,
    /// Online count including the new session
    pub online: usize,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<String, SessionHandle>,
    by_addr: HashMap<SocketAddr, String>,
    banned_names: HashSet<String>,
    banned_hosts: HashSet<IpAddr>,
}

impl RegistryInner {
    fn is_banned(&self, username: &str, addr: &SocketAddr) -> bool {
        self.banned_names.contains(username) || self.banned_hosts.contains(&addr.ip())
    }

    fn remove(&mut self, username: &str) -> Option<SessionHandle> {
        let session = self.sessions.remove(username)?;
        self.by_addr.remove(&session.endpoint.addr);
        Some(session)
    }
}

/// Live sessions plus the ban list
#[derive(Default)]
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `endpoint` under the requested name.
    ///
    /// Checks run in order: empty name, name already live, banned name or
    /// address. On success `welcome` builds the first event for the new
    /// session; it is queued before the lock is released so that no
    /// broadcast can overtake it.
    pub fn register<F>(
        &self,
        requested: &str,
        endpoint: &Endpoint,
        welcome: F,
    ) -> Result<Registration, ValidationError>
    where
        F: FnOnce(&Registration) -> Event,
    {
        let username = Username::parse(requested)?.into_string();

        let mut inner = self.lock();
        if inner.sessions.contains_key(&username) {
            return Err(ValidationError::UsernameTaken(username));
        }
        if inner.is_banned(&username, &endpoint.addr) {
            return Err(ValidationError::Banned(username));
        }

        inner.sessions.insert(
            username.clone(),
            SessionHandle {
                username: username.clone(),
                endpoint: endpoint.clone(),
            },
        );
        inner.by_addr.insert(endpoint.addr, username.clone());

        let registration = Registration {
            username,
            online: inner.sessions.len(),
        };
        endpoint.try_send(welcome(&registration));
        Ok(registration)
    }

    /// Remove the session owned by connection `id`.
    ///
    /// Returns the name it was registered under and the remaining online
    /// count, or None when that connection holds no session (never
    /// authenticated, or already removed by a ban).
    pub fn deregister(&self, id: ConnectionId) -> Option<(String, usize)> {
        let mut inner = self.lock();
        let username = inner
            .sessions
            .values()
            .find(|s| s.endpoint.id == id)
            .map(|s| s.username.clone())?;
        inner.remove(&username);
        Some((username, inner.sessions.len()))
    }

    /// Ban a name. If a session holds it, the host it connects from is
    /// banned too (any port) and the session is removed and returned so the
    /// caller can close it.
    pub fn ban(&self, username: &str) -> Option<SessionHandle> {
        let mut inner = self.lock();
        inner.banned_names.insert(username.to_string());

        let session = inner.remove(username)?;
        inner.banned_hosts.insert(session.endpoint.addr.ip());
        Some(session)
    }

    /// Whether a name is on the ban list
    pub fn is_banned_name(&self, username: &str) -> bool {
        self.lock().banned_names.contains(username)
    }

    /// Whether a host is on the ban list
    pub fn is_banned_host(&self, host: IpAddr) -> bool {
        self.lock().banned_hosts.contains(&host)
    }

    /// Copy of every session except `exclude`
    pub fn snapshot(&self, exclude: Option<&str>) -> Vec<SessionHandle> {
        self.lock()
            .sessions
            .values()
            .filter(|s| Some(s.username.as_str()) != exclude)
            .cloned()
            .collect()
    }

    /// Name registered from a peer address
    pub fn username_at(&self, addr: &SocketAddr) -> Option<String> {
        self.lock().by_addr.get(addr).cloned()
    }

    /// Peer address of a registered name
    pub fn addr_of(&self, username: &str) -> Option<SocketAddr> {
        self.lock().sessions.get(username).map(|s| s.endpoint.addr)
    }

    /// Registered names, sorted
    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().sessions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
