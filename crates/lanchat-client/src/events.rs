//! Callbacks a client raises toward the application

use tokio::sync::mpsc;

use lanchat_protocol::Message;

use crate::client::ChatClient;

/// Receives client notifications.
///
/// Callbacks run on the client's background tasks and must not block.
/// Every method defaults to doing nothing.
pub trait ChatEvents: Send + Sync {
    /// A message relayed by the server arrived
    fn on_broadcast(&self, client: &ChatClient, message: Message) {
        let _ = (client, message);
    }

    /// The handshake succeeded
    fn on_authenticated(&self, client: &ChatClient) {
        let _ = client;
    }

    /// The server closed the connection or rejected the client.
    ///
    /// Raised at most once per client, and never as a result of
    /// [`ChatClient::stop`].
    fn on_disconnected(&self, client: &ChatClient) {
        let _ = client;
    }
}

/// Ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl ChatEvents for NoopEvents {}

/// A client notification as a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Broadcast(Message),
    /// Signed in under this name
    Authenticated(String),
    Disconnected,
}

/// Forwards notifications into a channel, for consumers that prefer to
/// `await` them
#[derive(Debug, Clone)]
pub struct ChannelEvents {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl ChannelEvents {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Client event receiver dropped");
        }
    }
}

impl ChatEvents for ChannelEvents {
    fn on_broadcast(&self, _client: &ChatClient, message: Message) {
        self.forward(ClientEvent::Broadcast(message));
    }

    fn on_authenticated(&self, client: &ChatClient) {
        let name = client.known_as().unwrap_or_default();
        self.forward(ClientEvent::Authenticated(name));
    }

    fn on_disconnected(&self, _client: &ChatClient) {
        self.forward(ClientEvent::Disconnected);
    }
}
