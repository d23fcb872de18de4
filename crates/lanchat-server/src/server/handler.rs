//! Per-connection handler
//!
//! Each accepted socket gets a reader loop (this handler) and a writer task
//! draining the connection's outbound queue. The handler owns the
//! connection's handshake state:
//!
//! ```text
//! Unauthenticated --auth(name ok)--> Authenticated
//!        |                                 |
//!        +--auth(banned) / closed----------+--closed / ban / stop--> Closed
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use lanchat_core::ValidationError;
use lanchat_protocol::{Event, EventWriter, Message};

use crate::registry::{Endpoint, Registration};
use crate::state::ServerState;

const NAME_PROMPT: &str = "What is your name?";
const NAME_TAKEN: &str = "That name has already been used. What is your name?";
const WHO_ARE_YOU: &str = "Hey! Who are you?";
const BANNED: &str = "You have been banned from this server.";
const INVALID_DATA: &str = "Invalid data.";

/// What the read loop does after handling an event
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Handler for a single client connection
pub(crate) struct ConnectionHandler {
    /// Shared server state
    state: Arc<ServerState>,
    /// This connection's socket handle
    endpoint: Endpoint,
    /// Set once the handshake succeeds
    username: Option<String>,
}

impl ConnectionHandler {
    /// Serve one connection until the peer leaves, it is banned, or the
    /// server stops.
    pub(crate) async fn run(
        stream: TcpStream,
        peer_addr: SocketAddr,
        state: Arc<ServerState>,
        cancel: CancellationToken,
        tracker: TaskTracker,
    ) {
        let id = state.next_connection_id();
        let (mut reader, writer) = lanchat_protocol::split(stream);
        let (outbound_tx, outbound_rx) = mpsc::channel(state.config.outbound_queue.max(1));
        let writer_task = tracker.spawn(write_loop(
            writer,
            outbound_rx,
            cancel.clone(),
            peer_addr,
        ));

        let mut handler = ConnectionHandler {
            endpoint: Endpoint::new(id, peer_addr, outbound_tx, cancel.clone()),
            state,
            username: None,
        };
        let idle_timeout = handler.state.config.idle_timeout;
        let writer_timeout = handler.state.config.shutdown_timeout;

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Connection {} from {} cancelled", id, peer_addr);
                    break;
                }
                received = tokio::time::timeout(idle_timeout, reader.recv()) => received,
            };

            let event = match received {
                Ok(Ok(event)) => event,
                Ok(Err(e)) if e.is_connection_closed() => {
                    tracing::debug!("Connection {} from {} closed by peer", id, peer_addr);
                    break;
                }
                Ok(Err(e)) if e.is_recoverable() => {
                    tracing::warn!("Bad payload from {}: {}", peer_addr, e);
                    handler.reply(Event::error(INVALID_DATA)).await;
                    continue;
                }
                Ok(Err(e)) => {
                    tracing::warn!("Protocol error from {}, closing: {}", peer_addr, e);
                    break;
                }
                Err(_) => {
                    tracing::info!(
                        "Connection from {} idle for {:?}, closing",
                        peer_addr,
                        idle_timeout
                    );
                    break;
                }
            };

            tracing::trace!("Received {} from {}", event.kind(), peer_addr);
            if handler.handle_event(event).await == Flow::Close {
                break;
            }
        }

        handler.finish();
        drop(handler);

        if tokio::time::timeout(writer_timeout, writer_task).await.is_err() {
            tracing::debug!("Writer for {} did not finish in time, closing", peer_addr);
            cancel.cancel();
        }
        tracing::info!("Connection from {} closed", peer_addr);
    }

    /// Apply protocol logic to one event
    async fn handle_event(&mut self, event: Event) -> Flow {
        let Some(username) = self.username.clone() else {
            return self.handle_unauthenticated(event).await;
        };

        match event {
            Event::Broadcast { message } => {
                let relayed = message.relayed_from(&username);
                let delivered = self.state.broadcaster.broadcast(relayed, Some(&username));
                tracing::debug!("Relayed message from {} to {} sessions", username, delivered);
            }
            Event::Auth { .. } => {
                self.reply(Event::error(format!(
                    "You are already signed in as {}.",
                    username
                )))
                .await;
            }
            other => {
                tracing::warn!("Unexpected {} from {}", other.kind(), username);
                self.reply(Event::error(format!("Unexpected event: {}", other.kind())))
                    .await;
            }
        }
        Flow::Continue
    }

    async fn handle_unauthenticated(&mut self, event: Event) -> Flow {
        match event {
            Event::Auth { message: None } => {
                self.reply(prompt(NAME_PROMPT)).await;
                Flow::Continue
            }
            Event::Auth {
                message: Some(message),
            } => self.authenticate(&message.content).await,
            _ => {
                self.reply(prompt(WHO_ARE_YOU)).await;
                Flow::Continue
            }
        }
    }

    async fn authenticate(&mut self, requested: &str) -> Flow {
        let result = self
            .state
            .registry
            .register(requested, &self.endpoint, |reg: &Registration| Event::AuthSuccess {
                username: reg.username.clone(),
                message: Message::system(format!(
                    "Welcome to the chat session {}! {} online.",
                    reg.username, reg.online
                )),
            });

        match result {
            Ok(reg) => {
                tracing::info!(
                    "{} authenticated as {} ({} online)",
                    self.endpoint.addr,
                    reg.username,
                    reg.online
                );
                self.state.broadcaster.notice(
                    format!("{} has joined the chat. {} online.", reg.username, reg.online),
                    Some(&reg.username),
                );
                self.username = Some(reg.username);
                Flow::Continue
            }
            Err(ValidationError::EmptyUsername) => {
                self.reply(prompt(NAME_PROMPT)).await;
                Flow::Continue
            }
            Err(ValidationError::UsernameTaken(name)) => {
                tracing::debug!("{} asked for taken name {}", self.endpoint.addr, name);
                self.reply(prompt(NAME_TAKEN)).await;
                Flow::Continue
            }
            Err(ValidationError::Banned(name)) => {
                tracing::info!(
                    "Rejected banned identity {} from {}",
                    name,
                    self.endpoint.addr
                );
                self.reply(Event::AuthReject {
                    message: Message::system(BANNED),
                })
                .await;
                Flow::Close
            }
        }
    }

    /// Queue a reply on this connection
    async fn reply(&self, event: Event) {
        if !self.endpoint.send(event).await {
            tracing::debug!("Reply to {} dropped, writer is gone", self.endpoint.addr);
        }
    }

    /// Deregister the session (if any) and tell the others
    fn finish(&mut self) {
        if let Some((username, online)) = self.state.registry.deregister(self.endpoint.id) {
            tracing::info!("{} left ({} online)", username, online);
            self.state
                .broadcaster
                .notice(format!("{} has left the chat. {} online.", username, online), None);
        }
        self.username = None;
    }
}

fn prompt(content: &str) -> Event {
    Event::auth_with(Message::system(content))
}

/// Drain the outbound queue onto the socket.
///
/// Ends when every sender is gone (after flushing and shutting down the
/// write side), on a write failure, or on cancellation, including in the
/// middle of a blocked write.
async fn write_loop(
    mut writer: EventWriter<OwnedWriteHalf>,
    mut outbound: mpsc::Receiver<Event>,
    cancel: CancellationToken,
    peer_addr: SocketAddr,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = outbound.recv() => next,
        };

        // A write to a peer that stopped reading blocks until cancelled
        let written = match next {
            Some(event) => tokio::select! {
                _ = cancel.cancelled() => break,
                written = writer.send(&event) => written,
            },
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    closed = writer.close() => {
                        if let Err(e) = closed {
                            tracing::trace!("Shutdown of {} failed: {}", peer_addr, e);
                        }
                    }
                }
                break;
            }
        };

        if let Err(e) = written {
            tracing::debug!("Write to {} failed: {}", peer_addr, e);
            break;
        }
    }
}
