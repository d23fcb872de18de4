//! Chat client
//!
//! A [`ChatClient`] owns one connection to a chat server. After
//! [`connect`](ChatClient::connect) the caller drives the sign-in handshake
//! one [`step`](ChatClient::step) at a time, typically once per line the
//! user types. Once signed in, a background listener delivers relayed
//! messages through [`ChatEvents`].

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use lanchat_core::config::ClientConfig;
use lanchat_protocol::{Event, EventReader, EventWriter, Message};

use crate::error::ClientError;
use crate::events::ChatEvents;
use crate::handshake::{Handshake, HandshakePhase, Transition};
use crate::listener;

/// Result of one handshake round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Server message to show the user
    pub message: Message,
    /// Phase of the next step, or `None` once the handshake is over
    pub next: Option<HandshakePhase>,
}

impl StepOutcome {
    pub fn is_concluded(&self) -> bool {
        self.next.is_none()
    }
}

struct Inner {
    config: ClientConfig,
    events: Arc<dyn ChatEvents>,
    handshake: Mutex<Handshake>,
    /// Held by the handshake; moves to the listener after sign-in
    reader: AsyncMutex<Option<EventReader<OwnedReadHalf>>>,
    writer: AsyncMutex<Option<EventWriter<OwnedWriteHalf>>>,
    /// Cancels pending handshake reads and the listener
    cancel: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
    disconnect_raised: AtomicBool,
}

/// Handle to a chat connection. Clones share the same connection.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<Inner>,
}

impl ChatClient {
    pub fn new(config: ClientConfig, events: Arc<dyn ChatEvents>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                events,
                handshake: Mutex::new(Handshake::new()),
                reader: AsyncMutex::new(None),
                writer: AsyncMutex::new(None),
                cancel: CancellationToken::new(),
                listener: Mutex::new(None),
                stopped: AtomicBool::new(false),
                disconnect_raised: AtomicBool::new(false),
            }),
        }
    }

    /// Open the connection and return the phase of the first handshake step.
    ///
    /// A client connects once; calling this again returns the current
    /// phase without touching the socket.
    pub async fn connect(&self) -> Result<HandshakePhase, ClientError> {
        if self.is_stopped() {
            return Err(ClientError::NotConnected);
        }

        let mut writer_slot = self.inner.writer.lock().await;
        if writer_slot.is_some() || self.phase() != HandshakePhase::Connecting {
            tracing::debug!("Already connected, phase is {}", self.phase());
            return Ok(self.phase());
        }

        let address = self.inner.config.server_address();
        let connect_error = |source| ClientError::Connect {
            address: address.clone(),
            source,
        };

        tracing::debug!("Connecting to {}", address);
        let stream = match tokio::time::timeout(
            self.inner.config.connect_timeout,
            TcpStream::connect(&address),
        )
        .await
        {
            Ok(result) => result.map_err(connect_error)?,
            Err(_) => {
                return Err(connect_error(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connection timed out",
                )))
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY: {}", e);
        }

        let (reader, writer) = lanchat_protocol::split(stream);
        *self.inner.reader.lock().await = Some(reader);
        *writer_slot = Some(writer);

        tracing::info!("Connected to {}", address);
        Ok(HandshakePhase::Connecting)
    }

    /// Perform one handshake round trip.
    ///
    /// `input` is the name to sign in with and is only needed once the
    /// server has asked for one. A lost connection is not an error: it
    /// yields a "connection lost" message and ends the handshake.
    pub async fn step(&self, input: Option<&str>) -> Result<StepOutcome, ClientError> {
        let mut reader_slot = self.inner.reader.lock().await;
        let request = self.handshake().request(input)?;
        let Some(reader) = reader_slot.as_mut() else {
            return Err(ClientError::NotConnected);
        };

        let response_timeout = self.inner.config.response_timeout;
        let round_trip = async {
            self.send(&request).await?;
            reader.recv().await.map_err(ClientError::from)
        };

        let received = tokio::select! {
            _ = self.inner.cancel.cancelled() => return Err(ClientError::NotConnected),
            received = tokio::time::timeout(response_timeout, round_trip) => received,
        };

        let reply = match received {
            Ok(Ok(reply)) => reply,
            Ok(Err(ClientError::Protocol(e))) if e.is_recoverable() => {
                tracing::warn!("Unreadable handshake reply: {}", e);
                return Err(e.into());
            }
            Ok(Err(ClientError::Protocol(e))) => {
                tracing::info!("Connection lost during sign-in: {}", e);
                *reader_slot = None;
                drop(reader_slot);
                self.teardown().await;
                let message = self.handshake().disconnected();
                return Ok(StepOutcome {
                    message,
                    next: None,
                });
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                tracing::warn!("No handshake reply within {:?}", response_timeout);
                *reader_slot = None;
                drop(reader_slot);
                self.teardown().await;
                self.handshake().disconnected();
                return Err(ClientError::Timeout(response_timeout));
            }
        };

        let transition = self.handshake().on_reply(&reply);
        match transition {
            Transition::Prompted(message) => Ok(StepOutcome {
                message,
                next: Some(HandshakePhase::AwaitingUsername),
            }),
            Transition::Ignored(message) => Ok(StepOutcome {
                message,
                next: Some(self.phase()),
            }),
            Transition::Authenticated(message) => {
                let reader = reader_slot.take();
                drop(reader_slot);

                tracing::info!("Signed in as {}", self.known_as().unwrap_or_default());
                self.inner.events.on_authenticated(self);

                if let Some(reader) = reader {
                    let handle = tokio::spawn(listener::run(
                        self.clone(),
                        reader,
                        self.inner.cancel.clone(),
                    ));
                    *self.lock_listener() = Some(handle);
                }
                Ok(StepOutcome {
                    message,
                    next: None,
                })
            }
            Transition::Rejected(message) => {
                tracing::info!("Server refused sign-in: {}", message.content);
                *reader_slot = None;
                drop(reader_slot);
                self.teardown().await;
                self.raise_disconnected();
                Ok(StepOutcome {
                    message,
                    next: None,
                })
            }
        }
    }

    /// Send a chat message to everyone else on the server.
    ///
    /// If the connection turns out to be closed, `on_disconnected` is raised
    /// instead of returning an error.
    pub async fn broadcast(&self, message: Message) -> Result<(), ClientError> {
        if !self.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }

        match self.send(&Event::broadcast(message)).await {
            Err(ClientError::Protocol(e)) if e.is_connection_closed() => {
                tracing::warn!("Connection closed while sending");
                self.connection_closed().await;
                Ok(())
            }
            other => other,
        }
    }

    /// Close the connection and wait for the listener.
    ///
    /// Idempotent. Does not raise `on_disconnected`.
    pub async fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::debug!("Stopping client");
        self.teardown().await;
        self.inner.reader.lock().await.take();
        {
            let mut handshake = self.handshake();
            if handshake.phase() != HandshakePhase::Rejected {
                handshake.disconnected();
            }
        }

        let listener = self.lock_listener().take();
        if let Some(handle) = listener {
            let timeout = self.inner.config.shutdown_timeout;
            if tokio::time::timeout(timeout, handle).await.is_err() {
                tracing::warn!("Listener did not finish within {:?}", timeout);
            }
        }
    }

    pub fn phase(&self) -> HandshakePhase {
        self.handshake().phase()
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase() == HandshakePhase::Authenticated
    }

    /// Name the server accepted
    pub fn known_as(&self) -> Option<String> {
        self.handshake().known_as().map(str::to_string)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub(crate) fn events(&self) -> &dyn ChatEvents {
        self.inner.events.as_ref()
    }

    /// The server side went away after sign-in
    pub(crate) async fn connection_closed(&self) {
        self.teardown().await;
        self.handshake().disconnected();
        self.raise_disconnected();
    }

    async fn send(&self, event: &Event) -> Result<(), ClientError> {
        let mut writer = self.inner.writer.lock().await;
        let writer = writer.as_mut().ok_or(ClientError::NotConnected)?;
        writer.send(event).await?;
        Ok(())
    }

    /// Cancel background reads and shut down the write side
    async fn teardown(&self) {
        self.inner.cancel.cancel();
        let writer = self.inner.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.close().await {
                tracing::trace!("Socket shutdown failed: {}", e);
            }
        }
    }

    fn raise_disconnected(&self) {
        if self.is_stopped() || self.inner.disconnect_raised.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.events.on_disconnected(self);
    }

    fn handshake(&self) -> MutexGuard<'_, Handshake> {
        self.inner
            .handshake
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listener(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
