//! Background receive loop for a signed-in client

use tokio::net::tcp::OwnedReadHalf;
use tokio_util::sync::CancellationToken;

use lanchat_protocol::{Event, EventReader};

use crate::client::ChatClient;

/// Deliver server pushes until the connection closes or the client stops.
///
/// A close raises `on_disconnected`; cancellation does not.
pub(crate) async fn run(
    client: ChatClient,
    mut reader: EventReader<OwnedReadHalf>,
    cancel: CancellationToken,
) {
    tracing::debug!("Listener started");

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Listener cancelled");
                return;
            }
            received = reader.recv() => received,
        };

        match received {
            Ok(Event::Broadcast { message }) => {
                tracing::trace!("Broadcast from {}", message.from);
                client.events().on_broadcast(&client, message);
            }
            Ok(Event::Error { message }) => {
                tracing::warn!("Server reported: {}", message.content);
            }
            Ok(other) => {
                tracing::debug!("Ignoring {} after sign-in", other.kind());
            }
            Err(e) if e.is_connection_closed() => {
                tracing::info!("Server closed the connection");
                break;
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!("Dropping unreadable event: {}", e);
            }
            Err(e) => {
                tracing::warn!("Protocol error, closing: {}", e);
                break;
            }
        }
    }

    client.connection_closed().await;
}
