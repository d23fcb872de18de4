//! Accept loop
//!
//! Accepts incoming connections and spawns a handler for each client.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::server::handler::ConnectionHandler;
use crate::state::ServerState;

/// Accept connections until `cancel` fires, then drop the listening socket
pub(crate) async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Chat server no longer accepting connections");
                break;
            }

            result = listener.accept() => {
                match result {
                    Ok((socket, peer_addr)) => {
                        tracing::info!("New connection from {}", peer_addr);
                        if let Err(e) = socket.set_nodelay(true) {
                            tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
                        }
                        tracker.spawn(ConnectionHandler::run(
                            socket,
                            peer_addr,
                            Arc::clone(&state),
                            cancel.child_token(),
                            tracker.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                }
            }
        }
    }
}
