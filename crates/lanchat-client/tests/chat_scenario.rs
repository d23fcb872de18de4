//! End-to-end chat tests
//!
//! Real clients against a real server on localhost.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use lanchat_client::{
    ChannelEvents, ChatClient, ClientError, ClientEvent, HandshakePhase, NoopEvents,
};
use lanchat_core::config::{ClientConfig, ServerConfig};
use lanchat_protocol::{Initiator, Message};
use lanchat_server::ChatServer;

const WAIT: Duration = Duration::from_secs(5);

async fn start_server() -> ChatServer {
    let config = ServerConfig {
        shutdown_timeout: Duration::from_secs(2),
        ..ServerConfig::new("127.0.0.1", 0)
    };
    ChatServer::start(config).await.expect("Failed to start server")
}

fn client_for(server: &ChatServer) -> (ChatClient, UnboundedReceiver<ClientEvent>) {
    let addr = server.local_addr();
    let config = ClientConfig {
        response_timeout: Duration::from_secs(5),
        shutdown_timeout: Duration::from_secs(2),
        ..ClientConfig::new(addr.ip().to_string(), addr.port())
    };
    let (events, rx) = ChannelEvents::new();
    (ChatClient::new(config, Arc::new(events)), rx)
}

/// Connect and sign in, expecting success on the first name
async fn sign_in(server: &ChatServer, name: &str) -> (ChatClient, UnboundedReceiver<ClientEvent>) {
    let (client, mut rx) = client_for(server);
    assert_eq!(client.connect().await.unwrap(), HandshakePhase::Connecting);

    let outcome = client.step(None).await.unwrap();
    assert_eq!(outcome.message.content, "What is your name?");
    assert_eq!(outcome.next, Some(HandshakePhase::AwaitingUsername));

    let outcome = client.step(Some(name)).await.unwrap();
    assert!(outcome.is_concluded());
    assert!(client.is_authenticated());
    assert_eq!(next_event(&mut rx).await, ClientEvent::Authenticated(name.to_string()));

    (client, rx)
}

async fn next_event(rx: &mut UnboundedReceiver<ClientEvent>) -> ClientEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("Timed out waiting for client event")
        .expect("Event channel closed")
}

/// Skip until a broadcast from `from` arrives
async fn next_from(rx: &mut UnboundedReceiver<ClientEvent>, from: &str) -> Message {
    loop {
        match next_event(rx).await {
            ClientEvent::Broadcast(message) if message.from == from => return message,
            ClientEvent::Broadcast(_) => continue,
            other => panic!("Expected broadcast from {}, got {:?}", from, other),
        }
    }
}

async fn wait_for_count(server: &ChatServer, expected: usize) {
    timeout(WAIT, async {
        while server.count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("count stayed at {}, wanted {}", server.count(), expected));
}

#[tokio::test]
async fn test_alice_and_bob() {
    let server = start_server().await;
    let (alice, mut alice_rx) = sign_in(&server, "alice").await;
    assert_eq!(alice.known_as().as_deref(), Some("alice"));
    assert_eq!(server.count(), 1);

    // Bob tries alice's name first
    let (bob, mut bob_rx) = client_for(&server);
    bob.connect().await.unwrap();
    bob.step(None).await.unwrap();
    let outcome = bob.step(Some("alice")).await.unwrap();
    assert_eq!(
        outcome.message.content,
        "That name has already been used. What is your name?"
    );
    assert_eq!(outcome.next, Some(HandshakePhase::AwaitingUsername));
    assert!(!bob.is_authenticated());
    assert_eq!(server.count(), 1);

    let outcome = bob.step(Some("bob")).await.unwrap();
    assert_eq!(outcome.message.content, "Welcome to the chat session bob! 2 online.");
    assert!(outcome.is_concluded());
    assert_eq!(next_event(&mut bob_rx).await, ClientEvent::Authenticated("bob".into()));

    let joined = next_from(&mut alice_rx, "System").await;
    assert_eq!(joined.content, "bob has joined the chat. 2 online.");

    bob.broadcast(Message::user("bob", "hi alice")).await.unwrap();
    let received = next_from(&mut alice_rx, "bob").await;
    assert_eq!(received.content, "hi alice");
    assert_eq!(received.initiator, Initiator::Network);

    // Bob's next message is alice's, never his own echo
    alice.broadcast(Message::user("alice", "hi bob")).await.unwrap();
    match next_event(&mut bob_rx).await {
        ClientEvent::Broadcast(message) => {
            assert_eq!(message.from, "alice");
            assert_eq!(message.content, "hi bob");
        }
        other => panic!("Unexpected event {:?}", other),
    }

    bob.stop().await;
    let left = next_from(&mut alice_rx, "System").await;
    assert_eq!(left.content, "bob has left the chat. 1 online.");

    alice.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn test_ban_disconnects_client_once() {
    let server = start_server().await;
    let (_alice, _alice_rx) = sign_in(&server, "alice").await;
    let (bob, mut bob_rx) = sign_in(&server, "bob").await;

    assert!(server.ban("bob"));
    assert_eq!(next_event(&mut bob_rx).await, ClientEvent::Disconnected);
    assert!(!bob.is_authenticated());
    assert_eq!(bob.phase(), HandshakePhase::Disconnected);

    // Sending on the dead connection does not raise a second notification
    bob.broadcast(Message::user("bob", "anyone?")).await.ok();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(bob_rx.try_recv().is_err());
    bob.stop().await;

    // Returning under the same name is refused
    let (again, mut again_rx) = client_for(&server);
    again.connect().await.unwrap();
    again.step(None).await.unwrap();
    let outcome = again.step(Some("bob")).await.unwrap();
    assert_eq!(outcome.message.content, "You have been banned from this server.");
    assert!(outcome.is_concluded());
    assert_eq!(again.phase(), HandshakePhase::Rejected);
    assert_eq!(next_event(&mut again_rx).await, ClientEvent::Disconnected);
    assert_eq!(server.count(), 1);

    server.stop().await;
}

#[tokio::test]
async fn test_stop_is_quiet_and_idempotent() {
    let server = start_server().await;
    let (alice, mut alice_rx) = sign_in(&server, "alice").await;

    alice.stop().await;
    alice.stop().await;
    assert!(alice.is_stopped());
    assert!(!alice.is_authenticated());
    wait_for_count(&server, 0).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(alice_rx.try_recv().is_err());

    assert!(matches!(
        alice.broadcast(Message::user("alice", "late")).await,
        Err(ClientError::NotAuthenticated)
    ));

    server.stop().await;
}

#[tokio::test]
async fn test_server_stop_disconnects_clients() {
    let server = start_server().await;
    let (alice, mut alice_rx) = sign_in(&server, "alice").await;
    let (_bob, mut bob_rx) = sign_in(&server, "bob").await;

    server.stop().await;

    // Leave notices may still slip out before the sockets close
    for rx in [&mut alice_rx, &mut bob_rx] {
        loop {
            match next_event(rx).await {
                ClientEvent::Disconnected => break,
                ClientEvent::Broadcast(message) => assert_eq!(message.from, "System"),
                other => panic!("Unexpected event {:?}", other),
            }
        }
    }
    assert!(!alice.is_authenticated());
}

#[tokio::test]
async fn test_broadcast_requires_sign_in() {
    let server = start_server().await;
    let (client, _rx) = client_for(&server);

    assert!(matches!(
        client.broadcast(Message::user("nobody", "hello")).await,
        Err(ClientError::NotAuthenticated)
    ));

    client.connect().await.unwrap();
    client.step(None).await.unwrap();
    assert!(matches!(
        client.broadcast(Message::user("nobody", "hello")).await,
        Err(ClientError::NotAuthenticated)
    ));
    assert!(matches!(
        client.step(None).await,
        Err(ClientError::Handshake(_))
    ));

    client.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn test_step_before_connect() {
    let server = start_server().await;
    let (client, _rx) = client_for(&server);
    assert!(matches!(
        client.step(None).await,
        Err(ClientError::NotConnected)
    ));
    server.stop().await;
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    let server = start_server().await;
    let addr = server.local_addr();
    server.stop().await;
    drop(server);

    let client = ChatClient::new(
        ClientConfig::new(addr.ip().to_string(), addr.port()),
        Arc::new(NoopEvents),
    );
    assert!(matches!(
        client.connect().await,
        Err(ClientError::Connect { .. })
    ));
}

#[tokio::test]
async fn test_lost_connection_during_sign_in() {
    let server = start_server().await;
    let (client, mut rx) = client_for(&server);
    client.connect().await.unwrap();
    client.step(None).await.unwrap();

    server.stop().await;

    let outcome = client.step(Some("alice")).await.unwrap();
    assert_eq!(outcome.message.content, "Connection to the server was lost.");
    assert_eq!(outcome.message.initiator, Initiator::System);
    assert!(outcome.is_concluded());
    assert_eq!(client.phase(), HandshakePhase::Disconnected);
    assert!(rx.try_recv().is_err());
}
