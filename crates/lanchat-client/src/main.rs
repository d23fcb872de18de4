//! LanChat terminal client
//!
//! Signs in to a chat server, prints what others say and sends every typed
//! line to the room.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lanchat_client::{ChannelEvents, ChatClient, ClientEvent, HandshakePhase};
use lanchat_core::config::{self, ClientConfig};
use lanchat_protocol::Message;

#[derive(Parser)]
#[command(name = "lanchat")]
#[command(about = "Join a LanChat session on the local network")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Name to sign in with; asked interactively when omitted or taken
    #[arg(short, long)]
    name: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config: ClientConfig = match &args.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => config::load_or_default(&config::default_client_config_path())
            .context("Failed to load default client config")?,
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let (events, mut notifications) = ChannelEvents::new();
    let client = ChatClient::new(config, Arc::new(events));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // Sign in
    let mut next = Some(client.connect().await?);
    let mut name = args.name;
    while let Some(phase) = next {
        let input = match phase {
            HandshakePhase::AwaitingUsername => match name.take() {
                Some(name) => Some(name),
                None => match lines.next_line().await? {
                    Some(line) => Some(line),
                    None => {
                        client.stop().await;
                        return Ok(());
                    }
                },
            },
            _ => None,
        };

        let outcome = client.step(input.as_deref()).await?;
        println!("{}", outcome.message.content);
        next = outcome.next;
    }

    if !client.is_authenticated() {
        client.stop().await;
        std::process::exit(1);
    }
    let me = client.known_as().unwrap_or_default();

    // Chat
    loop {
        tokio::select! {
            notification = notifications.recv() => match notification {
                Some(ClientEvent::Broadcast(message)) => {
                    println!("{}: {}", message.from, message.content);
                }
                Some(ClientEvent::Authenticated(_)) => {}
                Some(ClientEvent::Disconnected) | None => {
                    println!("Disconnected from the server.");
                    break;
                }
            },
            line = lines.next_line() => match line? {
                Some(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    client.broadcast(Message::user(me.as_str(), line)).await?;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.stop().await;
    Ok(())
}
