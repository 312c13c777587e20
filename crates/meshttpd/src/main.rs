//! meshttpd - HTTP API daemon for a mesh radio
//!
//! Owns one bridge to a network-attached radio and serves its state over
//! a small REST API: send messages, poll telemetry, list nodes and
//! message history, check connection status.

mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use meshttpd_bridge::{BridgeConfigBuilder, MeshBridge, TcpChannel, DEFAULT_RADIO_PORT};

#[derive(Parser)]
#[command(name = "meshttpd")]
#[command(about = "HTTP API daemon for a Meshtastic-style mesh radio")]
struct Args {
    /// Radio address as host or host:port
    #[arg(long, default_value = "meshtastic.local")]
    radio: String,

    /// HTTP listen address
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Message history capacity
    #[arg(long)]
    history: Option<usize>,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

/// Application state shared across handlers
pub struct AppState {
    /// Bridge handle into the radio link
    pub bridge: MeshBridge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Default packet stream port unless one was given
    let radio_addr = if args.radio.contains(':') {
        args.radio.clone()
    } else {
        format!("{}:{}", args.radio, DEFAULT_RADIO_PORT)
    };

    let mut config = BridgeConfigBuilder::new();
    if let Some(capacity) = args.history {
        config = config.history_capacity(capacity);
    }

    info!(radio = %radio_addr, "starting meshttpd");
    let channel = Box::new(TcpChannel::new(radio_addr));
    let (bridge, _listener) = MeshBridge::spawn(channel, config.build());

    let state = Arc::new(AppState { bridge });
    let app = server::create_router(state);

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!(listen = %args.listen, "HTTP server ready");
    axum::serve(listener, app).await?;

    Ok(())
}
