//! vigild - the vigil supervising endpoint
//!
//! Accepts monitored endpoints, gates them through the handshake and
//! credential checks, and stores incoming screen frames on disk.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use vigil_server::{
    FsFrameSink, MemorySessionStore, MemoryUserStore, Server, ServerConfig, ServerEvent,
};

/// vigil server - credential-gated screen monitoring endpoint
#[derive(Parser, Debug)]
#[command(name = "vigild")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "vigild.toml")]
    config: String,

    /// Run in verbose mode
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("vigild v{}", env!("CARGO_PKG_VERSION"));

    let config = if Path::new(&args.config).exists() {
        let config = ServerConfig::load(&args.config).await?;
        info!("Loaded configuration from {}", args.config);
        config
    } else {
        info!("No config file at {}, using defaults", args.config);
        ServerConfig::default()
    };

    let server = Server::bind(
        &config,
        Arc::new(MemoryUserStore::new()),
        Arc::new(MemorySessionStore::new()),
        Arc::new(FsFrameSink::new(&config.storage.image_dir)),
    )
    .await?;

    // Mirror the event bus into the log; a GUI or management surface
    // would subscribe here instead.
    let mut events = server.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ServerEvent::IdentityCreated { identity } => {
                    info!(user = %identity.name, "event: identity created")
                }
                ServerEvent::LoggedIn {
                    identity,
                    session_id,
                } => info!(user = %identity.name, %session_id, "event: logged in"),
                ServerEvent::Disconnected { identity } => {
                    info!(user = %identity.name, "event: disconnected")
                }
                ServerEvent::FrameReceived { session_id, bytes } => {
                    info!(%session_id, len = bytes.len(), "event: frame received")
                }
            }
        }
    });

    server.run().await;
    Ok(())
}
