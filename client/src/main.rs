//! vigil-agent - the monitored endpoint
//!
//! Connects to a vigil server, ensures the account exists, logs in,
//! and streams frames until the connection drops. Real screen capture
//! plugs in behind `FrameSource`; this binary ships a synthetic
//! pattern source.

use anyhow::{bail, Result};
use async_trait::async_trait;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use vigil_client::config::ClientConfig;
use vigil_client::{Client, FrameSource};

/// vigil agent - streams periodic screen captures to a vigil server
#[derive(Parser, Debug)]
#[command(name = "vigil-agent")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "vigil-agent.toml")]
    config: String,

    /// Run in verbose mode
    #[arg(short, long)]
    verbose: bool,
}

/// Deterministic stand-in for a screen grabber
struct SyntheticFrameSource {
    counter: u64,
}

#[async_trait]
impl FrameSource for SyntheticFrameSource {
    async fn capture(&mut self) -> Result<Vec<u8>> {
        self.counter += 1;
        let mut frame = Vec::with_capacity(4096);
        frame.extend_from_slice(&self.counter.to_le_bytes());
        frame.resize(4096, (self.counter % 256) as u8);
        Ok(frame)
    }
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

    info!("vigil-agent v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::load(&args.config).await?;
    let mut client = Client::connect(&config.server).await?;

    // First run registers the account; an "Internal server error"
    // response here usually means it already exists.
    let registered = client.register(&config.username, &config.password).await?;
    if !registered.success {
        warn!("register: {}", registered.message);
    }

    let login = client
        .authenticate(&config.username, &config.password, &config.client_id)
        .await?;
    if !login.success {
        bail!("login failed: {}", login.message);
    }
    info!("logged in as {}", config.username);

    client
        .run_monitor(SyntheticFrameSource { counter: 0 }, config.period())
        .await?;
    Ok(())
}
