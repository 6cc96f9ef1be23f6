//! lanshare server
//!
//! LAN presence, live device events and signaling for direct transfers.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (port 8080, falls back to the next free port)
//! lanshare
//!
//! # Explicit port and config file, JSON logs
//! PORT=9000 lanshare --config ./lanshare.toml --log-json
//!
//! # Print a sample config
//! lanshare --print-config > lanshare.toml
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use lanshare_core::Config;
use lanshare_server::{bind_with_fallback, serve, shutdown_signal, AppState};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "lanshare")]
#[command(about = "LAN presence and signaling server")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Bind address (overrides the config file)
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Config file path (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Print a sample config file and exit
    #[arg(long)]
    print_config: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", Config::sample());
        return Ok(());
    }

    init_tracing(args.log_json);

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    info!("Starting lanshare");

    let listener = bind_with_fallback(
        config.server.bind,
        config.server.port,
        config.server.port_retries,
    )
    .await
    .with_context(|| format!("failed to bind {}:{}", config.server.bind, config.server.port))?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let state = Arc::new(AppState::new(config, shutdown));
    serve(listener, state).await?;

    Ok(())
}
