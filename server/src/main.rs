// server/src/main.rs

// Entry point for the eligibility-broker server: parses CLI flags, loads
// configuration, connects storage, and serves the HTTP API until a
// shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::info;
use tokio::signal::unix::{signal, SignalKind};

use eligibility_server::api::{routes, AppState};
use lib::config::load_app_config;
use lib::storage_engine::create_storage;

#[derive(Parser, Debug)]
#[command(name = "eligibility-server", about = "Clinic eligibility broker")]
struct ServerArgs {
    /// Port to bind; overrides configuration.
    #[arg(long)]
    port: Option<u16>,
    /// Optional YAML config overlay.
    #[arg(long)]
    config: Option<PathBuf>,
}

async fn handle_signals() {
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to set up SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to set up SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = ServerArgs::parse();
    let mut config = load_app_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    let port = config.bind_port;

    let storage = create_storage(&config.storage).await?;
    info!("Storage engine ready: {}", storage.get_type());

    let state = AppState::new(Arc::new(config), storage);
    let (addr, server) = warp::serve(routes(state))
        .bind_with_graceful_shutdown(([0, 0, 0, 0], port), handle_signals());
    info!("Eligibility broker listening on {}", addr);
    server.await;

    Ok(())
}
