//! # burrow-status
//!
//! Serves the status API until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use burrow_status::server;
use burrow_status::store::StatusStore;
use clap::Parser;

/// Status API for burrow hosts.
#[derive(Parser, Debug)]
#[command(name = "burrow-status", version, about, long_about = None)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8000", env = "BURROW_STATUS_BIND")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {e}", args.bind))?;
    let store = Arc::new(StatusStore::default());

    tokio::select! {
        result = server::serve(listener, store) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
    }
    Ok(())
}
