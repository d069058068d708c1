use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use tracker_server::{serve, spawn_session_sweeper, AppState, Database, ServerConfig};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tracker_server=info,info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = ServerConfig::parse();

    let db = Database::open(&config.database)
        .with_context(|| format!("Failed to open database {:?}", config.database))?;
    let state = AppState::new(db.clone(), config.session_ttl());

    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let _sweeper = spawn_session_sweeper(db, SWEEP_INTERVAL);

    serve(listener, state).await.context("Server error")
}
