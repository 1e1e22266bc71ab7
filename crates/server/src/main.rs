// crates/server/src/main.rs
//! Dropstats binary.
//!
//! Opens the database, starts the background matrix refresh and runs until
//! Ctrl-C.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use dropstats_db::Database;
use dropstats_server::{start_refresh, AppState, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let startup_start = Instant::now();
    let config = ServerConfig::from_env()?;
    tracing::info!(
        db_path = %config.db_path.display(),
        refresh_interval = ?config.refresh_interval,
        refresh_delay = ?config.refresh_delay,
        "Starting dropstats v{}",
        env!("CARGO_PKG_VERSION")
    );

    let db = Arc::new(Database::new(&config.db_path).await?);
    let state = AppState::new(db, config);
    let refresh = start_refresh(&state).await;
    tracing::info!(
        elapsed_ms = startup_start.elapsed().as_millis() as u64,
        "Ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    refresh.shutdown().await;

    let progress = state.refresh.snapshot();
    tracing::info!(
        completed = progress.completed,
        failed = progress.failed,
        uptime_secs = state.uptime_secs(),
        "Stopped"
    );
    Ok(())
}
