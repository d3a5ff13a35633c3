// crates/admin/src/main.rs
//! Admin service binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use datasets_pipeline_admin::{create_app, init_metrics, AdminConfig, AppState};
use datasets_pipeline_common::{CacheStore, CommonConfig, JobQueue};
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let common = CommonConfig::from_env();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&common.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();

    init_metrics();

    let graph = Arc::new(
        common
            .load_graph()
            .context("Failed to load the processing graph")?,
    );
    let config = AdminConfig::from_env();
    let port = config.port;
    let queue = Arc::new(JobQueue::new(Arc::clone(&graph)));
    let state = AppState::new(graph, queue, Arc::new(CacheStore::new()), config);
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "Admin service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
