use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use forge_admin_rust::app::{app, AppState};
use forge_admin_rust::config;
use forge_admin_rust::database::DatabaseManager;
use forge_admin_rust::hierarchy::{BroadcastSink, Hierarchy};
use forge_admin_rust::store::{HierarchyStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, SECURITY_JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::config();
    tracing::info!("Starting Forge admin API in {:?} mode", config.environment);

    let pool = DatabaseManager::pool().await?;
    let store = PgStore::new(pool);
    store.migrate().await.context("running migrations")?;

    let store: Arc<dyn HierarchyStore> = Arc::new(store);
    let events = Arc::new(BroadcastSink::default());
    let hierarchy = Hierarchy::load(store, events, config.provisioning.clone()).await?;

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Forge admin API listening on http://{}", bind_addr);

    axum::serve(listener, app(AppState::new(hierarchy, true)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    DatabaseManager::close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
