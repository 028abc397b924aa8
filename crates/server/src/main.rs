use anyhow::{Context, Result};
use catalog::SnapshotStore;
use clap::Parser;
use common::{init_structured_logging, LoggingConfig};
use server::{router, CliArgs, ServerConfig};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let config = ServerConfig::from_env()?.apply_cli(&args);

    let logging = if config.log_json {
        LoggingConfig::json()
    } else {
        LoggingConfig::default()
    };
    init_structured_logging(logging)?;
    config.log_warnings();

    let mut store = SnapshotStore::new();
    store
        .initialize(config.initialize_options()?)
        .await
        .context("Failed to initialize snapshot store")?;
    if let Some(path) = store.database_path() {
        info!(path = %path.display(), "Snapshot store ready");
    }

    let store = Arc::new(Mutex::new(store));

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address()))?;
    info!(address = %listener.local_addr()?, "Catalog server listening");

    axum::serve(listener, router(store.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    store.lock().await.close();
    info!("Catalog server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => {
            warn!(error = %err, "Cannot listen for Ctrl-C, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
