mod api;
mod config;
mod ingest;
mod parser;
mod store;
mod store_manager;

use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use shared::protocol::UNKNOWN_DEVICE;
use crate::config::Config;
use crate::ingest::IngestStats;
use crate::store::LogDb;
use crate::store_manager::StoreHandle;

const DEFAULT_CONFIG_PATH: &str = "/etc/syslog-listener/listener.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // An explicit path must load; the default path is optional
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("Failed to load config from {}", DEFAULT_CONFIG_PATH))?,
        None => Config::default(),
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!("syslog_listenerd={}", config.logging.level))
            }),
        )
        .init();

    tracing::info!("Starting syslog-listenerd");

    // Open SQLite database
    let db = LogDb::open(&config.store.db_path)?;
    tracing::info!("Opened database at {:?}", config.store.db_path);

    // Start store thread
    let store = StoreHandle::spawn(db);
    let stats = Arc::new(IngestStats::default());

    // Every unvalidated source shares this row
    let (sentinel, _) = store
        .resolve_device(UNKNOWN_DEVICE.to_string())
        .await
        .context("Failed to register sentinel device")?;
    let existing = store.count_entries().await.context("Failed to count log entries")?;
    tracing::info!(
        "Store holds {} log entries; sentinel device {} has id {}",
        existing,
        sentinel.ip_address,
        sentinel.id
    );

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Bind and spawn the syslog receive loop
    let socket = ingest::udp::bind(&config.listener.listen).await?;
    let listener_cancel = cancel.clone();
    let listener_store = store.clone();
    let listener_stats = stats.clone();
    let max_datagram_size = config.listener.max_datagram_size;
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = ingest::udp::run_listener(
            socket,
            listener_store,
            listener_stats,
            max_datagram_size,
            listener_cancel,
        )
        .await
        {
            tracing::error!("Syslog listener error: {}", e);
        }
    });

    // Query API
    let server_handle = if config.api.enabled {
        let app = api::routes::router(api::routes::AppState {
            store: store.clone(),
            stats: stats.clone(),
        });

        let listener = tokio::net::TcpListener::bind(&config.api.listen)
            .await
            .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

        tracing::info!("API listening on {}", config.api.listen);

        let server_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_cancel.cancelled().await })
                .await
            {
                tracing::error!("Server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation
    cancel.cancel();

    // Wait for all tasks to complete
    let _ = listener_handle.await;
    if let Some(handle) = server_handle {
        let _ = handle.await;
    }

    // Shutdown store thread
    if let Err(e) = store.shutdown().await {
        tracing::error!("Failed to shutdown store: {}", e);
    }

    let snapshot = stats.snapshot();
    tracing::info!(
        received = snapshot.received,
        persisted = snapshot.persisted,
        failed = snapshot.failed,
        "Shutdown complete"
    );
    Ok(())
}
