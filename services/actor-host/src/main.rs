//! engage actor host
//!
//! Serves keyed actor state (engagement counters and live presence) over
//! HTTP. Each key is owned by one in-memory actor that writes through to
//! the durable store before replying.

use std::sync::Arc;

use anyhow::{Context, Result};
use engage_actor_host::{
    actors::{CounterDeps, PresenceDeps},
    api,
    clock::SystemClock,
    config::{self, StoreBackend},
    state::AppState,
};
use engage_store::{DurableStore, MemoryStore, SqliteStore};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to ENGAGE_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting engage actor host");
    info!(
        listen_addr = %config.listen_addr,
        store = ?config.store,
        idle_timeout = ?config.idle_timeout,
        "Configuration loaded"
    );

    // Open the durable store
    let store: Arc<dyn DurableStore> = match config.store {
        StoreBackend::Sqlite => {
            std::fs::create_dir_all(&config.data_dir).with_context(|| {
                format!("failed to create data dir {}", config.data_dir.display())
            })?;
            let path = config.database_path();
            match SqliteStore::open(&path) {
                Ok(store) => {
                    info!(path = %path.display(), "SQLite store opened");
                    Arc::new(store)
                }
                Err(e) => {
                    error!(error = %e, path = %path.display(), "Failed to open store");
                    return Err(e.into());
                }
            }
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; actor state will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Create application state
    let counter_deps =
        CounterDeps::new(store.clone()).with_known_fields(config.counter_fields.clone());
    let presence_deps = PresenceDeps::new(store.clone(), Arc::new(SystemClock))
        .with_timeout(config.presence_timeout);
    let state = AppState::new(store, counter_deps, presence_deps, config.registry());

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Build and run the server
    let app = api::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    // Spawn the server with graceful shutdown
    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    // Wait for shutdown signal (Ctrl+C)
    let server_running = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            true
        }
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
            false
        }
    };

    // Stop accepting requests, then let in-flight ones finish
    shutdown_tx.send_replace(true);
    if server_running {
        let shutdown_timeout = std::time::Duration::from_secs(10);
        if tokio::time::timeout(shutdown_timeout, server_handle)
            .await
            .is_err()
        {
            warn!("HTTP server did not shut down in time");
        }
    }

    // Drain actor mailboxes
    info!("Waiting for actors to shut down...");
    state.shutdown().await;

    info!("Actor host shutdown complete");
    Ok(())
}
