use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use labrooms::{AppState, config::ServerConfig, db::SqliteMessageStore, rooms};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "labrooms=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(host = %config.host, port = config.port, "Loaded server configuration");

    let store = SqliteMessageStore::connect(&config.database_url)
        .await
        .context("failed to open message store")?;
    tracing::info!("Message store ready");

    let (hub, persistence_handle) = rooms::Hub::spawn(Arc::new(store));
    let heartbeat_handle = rooms::start_heartbeat(Arc::clone(&hub), config.heartbeat_interval);
    let sweep_handle = rooms::start_snapshot_sweep(
        Arc::clone(&hub),
        config.snapshot_sweep_interval,
        config.snapshot_ttl,
    );

    let app = labrooms::router(AppState {
        hub: Arc::clone(&hub),
    })
    .layer(TraceLayer::new_for_http())
    .layer(build_cors_layer(&config)?);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .context("failed to bind listener")?;
    tracing::info!(addr = %listener.local_addr()?, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&hub)))
        .await?;

    heartbeat_handle.abort();
    sweep_handle.abort();

    // The writer drains its queue once the last hub handle is gone.
    drop(hub);
    if tokio::time::timeout(Duration::from_secs(5), persistence_handle)
        .await
        .is_err()
    {
        tracing::warn!("Persistence writer did not finish in time");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM, then close every room socket so the server
/// can drain.
async fn shutdown_signal(hub: Arc<rooms::Hub>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }

    hub.shutdown_all().await;
}

fn build_cors_layer(config: &ServerConfig) -> anyhow::Result<CorsLayer> {
    let origins = config
        .cors_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("invalid CORS origin {origin:?}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_credentials(true))
}
