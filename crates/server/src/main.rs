//! m360-offline entry point.
//!
//! Boots the offline cache service in front of the configured origin and
//! serves it on a local HTTP listener. Logging goes to stderr as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use m360_client::{FetchConfig, HttpNetwork, Network, Registration, ServiceConfig};
use m360_core::{AppConfig, CacheStorage};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let origin = config.origin_url()?;

    let storage = CacheStorage::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache database {}", config.db_path.display()))?;
    let network: Arc<dyn Network> = Arc::new(HttpNetwork::new(FetchConfig::from(&config))?);

    let registration = Arc::new(Registration::new(storage, Arc::clone(&network)));
    match registration.register(ServiceConfig::try_from(&config)?).await {
        Ok(worker) => tracing::info!(store = %worker.version(), "offline cache active"),
        Err(e) => match registration.active_version().await {
            Some(store) => tracing::warn!(error = %e, %store, "install failed, serving previous cache"),
            None => tracing::warn!(error = %e, "install failed, forwarding without cache"),
        },
    }

    let app = handler::router(handler::AppState {
        registration,
        network,
        origin: origin.clone(),
        version: config.cache_version.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;

    tracing::info!(addr = %config.listen_addr, %origin, "starting m360-offline front");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
