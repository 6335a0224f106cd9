//! Server startup and lifecycle

use crate::config::{Backend, GatewayConfig, StoreSettings};
use crate::{routes, Gateway};
use axum::Router;
use gcsproxy_store::{GcsObjectStore, MemoryObjectStore, ObjectStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{info, warn};

/// Open the store client the settings select
pub fn build_store(settings: &StoreSettings) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match settings.backend {
        Backend::Memory => {
            warn!("Using in-memory storage, data will NOT persist");
            Ok(Arc::new(MemoryObjectStore::new()))
        }
        Backend::Gcs => {
            let store = GcsObjectStore::new(settings.gcs_config())?;
            info!(bucket = %store.bucket(), "Using Cloud Storage bucket");
            Ok(Arc::new(store))
        }
    }
}

/// The gateway's router, with `fallback_dir` as the pass-through target when given
pub fn build_app(gateway: Gateway, fallback_dir: Option<PathBuf>) -> Router {
    match fallback_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "Pass-through requests are served from disk");
            routes::create_router_with_fallback(gateway, Router::new().fallback_service(ServeDir::new(dir)))
        }
        None => routes::create_router(gateway),
    }
}

/// Run the gateway server
pub async fn run_server(
    addr: SocketAddr,
    config: GatewayConfig,
    settings: StoreSettings,
    fallback_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    run_server_with_shutdown(addr, config, settings, fallback_dir, shutdown_signal()).await
}

/// Run server with graceful shutdown
pub async fn run_server_with_shutdown(
    addr: SocketAddr,
    config: GatewayConfig,
    settings: StoreSettings,
    fallback_dir: Option<PathBuf>,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let store = build_store(&settings)?;
    let gateway = Gateway::new(config, Arc::clone(&store))?;
    let app = build_app(gateway, fallback_dir);

    let listener = TcpListener::bind(addr).await?;
    info!("gcsproxy listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    store.close().await?;
    info!("Gateway shutdown complete");

    Ok(())
}

/// Resolves on Ctrl-C
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
