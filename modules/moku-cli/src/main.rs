//! `moku`: the binary gluing the registry and orchestrator crates behind an
//! HTTP surface. Loads config, logs a startup banner, builds the router,
//! serves.

mod error;
mod routes;

use std::sync::Arc;

use anyhow::Result;
use moku_core::config::Config;
use moku_orchestrator::{NullEnumerator, Orchestrator};
use moku_registry::Registry;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub struct AppState {
    pub registry: Arc<Registry>,
    pub orchestrator: Arc<Orchestrator>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("moku=info".parse()?))
        .init();

    info!("moku starting...");

    let config = Config::from_env();
    info!(
        storage_root = %config.storage_root.display(),
        webclient_backend = ?config.webclient_backend,
        "configuration loaded",
    );

    let registry = Arc::new(Registry::open(config.storage_root.clone()).await?);
    let orchestrator = Orchestrator::new(registry.clone(), config, Arc::new(NullEnumerator));

    let state = Arc::new(AppState {
        registry,
        orchestrator: orchestrator.clone(),
    });

    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let host = std::env::var("MOKU_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("MOKU_PORT").unwrap_or_else(|_| "8420".to_string());
    let addr = format!("{host}:{port}");

    info!("moku listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received, closing orchestrator");
    };

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown);
    if let Err(e) = serve.await {
        tracing::error!(error = %e, "server exited with error");
    }

    orchestrator.close().await;
    Ok(())
}
