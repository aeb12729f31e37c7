//! HTTP surface for the export pipeline.
//!
//! Endpoints:
//! - `POST /api/export` - JSON request body, one file or a zip in response
//! - `GET /api/export` - single-table form driven by query parameters
//! - `GET /api/health` - liveness and build info
//!
//! Both export endpoints require an approved admin's bearer token.

mod handlers;

use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth::AdminGate;
use crate::backend::ExportBackend;
use crate::export::ExportOptions;

pub use handlers::{export_get, export_post, health, ExportQuery};

/// Shared state for the HTTP handlers. Immutable; every request gets its
/// own export service.
pub struct AppState<B, G> {
    pub backend: Arc<B>,
    pub gate: Arc<G>,
    pub options: ExportOptions,
}

impl<B, G> AppState<B, G> {
    pub fn new(backend: Arc<B>, gate: Arc<G>, options: ExportOptions) -> Self {
        Self {
            backend,
            gate,
            options,
        }
    }
}

// Manual impl: `B` and `G` sit behind `Arc` and need not be `Clone`.
impl<B, G> Clone for AppState<B, G> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            gate: Arc::clone(&self.gate),
            options: self.options.clone(),
        }
    }
}

pub fn router<B: ExportBackend, G: AdminGate>(state: AppState<B, G>) -> Router {
    Router::new()
        .route(
            "/api/export",
            get(export_get::<B, G>).post(export_post::<B, G>),
        )
        .route("/api/health", get(health))
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` is cancelled. In-flight requests
/// are allowed to finish.
pub async fn serve<B: ExportBackend, G: AdminGate>(
    addr: SocketAddr,
    state: AppState<B, G>,
    shutdown: CancellationToken,
) -> Result<(), anyhow::Error> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind export server to {addr}: {e}"))?;
    let local = listener.local_addr()?;

    info!(addr = %local, "export server listening");
    info!("  - Export: http://{local}/api/export");
    info!("  - Health: http://{local}/api/health");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| anyhow::anyhow!("Export server error: {e}"))?;

    info!("export server stopped");
    Ok(())
}
