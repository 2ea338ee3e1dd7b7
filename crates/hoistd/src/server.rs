//! Admin HTTP server for hoistd

use crate::routes;
use anyhow::{Context, Result};
use axum::Router;
use hoist_common::UpdateClient;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state shared across handlers
pub struct AppState {
    pub client: Arc<UpdateClient>,
    /// Cancelled on daemon shutdown; manual cycles honour it too
    pub shutdown: CancellationToken,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(client: Arc<UpdateClient>, shutdown: CancellationToken) -> Self {
        Self {
            client,
            shutdown,
            start_time: Instant::now(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::update_routes())
        .merge(routes::backup_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the admin API on `addr` until `shutdown` fires.
pub async fn run(state: AppState, addr: &str) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding admin API on {}", addr))?;
    let local = listener.local_addr()?;
    if !local.ip().is_loopback() {
        warn!("Admin API bound to non-loopback address {}", local);
    }
    info!("Admin API listening on http://{}", local);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
