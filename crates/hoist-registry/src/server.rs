//! HTTP server for hoist-registry

use crate::manifest::ManifestService;
use crate::routes;
use crate::store::ArtifactStore;
use anyhow::{Context, Result};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Default ceiling on uploaded bundle size: 512 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub listen: String,
    pub root: PathBuf,
    pub channels: Vec<String>,
    pub max_upload_bytes: usize,
}

/// Application state shared across handlers
pub struct AppState {
    pub manifest: ManifestService,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(manifest: ManifestService) -> Self {
        Self {
            manifest,
            start_time: Instant::now(),
        }
    }
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .merge(routes::manifest_routes())
        .merge(routes::artifact_routes(max_upload_bytes))
        .merge(routes::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until the process is stopped.
pub async fn run(options: ServeOptions) -> Result<()> {
    std::fs::create_dir_all(&options.root)
        .with_context(|| format!("creating store root {}", options.root.display()))?;
    let manifest = ManifestService::new(ArtifactStore::new(&options.root), options.channels);
    info!(
        "Serving channels [{}] from {}",
        manifest.channels().join(", "),
        options.root.display()
    );

    let app = router(Arc::new(AppState::new(manifest)), options.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&options.listen)
        .await
        .with_context(|| format!("binding {}", options.listen))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}
