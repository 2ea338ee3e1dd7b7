//! HTTP routes for the registry

use crate::error::RegistryError;
use crate::server::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hoist_common::release::{ChannelListing, RegistryStats, Release};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::info;

type AppStateArc = Arc<AppState>;

/// Server-relative download path for a release.
pub fn download_path(channel: &str, version: &str) -> String {
    format!("/api/download/{}/{}", channel, version)
}

// ============================================================================
// Manifest Routes
// ============================================================================

pub fn manifest_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/version/:channel", get(latest_version))
        .route("/api/list/:channel", get(list_channel))
        .route("/api/stats", get(stats))
}

async fn latest_version(
    State(state): State<AppStateArc>,
    Path(channel): Path<String>,
) -> Result<Json<Release>, Response> {
    match state.manifest.get_latest(&channel) {
        Ok(Some(mut release)) => {
            release.download_url = Some(download_path(&release.channel, &release.version));
            Ok(Json(release))
        }
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no release on channel {}", channel) })),
        )
            .into_response()),
        Err(e) => Err(e.into_response()),
    }
}

async fn list_channel(
    State(state): State<AppStateArc>,
    Path(channel): Path<String>,
) -> Result<Json<ChannelListing>, RegistryError> {
    Ok(Json(state.manifest.list(&channel)?))
}

async fn stats(State(state): State<AppStateArc>) -> Result<Json<RegistryStats>, RegistryError> {
    Ok(Json(state.manifest.stats()?))
}

// ============================================================================
// Artifact Routes
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct PublishQuery {
    #[serde(default)]
    pub notes: String,
}

pub fn artifact_routes(max_upload_bytes: usize) -> Router<AppStateArc> {
    Router::new()
        .route("/api/download/:channel/:version", get(download))
        .route(
            "/api/publish/:channel/:version",
            post(publish).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
}

async fn download(
    State(state): State<AppStateArc>,
    Path((channel, version)): Path<(String, String)>,
) -> Result<Response, RegistryError> {
    let (release, path) = state.manifest.artifact(&channel, &version)?;
    let file = tokio::fs::File::open(&path).await?;
    let length = file.metadata().await?.len();

    let disposition = format!("attachment; filename=\"{}\"", release.artifact_file_name());
    Ok((
        [
            (header::CONTENT_TYPE, "application/gzip".to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

async fn publish(
    State(state): State<AppStateArc>,
    Path((channel, version)): Path<(String, String)>,
    Query(query): Query<PublishQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<Release>), RegistryError> {
    info!("Publish request: {} on {} ({} bytes)", version, channel, body.len());
    let release = state
        .manifest
        .publish(&channel, &version, &body, &query.notes)
        .await?;
    Ok((StatusCode::CREATED, Json(release)))
}

// ============================================================================
// Health
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppStateArc>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}
