//! Admin API routes for hoistd
//!
//! Localhost-only surface used by `hoistctl`:
//! - `GET  /v1/health`
//! - `GET  /v1/update/status`
//! - `POST /v1/update/check` (manual cycle, answered when it finishes)
//! - `GET  /v1/update/history?limit=N`
//! - `GET  /v1/backups`, `POST /v1/backups/prune`

use crate::server::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use hoist_common::api::{CheckResponse, HealthResponse, StatusReport};
use hoist_common::backup::{BackupInfo, PruneReport};
use hoist_common::{Trigger, UpdateAttempt, UpdateError};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

type AppStateArc = Arc<AppState>;
type ApiError = (StatusCode, String);

const DEFAULT_HISTORY_LIMIT: usize = 20;

fn internal(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// ============================================================================
// Health Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health_check))
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        phase: state.client.phase(),
    })
}

// ============================================================================
// Update Routes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub fn update_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/update/status", get(update_status))
        .route("/v1/update/check", post(update_check))
        .route("/v1/update/history", get(update_history))
}

async fn update_status(State(state): State<AppStateArc>) -> Json<StatusReport> {
    Json(state.client.status())
}

async fn update_check(State(state): State<AppStateArc>) -> (StatusCode, Json<CheckResponse>) {
    if state.client.is_busy() {
        return (StatusCode::CONFLICT, Json(CheckResponse::AlreadyChecking));
    }

    info!("Manual update check requested");
    // Run detached so a dropped HTTP connection cannot abort the cycle mid-way
    let client = state.client.clone();
    let shutdown = state.shutdown.clone();
    let cycle = tokio::spawn(async move { client.run_cycle(Trigger::Manual, &shutdown).await });

    match cycle.await {
        Ok(Ok(report)) => (
            StatusCode::OK,
            Json(CheckResponse::Completed {
                attempt: report.attempt,
            }),
        ),
        Ok(Err(UpdateError::AlreadyChecking)) => {
            (StatusCode::CONFLICT, Json(CheckResponse::AlreadyChecking))
        }
        Ok(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(CheckResponse::Error {
                message: e.to_string(),
            }),
        ),
        Err(e) => {
            error!("Manual update task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CheckResponse::Error {
                    message: e.to_string(),
                }),
            )
        }
    }
}

async fn update_history(
    State(state): State<AppStateArc>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<UpdateAttempt>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    state.client.history(limit).map(Json).map_err(internal)
}

// ============================================================================
// Backup Routes
// ============================================================================

pub fn backup_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/backups", get(list_backups))
        .route("/v1/backups/prune", post(prune_backups))
}

async fn list_backups(State(state): State<AppStateArc>) -> Result<Json<Vec<BackupInfo>>, ApiError> {
    state.client.backups().map(Json).map_err(internal)
}

async fn prune_backups(State(state): State<AppStateArc>) -> Result<Json<PruneReport>, ApiError> {
    match state.client.prune_backups() {
        Ok(report) => Ok(Json(report)),
        Err(UpdateError::AlreadyChecking) => Err((
            StatusCode::CONFLICT,
            UpdateError::AlreadyChecking.to_string(),
        )),
        Err(e) => Err(internal(e)),
    }
}
