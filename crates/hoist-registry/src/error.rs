//! Error types for the registry.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Version {version} is not newer than {latest} on {channel}")]
    NotNewer {
        channel: String,
        version: String,
        latest: String,
    },

    #[error("Release {channel}/{version} not found")]
    NotFound { channel: String, version: String },

    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    pub fn status(&self) -> StatusCode {
        match self {
            RegistryError::UnknownChannel(_) | RegistryError::NotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            RegistryError::InvalidVersion(_) => StatusCode::BAD_REQUEST,
            RegistryError::NotNewer { .. } => StatusCode::CONFLICT,
            RegistryError::InvalidArtifact(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RegistryError::Io(_) | RegistryError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Registry error: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let not_newer = RegistryError::NotNewer {
            channel: "stable".into(),
            version: "1.0.0".into(),
            latest: "1.1.0".into(),
        };
        assert_eq!(not_newer.status(), StatusCode::CONFLICT);
        assert_eq!(
            RegistryError::UnknownChannel("nightly".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RegistryError::InvalidArtifact("no marker".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
