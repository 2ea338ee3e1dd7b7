//! HTTP client for the hoistd admin API.

use hoist_common::api::{CheckResponse, StatusReport};
use hoist_common::backup::{BackupInfo, PruneReport};
use hoist_common::{UpdateAttempt, UpdateConfig};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
/// Reads other than `check` should answer quickly.
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("hoistd is not reachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("hoistd answered {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response from hoistd: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ClientError::Unreachable { .. })
    }
}

pub struct DaemonClient {
    http: reqwest::Client,
    base_url: String,
}

impl DaemonClient {
    pub fn new(admin_listen: &str) -> Self {
        let base_url = if admin_listen.starts_with("http://") || admin_listen.starts_with("https://") {
            admin_listen.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", admin_listen)
        };
        Self {
            http: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url,
        }
    }

    pub fn from_config(config: &UpdateConfig) -> Self {
        Self::new(&config.admin_listen)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn unreachable(&self, e: reqwest::Error) -> ClientError {
        ClientError::Unreachable {
            url: self.base_url.clone(),
            reason: e.to_string(),
        }
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .timeout(QUERY_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        if !response.status().is_success() {
            return Err(ClientError::Api {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Self::decode(response).await
    }

    pub async fn status(&self) -> Result<StatusReport, ClientError> {
        self.get("/v1/update/status").await
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<UpdateAttempt>, ClientError> {
        self.get(&format!("/v1/update/history?limit={}", limit)).await
    }

    pub async fn backups(&self) -> Result<Vec<BackupInfo>, ClientError> {
        self.get("/v1/backups").await
    }

    /// Run a manual cycle. No overall timeout: the call returns when the cycle ends.
    /// 409 comes back as `CheckResponse::AlreadyChecking`, not as an error.
    pub async fn check(&self) -> Result<CheckResponse, ClientError> {
        let response = self
            .http
            .post(format!("{}/v1/update/check", self.base_url))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        Self::decode(response).await
    }

    pub async fn prune(&self) -> Result<PruneReport, ClientError> {
        let response = self
            .http
            .post(format!("{}/v1/backups/prune", self.base_url))
            .timeout(QUERY_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        if !response.status().is_success() {
            return Err(ClientError::Api {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_from_listen_addr() {
        assert_eq!(DaemonClient::new("127.0.0.1:7870").base_url(), "http://127.0.0.1:7870");
        assert_eq!(
            DaemonClient::new("http://localhost:9000/").base_url(),
            "http://localhost:9000"
        );
    }

    #[tokio::test]
    async fn test_unreachable_daemon() {
        // Port 9 (discard) is essentially never served on loopback
        let client = DaemonClient::new("127.0.0.1:9");
        let err = client.status().await.unwrap_err();
        assert!(err.is_unreachable());
    }
}
