//! Release source: where the update client learns about and fetches releases
//!
//! `ReleaseSource` is the seam between the Update Client Core and the Manifest
//! Service. Production code uses `HttpReleaseSource` against a hoist registry;
//! tests substitute an in-memory fake.

use crate::config::UpdateConfig;
use crate::error::UpdateError;
use crate::release::Release;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("hoist/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Release Source Trait
// ============================================================================

#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Latest release on `channel`, `None` when the channel has none (or is unknown).
    async fn latest(&self, channel: &str) -> Result<Option<Release>, UpdateError>;

    /// Fetch the artifact bytes of `release` into `dest`. Returns bytes written.
    async fn download(&self, release: &Release, dest: &Path) -> Result<u64, UpdateError>;
}

// ============================================================================
// HTTP Release Source (Production)
// ============================================================================

/// Talks to a hoist registry over HTTP.
pub struct HttpReleaseSource {
    client: reqwest::Client,
    base_url: String,
    download_timeout: Duration,
}

impl HttpReleaseSource {
    pub fn new(
        base_url: &str,
        manifest_timeout: Duration,
        download_timeout: Duration,
    ) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(manifest_timeout)
            .timeout(manifest_timeout)
            .build()
            .map_err(|e| UpdateError::NetworkFailure(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            download_timeout,
        })
    }

    pub fn from_config(config: &UpdateConfig) -> Result<Self, UpdateError> {
        Self::new(
            &config.update_server,
            config.network.manifest_timeout(),
            config.network.download_timeout(),
        )
    }

    /// Absolute download URL for a release.
    pub fn download_url(&self, release: &Release) -> String {
        match &release.download_url {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => url.clone(),
            Some(path) => format!("{}/{}", self.base_url, path.trim_start_matches('/')),
            None => format!(
                "{}/api/download/{}/{}",
                self.base_url, release.channel, release.version
            ),
        }
    }
}

fn network(context: &str, e: impl std::fmt::Display) -> UpdateError {
    UpdateError::NetworkFailure(format!("{}: {}", context, e))
}

#[async_trait]
impl ReleaseSource for HttpReleaseSource {
    async fn latest(&self, channel: &str) -> Result<Option<Release>, UpdateError> {
        let url = format!("{}/api/version/{}", self.base_url, channel);
        debug!("Querying manifest: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| network("manifest request", e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(network("manifest request", response.status()));
        }

        let release: Release = response
            .json()
            .await
            .map_err(|e| network("invalid manifest", e))?;

        if release.channel != channel {
            warn!(
                "Manifest for channel {} answered with channel {}; ignoring",
                channel, release.channel
            );
            return Ok(None);
        }
        Ok(Some(release))
    }

    async fn download(&self, release: &Release, dest: &Path) -> Result<u64, UpdateError> {
        let url = self.download_url(release);
        debug!("Downloading {} -> {}", url, dest.display());

        let mut response = self
            .client
            .get(&url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| network("download request", e))?;

        if !response.status().is_success() {
            return Err(network("download request", response.status()));
        }
        if let Some(length) = response.content_length() {
            if length != release.size_bytes {
                return Err(UpdateError::NetworkFailure(format!(
                    "content length {} does not match release size {}",
                    length, release.size_bytes
                )));
            }
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = File::create(dest).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| network("download interrupted", e))?
        {
            written += chunk.len() as u64;
            if written > release.size_bytes {
                return Err(UpdateError::NetworkFailure(format!(
                    "download exceeded release size {}",
                    release.size_bytes
                )));
            }
            file.write_all(&chunk).await?;
        }
        file.sync_all().await?;

        if written != release.size_bytes {
            return Err(UpdateError::NetworkFailure(format!(
                "truncated download: {} of {} bytes",
                written, release.size_bytes
            )));
        }
        Ok(written)
    }
}
