//! Manifest Service
//!
//! Answers "latest release on channel C" and accepts new releases:
//! - Channels form a closed set fixed at startup
//! - The checksum is always computed here, never taken from the publisher
//! - A publish must be strictly newer than the channel's latest
//! - Publishes are serialized; reads are not

use crate::error::RegistryError;
use crate::store::ArtifactStore;
use chrono::Utc;
use hoist_common::bundle::read_marker;
use hoist_common::checksum::sha256_bytes;
use hoist_common::release::{
    artifact_reference, latest_of, ChannelListing, ChannelStats, RegistryStats, Release,
    ReleaseSummary, DEFAULT_CHANNELS,
};
use hoist_common::version::{same_version, validate_version};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::info;

pub struct ManifestService {
    store: ArtifactStore,
    channels: Vec<String>,
    publish_lock: Mutex<()>,
}

impl ManifestService {
    pub fn new(store: ArtifactStore, channels: Vec<String>) -> Self {
        let channels = if channels.is_empty() {
            DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect()
        } else {
            channels
        };
        Self {
            store,
            channels,
            publish_lock: Mutex::new(()),
        }
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    fn known(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
    }

    /// Latest release on `channel`. Unknown channels have no releases.
    pub fn get_latest(&self, channel: &str) -> Result<Option<Release>, RegistryError> {
        if !self.known(channel) {
            return Ok(None);
        }
        let releases = self.store.releases(channel)?;
        Ok(latest_of(&releases).cloned())
    }

    pub async fn publish(
        &self,
        channel: &str,
        version: &str,
        bytes: &[u8],
        notes: &str,
    ) -> Result<Release, RegistryError> {
        if !self.known(channel) {
            return Err(RegistryError::UnknownChannel(channel.to_string()));
        }
        let parsed = validate_version(version)
            .map_err(|_| RegistryError::InvalidVersion(version.to_string()))?;
        if bytes.is_empty() {
            return Err(RegistryError::InvalidArtifact("empty body".to_string()));
        }
        match read_marker(bytes) {
            Ok(Some(marker)) if same_version(&marker, version) => {}
            Ok(Some(marker)) => {
                return Err(RegistryError::InvalidArtifact(format!(
                    "VERSION marker says {}, publishing {}",
                    marker, version
                )))
            }
            Ok(None) => {
                return Err(RegistryError::InvalidArtifact(
                    "bundle has no VERSION marker".to_string(),
                ))
            }
            Err(e) => {
                return Err(RegistryError::InvalidArtifact(format!(
                    "not a tar.gz bundle: {}",
                    e
                )))
            }
        }

        let _guard = self.publish_lock.lock().await;

        if let Some(latest) = self.get_latest(channel)? {
            let newer = latest.parsed_version().map_or(true, |current| parsed > current);
            if !newer {
                return Err(RegistryError::NotNewer {
                    channel: channel.to_string(),
                    version: version.to_string(),
                    latest: latest.version,
                });
            }
        }

        let release = Release {
            version: version.to_string(),
            channel: channel.to_string(),
            checksum: sha256_bytes(bytes),
            size_bytes: bytes.len() as u64,
            artifact_reference: artifact_reference(channel, version),
            notes: notes.to_string(),
            published_at: Utc::now(),
            download_url: None,
        };
        self.store.put(&release, bytes)?;

        info!(
            "Published {} on {} ({} bytes, sha256 {})",
            release.version, release.channel, release.size_bytes, release.checksum
        );
        Ok(release)
    }

    /// All versions on `channel`, newest first.
    pub fn list(&self, channel: &str) -> Result<ChannelListing, RegistryError> {
        if !self.known(channel) {
            return Err(RegistryError::UnknownChannel(channel.to_string()));
        }
        let mut releases = self.store.releases(channel)?;
        releases.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.parsed_version().cmp(&a.parsed_version()))
        });
        Ok(ChannelListing {
            channel: channel.to_string(),
            versions: releases.iter().map(ReleaseSummary::from).collect(),
        })
    }

    pub fn stats(&self) -> Result<RegistryStats, RegistryError> {
        let mut stats = RegistryStats::default();
        for channel in &self.channels {
            let releases = self.store.releases(channel)?;
            stats.channels.insert(
                channel.clone(),
                ChannelStats {
                    latest_version: latest_of(&releases).map(|r| r.version.clone()),
                    total_versions: releases.len(),
                },
            );
        }
        Ok(stats)
    }

    /// Release metadata plus the artifact path, for downloads.
    pub fn artifact(&self, channel: &str, version: &str) -> Result<(Release, PathBuf), RegistryError> {
        let not_found = || RegistryError::NotFound {
            channel: channel.to_string(),
            version: version.to_string(),
        };
        if !self.known(channel) {
            return Err(not_found());
        }
        let release = self.store.get(channel, version)?;
        let path = self
            .store
            .resolve(&release.artifact_reference)
            .ok_or_else(not_found)?;
        Ok((release, path))
    }
}
