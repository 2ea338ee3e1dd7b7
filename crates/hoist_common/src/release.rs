//! Release metadata shared by the registry and the update client

use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Channels a fresh registry and a fresh client agree on.
pub const DEFAULT_CHANNELS: [&str; 2] = ["stable", "testing"];

/// Default channel for new client configurations.
pub const DEFAULT_CHANNEL: &str = "stable";

/// One published, immutable release on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub version: String,
    pub channel: String,
    /// Lowercase hex SHA-256 of the artifact bytes
    pub checksum: String,
    pub size_bytes: u64,
    /// `<channel>/<version>/<file>`, resolvable by the artifact store
    pub artifact_reference: String,
    #[serde(default)]
    pub notes: String,
    pub published_at: DateTime<Utc>,
    /// Absolute or server-relative URL, filled in when served over HTTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl Release {
    pub fn parsed_version(&self) -> Option<Version> {
        Version::parse(&self.version)
    }

    /// File name component of the artifact reference.
    pub fn artifact_file_name(&self) -> &str {
        self.artifact_reference
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("release.tar.gz")
    }
}

/// Artifact file name used by the registry for a version.
pub fn artifact_file_name(version: &str) -> String {
    format!("release-{}.tar.gz", version)
}

/// Build the `<channel>/<version>/<file>` reference for a release.
pub fn artifact_reference(channel: &str, version: &str) -> String {
    format!("{}/{}/{}", channel, version, artifact_file_name(version))
}

/// Newest release by `published_at`, version as tie-break.
pub fn latest_of<'a, I>(releases: I) -> Option<&'a Release>
where
    I: IntoIterator<Item = &'a Release>,
{
    releases.into_iter().max_by(|a, b| {
        a.published_at
            .cmp(&b.published_at)
            .then_with(|| a.parsed_version().cmp(&b.parsed_version()))
    })
}

/// Entry in a channel listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSummary {
    pub version: String,
    pub size_bytes: u64,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}

impl From<&Release> for ReleaseSummary {
    fn from(release: &Release) -> Self {
        Self {
            version: release.version.clone(),
            size_bytes: release.size_bytes,
            published_at: release.published_at,
            notes: release.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelListing {
    pub channel: String,
    /// Newest first
    pub versions: Vec<ReleaseSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub latest_version: Option<String>,
    pub total_versions: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub channels: BTreeMap<String, ChannelStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn release(version: &str, ts: i64) -> Release {
        Release {
            version: version.to_string(),
            channel: "stable".to_string(),
            checksum: "00".repeat(32),
            size_bytes: 10,
            artifact_reference: artifact_reference("stable", version),
            notes: String::new(),
            published_at: Utc.timestamp_opt(ts, 0).unwrap(),
            download_url: None,
        }
    }

    #[test]
    fn test_latest_by_published_at() {
        let releases = vec![release("1.0.0", 100), release("1.1.0", 200)];
        assert_eq!(latest_of(&releases).unwrap().version, "1.1.0");
    }

    #[test]
    fn test_latest_tie_break_by_version() {
        let releases = vec![release("1.2.0", 100), release("1.10.0", 100)];
        assert_eq!(latest_of(&releases).unwrap().version, "1.10.0");
    }

    #[test]
    fn test_artifact_file_name() {
        let r = release("2.0.0", 1);
        assert_eq!(r.artifact_reference, "stable/2.0.0/release-2.0.0.tar.gz");
        assert_eq!(r.artifact_file_name(), "release-2.0.0.tar.gz");
    }

    #[test]
    fn test_download_url_omitted_when_absent() {
        let json = serde_json::to_string(&release("1.0.0", 1)).unwrap();
        assert!(!json.contains("download_url"));
    }
}
