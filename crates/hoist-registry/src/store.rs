//! Artifact Store
//!
//! Immutable release packages on disk:
//!
//! ```text
//! <root>/<channel>/<version>/release-<version>.tar.gz
//! <root>/<channel>/<version>/release.json
//! ```
//!
//! A release is written into `<root>/.staging/<uuid>/` and renamed into place
//! in one step, so readers never see a half-written version directory.

use crate::error::RegistryError;
use hoist_common::atomic::remove_path;
use hoist_common::paths::is_path_segment;
use hoist_common::release::Release;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RELEASE_META_FILE: &str = "release.json";
const STAGING_DIR: &str = ".staging";

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `None` unless both names are single plain path components.
    fn version_dir(&self, channel: &str, version: &str) -> Option<PathBuf> {
        (is_path_segment(channel) && is_path_segment(version))
            .then(|| self.root.join(channel).join(version))
    }

    /// Store `bytes` as the artifact of `release`. Fails if the version exists.
    pub fn put(&self, release: &Release, bytes: &[u8]) -> Result<(), RegistryError> {
        let target = self
            .version_dir(&release.channel, &release.version)
            .ok_or_else(|| RegistryError::InvalidVersion(release.version.clone()))?;
        if target.exists() {
            return Err(RegistryError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", target.display()),
            )));
        }

        let staging = self
            .root
            .join(STAGING_DIR)
            .join(uuid::Uuid::new_v4().to_string());
        if let Err(e) = Self::write_staged(&staging, release, bytes) {
            let _ = remove_path(&staging);
            return Err(e);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Err(e) = fs::rename(&staging, &target) {
            let _ = remove_path(&staging);
            return Err(e.into());
        }
        debug!("Stored {} ({} bytes)", release.artifact_reference, bytes.len());
        Ok(())
    }

    fn write_staged(dir: &Path, release: &Release, bytes: &[u8]) -> Result<(), RegistryError> {
        fs::create_dir_all(dir)?;

        let mut artifact = fs::File::create(dir.join(release.artifact_file_name()))?;
        artifact.write_all(bytes)?;
        artifact.sync_all()?;

        let meta = serde_json::to_vec_pretty(release)?;
        fs::write(dir.join(RELEASE_META_FILE), meta)?;
        Ok(())
    }

    /// Every stored release on `channel`, in no particular order.
    pub fn releases(&self, channel: &str) -> Result<Vec<Release>, RegistryError> {
        if !is_path_segment(channel) {
            return Ok(Vec::new());
        }
        let entries = match fs::read_dir(self.root.join(channel)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut releases = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let meta = entry.path().join(RELEASE_META_FILE);
            match fs::read(&meta)
                .map_err(RegistryError::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<Release>(&bytes)?))
            {
                Ok(release) => releases.push(release),
                Err(e) => warn!("Skipping unreadable release {}: {}", meta.display(), e),
            }
        }
        Ok(releases)
    }

    pub fn get(&self, channel: &str, version: &str) -> Result<Release, RegistryError> {
        let not_found = || RegistryError::NotFound {
            channel: channel.to_string(),
            version: version.to_string(),
        };
        let meta = self
            .version_dir(channel, version)
            .ok_or_else(not_found)?
            .join(RELEASE_META_FILE);
        match fs::read(&meta) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve an `artifact_reference` to a file under the store root.
    pub fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let relative = Path::new(reference);
        let safe = relative
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)));
        if !safe {
            return None;
        }
        let path = self.root.join(relative);
        path.is_file().then_some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_common::release::artifact_reference;
    use tempfile::TempDir;

    fn release(version: &str) -> Release {
        Release {
            version: version.to_string(),
            channel: "stable".to_string(),
            checksum: "ab".repeat(32),
            size_bytes: 3,
            artifact_reference: artifact_reference("stable", version),
            notes: "fixes".to_string(),
            published_at: chrono::Utc::now(),
            download_url: None,
        }
    }

    #[test]
    fn test_put_then_read_back() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let r = release("1.0.0");
        store.put(&r, b"abc").unwrap();

        assert_eq!(store.get("stable", "1.0.0").unwrap(), r);
        assert_eq!(store.releases("stable").unwrap(), vec![r.clone()]);

        let path = store.resolve(&r.artifact_reference).unwrap();
        assert_eq!(fs::read(path).unwrap(), b"abc");
        // Staging area left empty
        assert_eq!(fs::read_dir(temp.path().join(STAGING_DIR)).unwrap().count(), 0);
    }

    #[test]
    fn test_put_is_immutable() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        store.put(&release("1.0.0"), b"abc").unwrap();
        assert!(store.put(&release("1.0.0"), b"xyz").is_err());

        let path = store.resolve("stable/1.0.0/release-1.0.0.tar.gz").unwrap();
        assert_eq!(fs::read(path).unwrap(), b"abc");
    }

    #[test]
    fn test_missing_channel_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        assert!(store.releases("testing").unwrap().is_empty());
        assert!(matches!(
            store.get("testing", "1.0.0"),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_put_refuses_names_outside_root() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().join("root"));

        let mut escaping = release("1.0.0");
        escaping.version = "1.0.0-x/../../../escaped".to_string();
        assert!(matches!(
            store.put(&escaping, b"abc"),
            Err(RegistryError::InvalidVersion(_))
        ));

        let mut bad_channel = release("1.0.0");
        bad_channel.channel = "..".to_string();
        assert!(store.put(&bad_channel, b"abc").is_err());

        assert!(!temp.path().join("escaped").exists());
        assert!(!temp.path().join("1.0.0").exists());
        assert!(store.releases("../root").unwrap().is_empty());
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().join("root"));
        fs::write(temp.path().join("secret"), "x").unwrap();
        assert!(store.resolve("../secret").is_none());
        assert!(store.resolve("/etc/passwd").is_none());
    }
}
