//! Backup Manager
//!
//! Snapshots the data file and the installation tree before an update is
//! applied, restores them on rollback, and prunes old snapshots.
//!
//! Layout of one backup (`<state_dir>/backups/<id>/`):
//! - `backup.json`  metadata, written last
//! - `install/`     copy of the installation tree
//! - `data/<name>`  copy of the data file
//! - `.pinned`      present while an in-flight attempt depends on it
//!
//! A backup is built in `.<id>.partial` and renamed into place only once
//! complete, so a listed backup is always whole.

use crate::atomic::{atomic_write, copy_file_atomic, copy_tree, remove_path, swap_in_dir};
use crate::checksum::{checksums_match, sha256_file};
use crate::config::{RetentionConfig, UpdateConfig};
use crate::error::BackupError;
use crate::paths::sibling_path;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

pub const BACKUP_META_FILE: &str = "backup.json";
const PIN_FILE: &str = ".pinned";
const INSTALL_SUBDIR: &str = "install";
const DATA_SUBDIR: &str = "data";
const PARTIAL_SUFFIX: &str = ".partial";

/// Partial directories younger than this may belong to a running create.
const PARTIAL_GRACE: Duration = Duration::from_secs(3600);

/// Metadata stored in `backup.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub from_version: String,
    #[serde(default)]
    pub data_file_name: Option<String>,
    #[serde(default)]
    pub data_checksum: Option<String>,
    #[serde(default)]
    pub includes_install: bool,
    pub size_bytes: u64,
    /// Derived from the pin marker on read; the stored value is ignored
    #[serde(default)]
    pub pinned: bool,
}

/// Reference to a complete backup on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupHandle {
    pub id: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_count: usize,
    pub max_age: Option<ChronoDuration>,
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            max_count: config.max_count,
            max_age: (config.max_age_days > 0)
                .then(|| ChronoDuration::days(i64::from(config.max_age_days))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub removed: Vec<String>,
    pub kept: Vec<String>,
    pub partials_removed: usize,
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
    install_dir: PathBuf,
    data_file: Option<PathBuf>,
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>, install_dir: impl Into<PathBuf>, data_file: Option<PathBuf>) -> Self {
        Self {
            root: root.into(),
            install_dir: install_dir.into(),
            data_file,
        }
    }

    pub fn from_config(config: &UpdateConfig) -> Self {
        Self::new(
            config.state_paths().backups_dir,
            config.install_dir.clone(),
            config.data_file.clone(),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn new_id(from_version: &str) -> String {
        let version: String = from_version
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        format!(
            "backup_v{}_{}",
            version,
            Utc::now().format("%Y%m%d_%H%M%S_%3f")
        )
    }

    /// Snapshot the data file and installation tree.
    pub fn create(&self, from_version: &str) -> Result<BackupHandle, BackupError> {
        fs::create_dir_all(&self.root)?;

        let mut id = Self::new_id(from_version);
        let mut suffix = 1;
        while self.root.join(&id).exists() {
            id = format!("{}_{}", Self::new_id(from_version), suffix);
            suffix += 1;
        }

        let partial = self.root.join(format!(".{}{}", id, PARTIAL_SUFFIX));
        remove_path(&partial)?;

        let info = match self.write_snapshot(&partial, &id, from_version) {
            Ok(info) => info,
            Err(e) => {
                let _ = remove_path(&partial);
                return Err(e);
            }
        };

        let path = self.root.join(&id);
        if let Err(e) = fs::rename(&partial, &path) {
            let _ = remove_path(&partial);
            return Err(e.into());
        }

        info!(
            "Created backup {} ({} bytes, from {})",
            id, info.size_bytes, from_version
        );
        Ok(BackupHandle { id, path })
    }

    fn write_snapshot(&self, dir: &Path, id: &str, from_version: &str) -> Result<BackupInfo, BackupError> {
        fs::create_dir_all(dir)?;
        let mut size_bytes = 0;
        let mut data_file_name = None;
        let mut data_checksum = None;

        if let Some(data_file) = &self.data_file {
            if data_file.is_file() {
                let name = data_file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "data".to_string());
                let target = dir.join(DATA_SUBDIR).join(&name);
                size_bytes += copy_file_atomic(data_file, &target)?;
                data_checksum = Some(sha256_file(&target)?);
                data_file_name = Some(name);
            } else {
                warn!(
                    "Data file {} does not exist; backing up installation tree only",
                    data_file.display()
                );
            }
        }

        let includes_install = self.install_dir.is_dir();
        if includes_install {
            size_bytes += copy_tree(&self.install_dir, &dir.join(INSTALL_SUBDIR))?;
        }

        let info = BackupInfo {
            id: id.to_string(),
            created_at: Utc::now(),
            from_version: from_version.to_string(),
            data_file_name,
            data_checksum,
            includes_install,
            size_bytes,
            pinned: false,
        };
        atomic_write(&dir.join(BACKUP_META_FILE), &serde_json::to_vec_pretty(&info)?)?;
        Ok(info)
    }

    fn read_info(path: &Path) -> Result<BackupInfo, BackupError> {
        let content = fs::read_to_string(path.join(BACKUP_META_FILE))?;
        let mut info: BackupInfo = serde_json::from_str(&content)?;
        info.pinned = path.join(PIN_FILE).exists();
        Ok(info)
    }

    /// Look up a complete backup by id.
    pub fn open(&self, id: &str) -> Result<BackupHandle, BackupError> {
        let path = self.root.join(id);
        if id.starts_with('.') || !path.join(BACKUP_META_FILE).is_file() {
            return Err(BackupError::NotFound(id.to_string()));
        }
        Ok(BackupHandle {
            id: id.to_string(),
            path,
        })
    }

    /// Put the installation tree and data file back as they were.
    pub fn restore(&self, handle: &BackupHandle) -> Result<(), BackupError> {
        let info = Self::read_info(&handle.path)?;
        let corrupted = |reason: String| BackupError::Corrupted {
            id: handle.id.clone(),
            reason,
        };

        if info.includes_install {
            let snapshot = handle.path.join(INSTALL_SUBDIR);
            if !snapshot.is_dir() {
                return Err(corrupted("installation snapshot missing".to_string()));
            }
            let staged = sibling_path(&self.install_dir, "restore");
            remove_path(&staged)?;
            if let Err(e) = copy_tree(&snapshot, &staged) {
                let _ = remove_path(&staged);
                return Err(e.into());
            }
            swap_in_dir(&self.install_dir, &staged)?;
        }

        if let (Some(name), Some(data_file)) = (&info.data_file_name, &self.data_file) {
            let source = handle.path.join(DATA_SUBDIR).join(name);
            if !source.is_file() {
                return Err(corrupted(format!("data snapshot {} missing", name)));
            }
            copy_file_atomic(&source, data_file)?;
            if let Some(expected) = &info.data_checksum {
                let actual = sha256_file(data_file)?;
                if !checksums_match(expected, &actual) {
                    return Err(corrupted(format!(
                        "restored data file checksum {} != {}",
                        actual, expected
                    )));
                }
            }
        }

        info!("Restored backup {} (version {})", handle.id, info.from_version);
        Ok(())
    }

    /// Protect a backup from pruning.
    pub fn pin(&self, handle: &BackupHandle) -> Result<(), BackupError> {
        fs::write(handle.path.join(PIN_FILE), b"")?;
        Ok(())
    }

    pub fn unpin(&self, handle: &BackupHandle) -> Result<(), BackupError> {
        match fs::remove_file(handle.path.join(PIN_FILE)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Complete backups, newest first. Unreadable entries are skipped.
    pub fn list(&self) -> Result<Vec<BackupInfo>, BackupError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.file_type()?.is_dir() {
                continue;
            }
            match Self::read_info(&entry.path()) {
                Ok(info) => backups.push(info),
                Err(e) => warn!("Skipping unreadable backup {}: {}", name, e),
            }
        }

        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(backups)
    }

    /// Apply the retention policy.
    ///
    /// The newest backup and pinned backups always survive. Abandoned
    /// `.partial` directories are removed once they are old enough.
    pub fn prune(&self, policy: &RetentionPolicy) -> Result<PruneReport, BackupError> {
        let mut report = PruneReport::default();
        let now = Utc::now();
        let max_count = policy.max_count.max(1);

        for (idx, info) in self.list()?.into_iter().enumerate() {
            let too_many = idx >= max_count;
            let too_old = policy
                .max_age
                .map(|age| now - info.created_at > age)
                .unwrap_or(false);

            if idx == 0 || info.pinned || !(too_many || too_old) {
                report.kept.push(info.id);
                continue;
            }

            debug!("Pruning backup {} (too_many={}, too_old={})", info.id, too_many, too_old);
            remove_path(&self.root.join(&info.id))?;
            report.removed.push(info.id);
        }

        report.partials_removed = self.remove_stale_partials()?;

        if !report.removed.is_empty() {
            info!("Pruned {} backup(s), kept {}", report.removed.len(), report.kept.len());
        }
        Ok(report)
    }

    fn remove_stale_partials(&self) -> Result<usize, BackupError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !(name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX)) {
                continue;
            }
            let age = entry
                .metadata()?
                .modified()
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok())
                .unwrap_or_default();
            if age >= PARTIAL_GRACE {
                warn!("Removing abandoned partial backup {}", name);
                remove_path(&entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Sandbox {
        _temp: TempDir,
        install: PathBuf,
        data: PathBuf,
        manager: BackupManager,
    }

    fn sandbox() -> Sandbox {
        let temp = TempDir::new().unwrap();
        let install = temp.path().join("app");
        fs::create_dir_all(install.join("templates")).unwrap();
        fs::write(install.join("VERSION"), "1.0.0").unwrap();
        fs::write(install.join("templates/index.html"), "<h1>v1</h1>").unwrap();
        let data = temp.path().join("data/inventory.db");
        fs::create_dir_all(data.parent().unwrap()).unwrap();
        fs::write(&data, "rows-v1").unwrap();

        let manager = BackupManager::new(temp.path().join("backups"), &install, Some(data.clone()));
        Sandbox {
            _temp: temp,
            install,
            data,
            manager,
        }
    }

    #[test]
    fn test_create_then_restore() {
        let sb = sandbox();
        let handle = sb.manager.create("1.0.0").unwrap();
        assert!(handle.id.starts_with("backup_v1.0.0_"));
        assert!(handle.path.join(BACKUP_META_FILE).is_file());

        // Mutate both the tree and the data file
        fs::write(sb.install.join("VERSION"), "1.1.0").unwrap();
        fs::write(sb.install.join("new_file.py"), "x").unwrap();
        fs::write(&sb.data, "rows-v2").unwrap();

        sb.manager.restore(&handle).unwrap();

        assert_eq!(fs::read_to_string(sb.install.join("VERSION")).unwrap(), "1.0.0");
        assert!(!sb.install.join("new_file.py").exists());
        assert_eq!(fs::read_to_string(&sb.data).unwrap(), "rows-v1");
        // Restoring keeps the backup
        assert!(handle.path.exists());
    }

    #[test]
    fn test_list_newest_first() {
        let sb = sandbox();
        let first = sb.manager.create("1.0.0").unwrap();
        let second = sb.manager.create("1.0.0").unwrap();
        let listed = sb.manager.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        assert!(listed[0].data_checksum.is_some());
    }

    #[test]
    fn test_prune_by_count_keeps_pinned_and_newest() {
        let sb = sandbox();
        let oldest = sb.manager.create("1.0.0").unwrap();
        let middle = sb.manager.create("1.0.0").unwrap();
        let newest = sb.manager.create("1.0.0").unwrap();
        sb.manager.pin(&oldest).unwrap();

        let report = sb
            .manager
            .prune(&RetentionPolicy {
                max_count: 1,
                max_age: None,
            })
            .unwrap();

        assert_eq!(report.removed, vec![middle.id.clone()]);
        assert!(newest.path.exists());
        assert!(oldest.path.exists());
        assert!(!middle.path.exists());

        sb.manager.unpin(&oldest).unwrap();
        let report = sb
            .manager
            .prune(&RetentionPolicy {
                max_count: 1,
                max_age: None,
            })
            .unwrap();
        assert_eq!(report.removed, vec![oldest.id]);
    }

    #[test]
    fn test_prune_by_age_never_removes_newest() {
        let sb = sandbox();
        let only = sb.manager.create("1.0.0").unwrap();

        let report = sb
            .manager
            .prune(&RetentionPolicy {
                max_count: 10,
                max_age: Some(ChronoDuration::zero()),
            })
            .unwrap();
        assert!(report.removed.is_empty());
        assert!(only.path.exists());
    }

    #[test]
    fn test_partial_is_invisible() {
        let sb = sandbox();
        fs::create_dir_all(sb.manager.root().join(".backup_v1.0.0_x.partial")).unwrap();
        assert!(sb.manager.list().unwrap().is_empty());
        assert!(sb.manager.open(".backup_v1.0.0_x.partial").is_err());
    }

    #[test]
    fn test_restore_detects_missing_snapshot() {
        let sb = sandbox();
        let handle = sb.manager.create("1.0.0").unwrap();
        fs::remove_dir_all(handle.path.join(INSTALL_SUBDIR)).unwrap();
        assert!(matches!(
            sb.manager.restore(&handle),
            Err(BackupError::Corrupted { .. })
        ));
        // Live tree untouched
        assert_eq!(fs::read_to_string(sb.install.join("VERSION")).unwrap(), "1.0.0");
    }

    #[test]
    fn test_missing_data_file_still_backs_up_tree() {
        let sb = sandbox();
        fs::remove_file(&sb.data).unwrap();
        let handle = sb.manager.create("1.0.0").unwrap();
        let info = BackupManager::read_info(&handle.path).unwrap();
        assert!(info.includes_install);
        assert!(info.data_file_name.is_none());
    }

    #[test]
    fn test_retention_policy_from_config() {
        let policy = RetentionPolicy::from(&RetentionConfig {
            max_count: 3,
            max_age_days: 0,
        });
        assert_eq!(policy.max_count, 3);
        assert!(policy.max_age.is_none());
    }
}
