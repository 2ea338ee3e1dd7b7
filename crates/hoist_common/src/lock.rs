//! Cross-process update lock
//!
//! Keeps the daemon and `hoistctl check --local` from running cycles at the
//! same time:
//! - Lock file with PID, timestamp, host and current step
//! - Dead-holder and corrupted-file recovery
//! - Released on drop

use crate::error::LockError;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// A live holder older than this is assumed to be a recycled PID (6 hours).
const MAX_LOCK_AGE_SECS: u64 = 6 * 3600;

/// Lock file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    /// Unix epoch seconds
    pub acquired_at: u64,
    pub hostname: String,
    pub step: String,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl LockInfo {
    fn new(step: &str) -> Self {
        let hostname = fs::read_to_string("/etc/hostname")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            pid: process::id(),
            acquired_at: now_secs(),
            hostname,
            step: step.to_string(),
        }
    }

    pub fn age_secs(&self) -> u64 {
        now_secs().saturating_sub(self.acquired_at)
    }

    fn is_stale(&self) -> bool {
        self.age_secs() > MAX_LOCK_AGE_SECS
    }

    fn process_exists(&self) -> bool {
        Path::new(&format!("/proc/{}", self.pid)).exists()
    }

    /// Held by a live process and not yet stale.
    pub fn is_active(&self) -> bool {
        self.process_exists() && !self.is_stale()
    }
}

/// Update lock handle - releases the lock on drop
#[derive(Debug)]
pub struct UpdateLock {
    lock_path: PathBuf,
}

impl UpdateLock {
    /// Try to take the lock at `lock_path`.
    pub fn acquire(lock_path: &Path, step: &str) -> Result<Self, LockError> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if lock_path.exists() {
            Self::clear_if_abandoned(lock_path)?;
        }

        let info = LockInfo::new(step);
        let content = serde_json::to_string_pretty(&info).map_err(io::Error::from)?;

        // create_new makes the check-and-create a single step
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let holder = Self::read_holder(lock_path).unwrap_or(LockInfo {
                    pid: 0,
                    acquired_at: now_secs(),
                    hostname: "unknown".to_string(),
                    step: "unknown".to_string(),
                });
                return Err(LockError::AlreadyLocked {
                    pid: holder.pid,
                    age_secs: holder.age_secs(),
                    step: holder.step,
                });
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content.as_bytes())?;
        file.sync_all()?;

        debug!("Update lock acquired: pid={} step={}", info.pid, step);
        Ok(Self {
            lock_path: lock_path.to_path_buf(),
        })
    }

    fn read_holder(lock_path: &Path) -> Option<LockInfo> {
        fs::read_to_string(lock_path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
    }

    /// Remove a lock left by a dead, stale or unreadable holder.
    fn clear_if_abandoned(lock_path: &Path) -> Result<(), LockError> {
        let content = fs::read_to_string(lock_path)?;
        match serde_json::from_str::<LockInfo>(&content) {
            Ok(holder) if holder.pid == process::id() => Err(LockError::AlreadyLocked {
                pid: holder.pid,
                age_secs: holder.age_secs(),
                step: holder.step,
            }),
            Ok(holder) if !holder.process_exists() => {
                warn!("Recovering update lock from dead process {}", holder.pid);
                remove_ignoring_missing(lock_path)
            }
            Ok(holder) if holder.is_stale() => {
                warn!(
                    "Recovering stale update lock: pid={} age={}s",
                    holder.pid,
                    holder.age_secs()
                );
                remove_ignoring_missing(lock_path)
            }
            Ok(holder) => Err(LockError::AlreadyLocked {
                pid: holder.pid,
                age_secs: holder.age_secs(),
                step: holder.step,
            }),
            Err(e) => {
                warn!("Recovering corrupted update lock: {}", e);
                remove_ignoring_missing(lock_path)
            }
        }
    }

    /// Record the current step in the lock file (for operators reading it).
    pub fn update_step(&self, step: &str) -> io::Result<()> {
        if let Some(mut info) = Self::read_holder(&self.lock_path) {
            info.step = step.to_string();
            let content = serde_json::to_string_pretty(&info)?;
            fs::write(&self.lock_path, content)?;
        }
        Ok(())
    }

    /// Check we still hold the lock
    pub fn is_valid(&self) -> bool {
        Self::read_holder(&self.lock_path)
            .map(|info| info.pid == process::id())
            .unwrap_or(false)
    }

    /// Current holder of the lock at `lock_path`, if any and alive.
    pub fn holder(lock_path: &Path) -> Option<LockInfo> {
        Self::read_holder(lock_path).filter(|info| info.process_exists())
    }
}

fn remove_ignoring_missing(path: &Path) -> Result<(), LockError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        if self.is_valid() {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                warn!("Failed to release update lock: {}", e);
            } else {
                debug!("Update lock released");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_info_creation() {
        let info = LockInfo::new("checking");
        assert_eq!(info.pid, process::id());
        assert_eq!(info.step, "checking");
        assert!(!info.is_stale());
    }

    #[test]
    fn test_lock_info_stale_detection() {
        let mut info = LockInfo::new("test");
        info.acquired_at = now_secs() - (MAX_LOCK_AGE_SECS + 100);
        assert!(info.is_stale());
    }

    #[test]
    fn test_lock_info_process_check() {
        let info = LockInfo::new("test");
        assert!(info.process_exists());

        let mut fake = info.clone();
        fake.pid = 999_999_999;
        assert!(!fake.process_exists());
    }

    #[test]
    fn test_lock_info_active() {
        let mut info = LockInfo::new("test");
        assert!(info.is_active());
        info.acquired_at = now_secs() - (MAX_LOCK_AGE_SECS + 100);
        assert!(!info.is_active());
    }

    #[test]
    fn test_acquire_and_release() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("update.lock");

        let lock = UpdateLock::acquire(&path, "checking").unwrap();
        assert!(path.exists());
        assert!(lock.is_valid());
        lock.update_step("downloading").unwrap();
        assert_eq!(UpdateLock::holder(&path).unwrap().step, "downloading");

        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_in_same_process_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("update.lock");

        let _lock = UpdateLock::acquire(&path, "checking").unwrap();
        let err = UpdateLock::acquire(&path, "checking").unwrap_err();
        assert!(matches!(err, LockError::AlreadyLocked { .. }));
    }

    #[test]
    fn test_dead_holder_recovered() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("update.lock");

        let mut dead = LockInfo::new("applying");
        dead.pid = 999_999_999;
        fs::write(&path, serde_json::to_string(&dead).unwrap()).unwrap();

        let lock = UpdateLock::acquire(&path, "checking").unwrap();
        assert!(lock.is_valid());
    }

    #[test]
    fn test_corrupted_lock_recovered() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("update.lock");
        fs::write(&path, "{not json").unwrap();

        assert!(UpdateLock::acquire(&path, "checking").is_ok());
    }
}
