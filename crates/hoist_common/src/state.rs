//! Persisted update status
//!
//! `<state_dir>/state.json` survives daemon restarts and lets `hoistctl status`
//! answer even when the daemon is down.

use crate::atomic::atomic_write;
use crate::audit::UpdateAttempt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStatus {
    #[serde(default)]
    pub installed_version: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_check: Option<DateTime<Utc>>,
    /// Newest version the manifest reported at the last check
    #[serde(default)]
    pub latest_available: Option<String>,
    /// New bits are installed but the service still runs the old ones
    #[serde(default)]
    pub restart_pending: bool,
    #[serde(default)]
    pub last_attempt: Option<UpdateAttempt>,
}

impl UpdateStatus {
    /// Load from disk; missing or unreadable files yield an empty status.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring unreadable status file {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let content = serde_json::to_vec_pretty(self)?;
        atomic_write(path, &content)
    }

    /// "in 12m", "overdue", or "not scheduled".
    pub fn format_next_check(&self, now: DateTime<Utc>) -> String {
        match self.next_check {
            Some(next) if next > now => {
                format!("in {}", format_duration((next - now).num_seconds().max(0) as u64))
            }
            Some(_) => "due now".to_string(),
            None => "not scheduled".to_string(),
        }
    }

    pub fn format_last_check(&self, now: DateTime<Utc>) -> String {
        match self.last_check {
            Some(last) => format_age((now - last).num_seconds().max(0) as u64),
            None => "never".to_string(),
        }
    }
}

/// Format seconds-ago as "42s ago", "5m ago", "3h ago", "2d ago".
pub fn format_age(secs: u64) -> String {
    format!("{} ago", format_duration(secs))
}

/// Format a duration as "42s", "5m", "3h", "2d".
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m");
        assert_eq!(format_duration(7200), "2h");
        assert_eq!(format_duration(172800), "2d");
        assert_eq!(format_age(59), "59s ago");
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");

        let status = UpdateStatus {
            installed_version: Some("1.0.0".into()),
            restart_pending: true,
            ..UpdateStatus::default()
        };
        status.save(&path).unwrap();
        assert_eq!(UpdateStatus::load(&path), status);
    }

    #[test]
    fn test_load_corrupt_is_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        fs::write(&path, "{{{").unwrap();
        assert_eq!(UpdateStatus::load(&path), UpdateStatus::default());
    }

    #[test]
    fn test_next_check_formatting() {
        let now = Utc::now();
        let mut status = UpdateStatus::default();
        assert_eq!(status.format_next_check(now), "not scheduled");
        assert_eq!(status.format_last_check(now), "never");

        status.next_check = Some(now + Duration::seconds(600));
        assert_eq!(status.format_next_check(now), "in 10m");
        status.next_check = Some(now - Duration::seconds(5));
        assert_eq!(status.format_next_check(now), "due now");
    }
}
