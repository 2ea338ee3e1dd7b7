//! Admin API payloads shared by `hoistd` and `hoistctl`

use crate::audit::{Outcome, Phase, UpdateAttempt};
use crate::config::UpdateConfig;
use crate::paths::read_installed_version;
use crate::release::Release;
use crate::state::UpdateStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;

/// `hoistctl check` exit codes.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const FAILED: i32 = 1;
    pub const ROLLBACK_FAILED: i32 = 2;
    pub const ALREADY_CHECKING: i32 = 3;
    pub const DAEMON_UNREACHABLE: i32 = 4;
}

/// Map a cycle outcome to the CLI exit code.
pub fn exit_code_for(outcome: Outcome) -> i32 {
    match outcome {
        Outcome::Success | Outcome::UpToDate | Outcome::Deferred => exit_code::OK,
        Outcome::RollbackFailed => exit_code::ROLLBACK_FAILED,
        Outcome::Failed | Outcome::RolledBack | Outcome::Cancelled => exit_code::FAILED,
    }
}

/// `GET /v1/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub phase: Phase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    Daemon,
    Disk,
}

/// `GET /v1/update/status`, also built from disk by the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub source: StatusSource,
    pub installed_version: Option<String>,
    pub channel: String,
    pub phase: Phase,
    pub in_progress: bool,
    pub auto_update: bool,
    pub auto_restart: bool,
    pub check_interval_secs: u64,
    pub last_check: Option<DateTime<Utc>>,
    pub next_check: Option<DateTime<Utc>>,
    pub latest_available: Option<String>,
    pub restart_pending: bool,
    pub last_attempt: Option<UpdateAttempt>,
    /// Set after a failed rollback until the operator clears it
    pub incident: Option<String>,
}

impl StatusReport {
    /// Everything knowable without a running daemon.
    pub fn from_disk(config: &UpdateConfig) -> Self {
        let paths = config.state_paths();
        let status = UpdateStatus::load(&paths.state_file);
        let incident = fs::read_to_string(&paths.incident_file)
            .ok()
            .map(|_| format!("rollback failed; see {}", paths.incident_file.display()));

        Self {
            source: StatusSource::Disk,
            installed_version: read_installed_version(&config.install_dir)
                .or(status.installed_version),
            channel: config.channel.clone(),
            phase: Phase::Idle,
            in_progress: false,
            auto_update: config.auto_update,
            auto_restart: config.auto_restart,
            check_interval_secs: config.check_interval,
            last_check: status.last_check,
            next_check: status.next_check,
            latest_available: status.latest_available,
            restart_pending: status.restart_pending,
            last_attempt: status.last_attempt,
            incident,
        }
    }
}

/// `POST /v1/update/check`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CheckResponse {
    Completed { attempt: UpdateAttempt },
    AlreadyChecking,
    Error { message: String },
}

/// `hoistctl check --dry-run`: what a cycle would find, with nothing applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestReport {
    pub installed_version: String,
    pub channel: String,
    pub latest: Option<Release>,
    pub update_available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(Outcome::Success), 0);
        assert_eq!(exit_code_for(Outcome::UpToDate), 0);
        assert_eq!(exit_code_for(Outcome::RolledBack), 1);
        assert_eq!(exit_code_for(Outcome::Failed), 1);
        assert_eq!(exit_code_for(Outcome::RollbackFailed), 2);
    }

    #[test]
    fn test_check_response_tagging() {
        let json = serde_json::to_string(&CheckResponse::AlreadyChecking).unwrap();
        assert_eq!(json, r#"{"result":"already_checking"}"#);
    }

    #[test]
    fn test_status_from_disk() {
        let temp = TempDir::new().unwrap();
        let config = UpdateConfig {
            install_dir: temp.path().join("app"),
            state_dir: temp.path().join("state"),
            ..UpdateConfig::default()
        };
        fs::create_dir_all(&config.install_dir).unwrap();
        fs::write(config.install_dir.join("VERSION"), "1.0.0").unwrap();

        let report = StatusReport::from_disk(&config);
        assert_eq!(report.source, StatusSource::Disk);
        assert_eq!(report.installed_version.as_deref(), Some("1.0.0"));
        assert!(report.incident.is_none());
        assert!(report.last_attempt.is_none());

        fs::create_dir_all(&config.state_dir).unwrap();
        fs::write(config.state_paths().incident_file, "{}").unwrap();
        assert!(StatusReport::from_disk(&config).incident.is_some());
    }
}
