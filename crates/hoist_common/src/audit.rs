//! Update attempt audit trail
//!
//! Every cycle (success, no-op, failure) leaves one `UpdateAttempt`, appended
//! as a JSON line to `<state_dir>/attempts.jsonl`. The file is append-only;
//! entries are never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// Update cycle phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Checking,
    Downloading,
    Verifying,
    BackingUp,
    Applying,
    Restarting,
    HealthChecking,
    RollingBack,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Checking => "checking",
            Phase::Downloading => "downloading",
            Phase::Verifying => "verifying",
            Phase::BackingUp => "backing_up",
            Phase::Applying => "applying",
            Phase::Restarting => "restarting",
            Phase::HealthChecking => "health_checking",
            Phase::RollingBack => "rolling_back",
            Phase::Done => "done",
        }
    }

    /// Phases from which shutdown may still cancel the cycle.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            Phase::Idle | Phase::Checking | Phase::Downloading | Phase::Verifying
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    UpToDate,
    Deferred,
    Cancelled,
    Failed,
    RolledBack,
    RollbackFailed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::UpToDate => "up_to_date",
            Outcome::Deferred => "deferred",
            Outcome::Cancelled => "cancelled",
            Outcome::Failed => "failed",
            Outcome::RolledBack => "rolled_back",
            Outcome::RollbackFailed => "rollback_failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Outcome::Failed | Outcome::RolledBack | Outcome::RollbackFailed
        )
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    Manual,
}

/// One update cycle, start to terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateAttempt {
    pub id: String,
    pub trigger: Trigger,
    pub from_version: String,
    #[serde(default)]
    pub to_version: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Last phase entered
    pub phase: Phase,
    /// Phase that failed, when the cycle went on to roll back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<Phase>,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub backup_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl UpdateAttempt {
    pub fn begin(trigger: Trigger, from_version: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            trigger,
            from_version: from_version.to_string(),
            to_version: None,
            started_at: Utc::now(),
            finished_at: None,
            phase: Phase::Idle,
            failed_phase: None,
            outcome: None,
            error: None,
            error_kind: None,
            backup_id: None,
            notes: Vec::new(),
        }
    }

    pub fn enter(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn finish(&mut self, outcome: Outcome, error: Option<&crate::error::UpdateError>) {
        self.outcome = Some(outcome);
        self.error = error.map(|e| e.to_string());
        self.error_kind = error.map(|e| e.kind().to_string());
        self.finished_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Phase to blame on failure.
    pub fn responsible_phase(&self) -> Phase {
        self.failed_phase.unwrap_or(self.phase)
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// Append-only JSONL log of attempts.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    path: PathBuf,
}

impl AuditTrail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one attempt as a single line.
    pub fn append(&self, attempt: &UpdateAttempt) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_string(attempt)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()
    }

    /// All attempts, oldest first. Unparseable lines are skipped.
    pub fn read_all(&self) -> io::Result<Vec<UpdateAttempt>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut attempts = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<UpdateAttempt>(&line) {
                Ok(attempt) => attempts.push(attempt),
                Err(e) => warn!(
                    "Skipping unreadable audit line {} in {}: {}",
                    idx + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(attempts)
    }

    /// The most recent `limit` attempts, newest first.
    pub fn recent(&self, limit: usize) -> io::Result<Vec<UpdateAttempt>> {
        let mut attempts = self.read_all()?;
        attempts.reverse();
        attempts.truncate(limit);
        Ok(attempts)
    }
}
