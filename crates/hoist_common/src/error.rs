//! Error types for hoist.

use std::time::Duration;
use thiserror::Error;

/// Why an update cycle stopped short of `success`.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("An update cycle is already running")]
    AlreadyChecking,

    #[error("Update cycle cancelled before backup")]
    Cancelled,

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Integrity failure: {0}")]
    IntegrityFailure(String),

    #[error("Backup failed: {0}")]
    BackupFailure(#[source] BackupError),

    #[error("Apply failed: {0}")]
    ApplyFailure(String),

    #[error("Restart failed: {0}")]
    RestartFailure(#[source] SupervisorError),

    #[error("Service did not report healthy version {expected} after {attempts} attempts")]
    HealthCheckTimeout { expected: String, attempts: u32 },

    #[error("Rollback failed: {0}")]
    RollbackFailure(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpdateError {
    /// Stable machine-readable name, used in the audit trail and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            UpdateError::AlreadyChecking => "already_checking",
            UpdateError::Cancelled => "cancelled",
            UpdateError::NetworkFailure(_) => "network_failure",
            UpdateError::IntegrityFailure(_) => "integrity_failure",
            UpdateError::BackupFailure(_) => "backup_failure",
            UpdateError::ApplyFailure(_) => "apply_failure",
            UpdateError::RestartFailure(_) => "restart_failure",
            UpdateError::HealthCheckTimeout { .. } => "health_check_timeout",
            UpdateError::RollbackFailure(_) => "rollback_failure",
            UpdateError::Config(_) => "config",
            UpdateError::Lock(_) => "lock",
            UpdateError::Io(_) => "io",
        }
    }

    /// Failures after the live tree was touched that must be undone.
    pub fn needs_rollback(&self) -> bool {
        matches!(
            self,
            UpdateError::RestartFailure(_) | UpdateError::HealthCheckTimeout { .. }
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("No restart strategy is available for the managed service")]
    NoStrategyAvailable,

    #[error("{strategy}: stop failed: {reason}")]
    StopFailed { strategy: String, reason: String },

    #[error("{strategy}: start failed: {reason}")]
    StartFailed { strategy: String, reason: String },

    #[error("Service was not live within {0:?}")]
    LivenessTimeout(Duration),
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Backup not found: {0}")]
    NotFound(String),

    #[error("Backup {id} is unusable: {reason}")]
    Corrupted { id: String, reason: String },

    #[error("Backup IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backup metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Update lock held by PID {pid} for {age_secs}s (step: {step})")]
    AlreadyLocked {
        pid: u32,
        age_secs: u64,
        step: String,
    },

    #[error("Lock IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
