//! Client configuration
//!
//! Loaded from `/etc/hoist/hoist.toml` (or `--config` / `HOIST_CONFIG`). Every
//! field has a default so a partial file, or no file at all, still yields a
//! working config. The daemon re-reads the file at every scheduler tick and at
//! the start of every cycle.

use crate::atomic::atomic_write;
use crate::error::ConfigError;
use crate::paths::{StatePaths, DEFAULT_STATE_DIR};
use crate::release::{DEFAULT_CHANNEL, DEFAULT_CHANNELS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Keys accepted by `hoistctl config set`.
pub const SETTABLE_KEYS: &[&str] = &[
    "update_server",
    "channel",
    "channels",
    "auto_update",
    "auto_restart",
    "check_interval",
    "backup_before_update",
    "install_dir",
    "data_file",
    "state_dir",
    "admin_listen",
    "retention.max_count",
    "retention.max_age_days",
    "health.url",
    "health.attempts",
    "health.initial_delay_ms",
    "health.max_delay_ms",
    "health.request_timeout_secs",
    "supervisor.systemd_unit",
    "supervisor.supervisor_program",
    "supervisor.process_signature",
    "supervisor.start_command",
    "supervisor.working_dir",
    "supervisor.log_file",
    "supervisor.use_sudo",
    "supervisor.stop_timeout_secs",
    "supervisor.liveness_timeout_secs",
    "supervisor.command_timeout_secs",
    "supervisor.readiness_url",
    "network.manifest_timeout_secs",
    "network.download_timeout_secs",
];

/// Shortest check interval accepted without a warning.
const MIN_CHECK_INTERVAL_SECS: u64 = 60;

/// Backup retention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Keep at most this many backups (the newest is always kept)
    #[serde(default = "default_max_count")]
    pub max_count: usize,

    /// Remove backups older than this many days (0 disables age pruning)
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

fn default_max_count() -> usize {
    5
}

fn default_max_age_days() -> u32 {
    30
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_count: default_max_count(),
            max_age_days: default_max_age_days(),
        }
    }
}

/// Post-restart health checking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Liveness surface of the managed service, answering `{version, status}`
    #[serde(default = "default_health_url")]
    pub url: String,

    #[serde(default = "default_health_attempts")]
    pub attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_health_url() -> String {
    "http://127.0.0.1:5000/health".to_string()
}

fn default_health_attempts() -> u32 {
    10
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_request_timeout() -> u64 {
    5
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            url: default_health_url(),
            attempts: default_health_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// How to stop and start the managed service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// systemd unit name (tried first)
    #[serde(default)]
    pub systemd_unit: Option<String>,

    /// supervisord program name (tried second)
    #[serde(default)]
    pub supervisor_program: Option<String>,

    /// Substring of the service command line, for the manual fallback
    #[serde(default)]
    pub process_signature: Option<String>,

    /// argv used by the manual fallback to start the service
    #[serde(default)]
    pub start_command: Vec<String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// stdout/stderr of a manually started service are appended here
    #[serde(default = "default_service_log")]
    pub log_file: PathBuf,

    #[serde(default)]
    pub use_sudo: bool,

    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_secs: u64,

    /// Timeout for each systemctl/supervisorctl invocation
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Must answer 2xx before a restart counts as live
    #[serde(default)]
    pub readiness_url: Option<String>,
}

fn default_service_log() -> PathBuf {
    PathBuf::from("/var/log/hoist/service.log")
}

fn default_stop_timeout() -> u64 {
    15
}

fn default_liveness_timeout() -> u64 {
    30
}

fn default_command_timeout() -> u64 {
    30
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            systemd_unit: None,
            supervisor_program: None,
            process_signature: None,
            start_command: Vec::new(),
            working_dir: None,
            log_file: default_service_log(),
            use_sudo: false,
            stop_timeout_secs: default_stop_timeout(),
            liveness_timeout_secs: default_liveness_timeout(),
            command_timeout_secs: default_command_timeout(),
            readiness_url: None,
        }
    }
}

impl SupervisorConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Network timeouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_manifest_timeout")]
    pub manifest_timeout_secs: u64,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

fn default_manifest_timeout() -> u64 {
    10
}

fn default_download_timeout() -> u64 {
    300
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            manifest_timeout_secs: default_manifest_timeout(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

impl NetworkConfig {
    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_secs(self.manifest_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Update client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Base URL of the registry (manifest service + artifact store)
    #[serde(default = "default_update_server")]
    pub update_server: String,

    #[serde(default = "default_channel")]
    pub channel: String,

    /// Closed set of channels this client accepts
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,

    /// Apply updates found by scheduled checks without asking
    #[serde(default)]
    pub auto_update: bool,

    /// Restart the service after applying; otherwise leave a restart pending
    #[serde(default = "default_true")]
    pub auto_restart: bool,

    /// Seconds between scheduled checks
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Always honoured as true; `false` only produces a warning
    #[serde(default = "default_true")]
    pub backup_before_update: bool,

    /// Live installation tree (must contain a VERSION marker)
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,

    /// Data file backed up before every update
    #[serde(default)]
    pub data_file: Option<PathBuf>,

    /// Lock, audit trail, state, staging area and backups
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Admin API listen address (localhost only)
    #[serde(default = "default_admin_listen")]
    pub admin_listen: String,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub network: NetworkConfig,
}

fn default_update_server() -> String {
    "http://localhost:8080".to_string()
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

fn default_channels() -> Vec<String> {
    DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_check_interval() -> u64 {
    3600
}

fn default_install_dir() -> PathBuf {
    PathBuf::from("/opt/hoist/app")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

fn default_admin_listen() -> String {
    "127.0.0.1:7870".to_string()
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            update_server: default_update_server(),
            channel: default_channel(),
            channels: default_channels(),
            auto_update: false,
            auto_restart: true,
            check_interval: default_check_interval(),
            backup_before_update: true,
            install_dir: default_install_dir(),
            data_file: None,
            state_dir: default_state_dir(),
            admin_listen: default_admin_listen(),
            retention: RetentionConfig::default(),
            health: HealthConfig::default(),
            supervisor: SupervisorConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl UpdateConfig {
    /// Load config from `path`, or return defaults.
    pub fn load(path: &Path) -> Self {
        match Self::load_from_path(path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("Config {} unusable, using defaults: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Write the config atomically.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        atomic_write(path, content.as_bytes())?;
        Ok(())
    }

    /// Write defaults when no config exists yet. Returns true if written.
    pub fn save_default_if_missing(path: &Path) -> Result<bool, ConfigError> {
        if path.exists() {
            return Ok(false);
        }
        Self::default().save(path)?;
        info!("Saved default config to {}", path.display());
        Ok(true)
    }

    pub fn state_paths(&self) -> StatePaths {
        StatePaths::new(&self.state_dir)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval.max(1))
    }

    /// Human-readable warnings for settings that are accepted but risky.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.backup_before_update {
            warnings.push(
                "backup_before_update = false is ignored: a backup is always taken before applying"
                    .to_string(),
            );
        }
        if !self.channels.iter().any(|c| c == &self.channel) {
            warnings.push(format!(
                "channel '{}' is not one of the configured channels ({})",
                self.channel,
                self.channels.join(", ")
            ));
        }
        if self.check_interval < MIN_CHECK_INTERVAL_SECS {
            warnings.push(format!(
                "check_interval of {}s is below {}s",
                self.check_interval, MIN_CHECK_INTERVAL_SECS
            ));
        }
        if self.update_server.trim().is_empty() {
            warnings.push("update_server is empty; checks will fail".to_string());
        }
        match &self.data_file {
            None => warnings.push(
                "no data_file configured; only the installation tree is backed up".to_string(),
            ),
            Some(data_file) if data_file.starts_with(&self.install_dir) => warnings.push(format!(
                "data_file {} lives inside install_dir; it is carried across updates",
                data_file.display()
            )),
            Some(_) => {}
        }
        if self.state_dir.starts_with(&self.install_dir) {
            warnings.push("state_dir must not live inside install_dir".to_string());
        }
        if self.supervisor.systemd_unit.is_none()
            && self.supervisor.supervisor_program.is_none()
            && (self.supervisor.process_signature.is_none()
                || self.supervisor.start_command.is_empty())
        {
            warnings.push(
                "no restart strategy configured; auto_restart will fail and roll back".to_string(),
            );
        }
        if self.retention.max_count == 0 {
            warnings.push("retention.max_count = 0 still keeps the newest backup".to_string());
        }

        warnings
    }

    /// Set one dotted key from its string form (`hoistctl config set`).
    ///
    /// The value is read as a TOML literal when it parses as one (`true`, `30`,
    /// `["a", "b"]`) and as a plain string otherwise.
    pub fn set_value(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        if !SETTABLE_KEYS.contains(&key) {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        };

        let mut doc = toml::Value::try_from(&*self)?;
        let value = parse_literal(raw);

        let (section, field) = match key.split_once('.') {
            Some((section, field)) => (Some(section), field),
            None => (None, key),
        };
        let root = doc.as_table_mut().ok_or_else(invalid)?;
        let table = match section {
            Some(section) => root
                .entry(section.to_string())
                .or_insert(toml::Value::Table(toml::map::Map::new()))
                .as_table_mut()
                .ok_or_else(invalid)?,
            None => root,
        };
        table.insert(field.to_string(), value);

        let updated: UpdateConfig = doc.try_into().map_err(|_| invalid())?;
        *self = updated;
        Ok(())
    }
}

fn parse_literal(raw: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("v = {}", raw))
        .ok()
        .and_then(|mut table| table.remove("v"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = UpdateConfig::default();
        assert!(!config.auto_update);
        assert!(config.auto_restart);
        assert!(config.backup_before_update);
        assert_eq!(config.check_interval, 3600);
        assert_eq!(config.channel, "stable");
        assert_eq!(config.retention.max_count, 5);
        assert_eq!(config.retention.max_age_days, 30);
        assert_eq!(config.admin_listen, "127.0.0.1:7870");
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
update_server = "http://updates.local:8080"
channel = "testing"
auto_update = true

[retention]
max_count = 2

[supervisor]
systemd_unit = "inventory.service"
"#;
        let config: UpdateConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.update_server, "http://updates.local:8080");
        assert_eq!(config.channel, "testing");
        assert!(config.auto_update);
        assert_eq!(config.retention.max_count, 2);
        assert_eq!(config.retention.max_age_days, 30);
        assert_eq!(
            config.supervisor.systemd_unit.as_deref(),
            Some("inventory.service")
        );
        assert_eq!(config.network.download_timeout_secs, 300);
    }

    #[test]
    fn test_load_missing_returns_defaults() {
        let temp = TempDir::new().unwrap();
        let config = UpdateConfig::load(&temp.path().join("absent.toml"));
        assert_eq!(config, UpdateConfig::default());
    }

    #[test]
    fn test_load_garbage_returns_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hoist.toml");
        fs::write(&path, "channel = [unterminated").unwrap();
        assert_eq!(UpdateConfig::load(&path), UpdateConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("etc/hoist.toml");

        assert!(UpdateConfig::save_default_if_missing(&path).unwrap());
        assert!(!UpdateConfig::save_default_if_missing(&path).unwrap());

        let mut config = UpdateConfig::load_from_path(&path).unwrap();
        config.channel = "testing".to_string();
        config.save(&path).unwrap();
        assert_eq!(UpdateConfig::load_from_path(&path).unwrap().channel, "testing");
    }

    #[test]
    fn test_set_value_typed() {
        let mut config = UpdateConfig::default();
        config.set_value("auto_update", "true").unwrap();
        config.set_value("check_interval", "600").unwrap();
        config.set_value("retention.max_count", "3").unwrap();
        config.set_value("update_server", "http://10.0.0.5:8080").unwrap();
        config.set_value("health.url", "http://127.0.0.1:9000/health").unwrap();
        config
            .set_value("supervisor.start_command", r#"["python3", "app.py"]"#)
            .unwrap();
        config.set_value("data_file", "/srv/app/inventory.db").unwrap();

        assert!(config.auto_update);
        assert_eq!(config.check_interval, 600);
        assert_eq!(config.retention.max_count, 3);
        assert_eq!(config.update_server, "http://10.0.0.5:8080");
        assert_eq!(config.health.url, "http://127.0.0.1:9000/health");
        assert_eq!(config.supervisor.start_command, vec!["python3", "app.py"]);
        assert_eq!(
            config.data_file.as_deref(),
            Some(Path::new("/srv/app/inventory.db"))
        );
    }

    #[test]
    fn test_set_value_rejects_bad_input() {
        let mut config = UpdateConfig::default();
        assert!(matches!(
            config.set_value("no_such_key", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            config.set_value("check_interval", "often"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(config.check_interval, 3600);
    }

    #[test]
    fn test_validate_warnings() {
        assert!(UpdateConfig::default()
            .validate()
            .iter()
            .any(|w| w.contains("no restart strategy")));

        let mut config = UpdateConfig::default();
        config.backup_before_update = false;
        config.channel = "nightly".to_string();
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("backup_before_update")));
        assert!(warnings.iter().any(|w| w.contains("nightly")));
    }
}
