//! hoistctl commands against a state directory with no daemon running.

use hoist_common::api::{exit_code, CheckResponse, StatusSource};
use hoist_common::audit::AuditTrail;
use hoist_common::backup::BackupManager;
use hoist_common::lock::UpdateLock;
use hoist_common::{Outcome, Trigger, UpdateAttempt, UpdateConfig};
use hoistctl::commands::{backups, check, config, history, status};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Config pointing at a port nothing listens on, for both daemon and registry.
fn write_config(temp: &TempDir) -> (PathBuf, UpdateConfig) {
    let install_dir = temp.path().join("app");
    fs::create_dir_all(&install_dir).unwrap();
    fs::write(install_dir.join("VERSION"), "1.0.0").unwrap();

    let config = UpdateConfig {
        install_dir,
        state_dir: temp.path().join("state"),
        admin_listen: "127.0.0.1:9".into(),
        update_server: "http://127.0.0.1:9".into(),
        ..UpdateConfig::default()
    };
    let path = temp.path().join("hoist.toml");
    config.save(&path).unwrap();
    (path, config)
}

#[tokio::test]
async fn test_status_falls_back_to_disk() {
    let temp = TempDir::new().unwrap();
    let (path, _) = write_config(&temp);

    let report = status::load(&path).await;
    assert_eq!(report.source, StatusSource::Disk);
    assert_eq!(report.installed_version.as_deref(), Some("1.0.0"));
    assert!(!report.in_progress);
    assert!(report.incident.is_none());
}

#[tokio::test]
async fn test_history_reads_audit_trail() {
    let temp = TempDir::new().unwrap();
    let (path, config) = write_config(&temp);

    let trail = AuditTrail::new(config.state_paths().audit_file);
    for to in ["1.0.1", "1.0.2"] {
        let mut attempt = UpdateAttempt::begin(Trigger::Scheduled, "1.0.0");
        attempt.to_version = Some(to.into());
        attempt.finish(Outcome::Success, None);
        trail.append(&attempt).unwrap();
    }

    let attempts = history::load(&path, 10).await.unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].to_version.as_deref(), Some("1.0.2"));

    assert_eq!(history::load(&path, 1).await.unwrap().len(), 1);
}

#[test]
fn test_config_set_persists_and_validates() {
    let temp = TempDir::new().unwrap();
    let (path, _) = write_config(&temp);

    config::set(&path, "channel", "testing").unwrap();
    config::set(&path, "retention.max_count", "2").unwrap();
    let warnings = config::set(&path, "check_interval", "5").unwrap();
    assert!(!warnings.is_empty());

    let saved = UpdateConfig::load_from_path(&path).unwrap();
    assert_eq!(saved.channel, "testing");
    assert_eq!(saved.retention.max_count, 2);
    assert_eq!(saved.check_interval, 5);
}

#[test]
fn test_config_set_rejects_bad_input() {
    let temp = TempDir::new().unwrap();
    let (path, _) = write_config(&temp);
    let before = fs::read_to_string(&path).unwrap();

    assert!(config::set(&path, "no_such_key", "1").is_err());
    assert!(config::set(&path, "check_interval", "soon").is_err());
    assert_eq!(fs::read_to_string(&path).unwrap(), before);
}

#[tokio::test]
async fn test_local_check_reports_network_failure() {
    let temp = TempDir::new().unwrap();
    let (path, config) = write_config(&temp);

    let code = check::run(&path, true, true).await.unwrap();
    assert_eq!(code, exit_code::FAILED);

    let attempts = AuditTrail::new(config.state_paths().audit_file)
        .recent(1)
        .unwrap();
    assert_eq!(attempts[0].trigger, Trigger::Manual);
    assert_eq!(attempts[0].outcome, Some(Outcome::Failed));
    assert_eq!(attempts[0].error_kind.as_deref(), Some("network_failure"));
    assert_eq!(fs::read_to_string(config.install_dir.join("VERSION")).unwrap(), "1.0.0");
}

#[tokio::test]
async fn test_check_without_daemon_is_unreachable() {
    let temp = TempDir::new().unwrap();
    let (path, _) = write_config(&temp);

    let code = check::run(&path, false, true).await.unwrap();
    assert_eq!(code, exit_code::DAEMON_UNREACHABLE);
}

#[tokio::test]
async fn test_dry_run_applies_nothing() {
    let temp = TempDir::new().unwrap();
    let (path, config) = write_config(&temp);

    // Registry unreachable: reported as a failure, nothing recorded
    let code = check::dry_run(&path, true).await.unwrap();
    assert_eq!(code, exit_code::FAILED);
    assert!(!config.state_paths().audit_file.exists());
    assert!(!config.state_paths().state_file.exists());

    let held = UpdateLock::acquire(&config.state_paths().lock_file, "applying").unwrap();
    let code = check::dry_run(&path, true).await.unwrap();
    assert_eq!(code, exit_code::ALREADY_CHECKING);
    drop(held);

    assert_eq!(fs::read_to_string(config.install_dir.join("VERSION")).unwrap(), "1.0.0");
}

#[test]
fn test_local_prune_refused_while_locked() {
    let temp = TempDir::new().unwrap();
    let (_, config) = write_config(&temp);

    let manager = BackupManager::from_config(&config);
    manager.create("1.0.0").unwrap();

    let held = UpdateLock::acquire(&config.state_paths().lock_file, "downloading").unwrap();
    assert!(matches!(
        backups::prune_local(&config),
        Err(backups::PruneLocalError::Busy)
    ));
    drop(held);

    let report = backups::prune_local(&config).unwrap();
    assert_eq!(report.kept.len(), 1);
    assert!(report.removed.is_empty());
}

#[test]
fn test_check_response_exit_codes() {
    let mut attempt = UpdateAttempt::begin(Trigger::Manual, "1.0.0");
    attempt.finish(Outcome::RollbackFailed, None);
    assert_eq!(
        check::response_exit_code(&CheckResponse::Completed { attempt }),
        exit_code::ROLLBACK_FAILED
    );
}
