//! Backups Command - list or prune pre-update backups
//!
//! Prune goes through the daemon when it runs. Without one, the on-disk
//! update lock is taken so a concurrent `check --local` cannot race it.

use anyhow::Result;
use hoist_common::api::exit_code;
use hoist_common::backup::{BackupInfo, BackupManager, PruneReport, RetentionPolicy};
use hoist_common::lock::UpdateLock;
use hoist_common::{LockError, UpdateConfig};
use owo_colors::OwoColorize;
use std::path::Path;
use tracing::debug;

use crate::client::{ClientError, DaemonClient};
use crate::output;

pub async fn list(config_path: &Path, json: bool) -> Result<i32> {
    let config = UpdateConfig::load(config_path);
    let backups = match DaemonClient::from_config(&config).backups().await {
        Ok(backups) => backups,
        Err(e) => {
            debug!("Daemon unavailable ({}); listing backups from disk", e);
            BackupManager::from_config(&config).list()?
        }
    };

    if json {
        output::print_json(&backups);
    } else {
        print_backups(&backups);
    }
    Ok(0)
}

fn print_backups(backups: &[BackupInfo]) {
    output::header("Backups");
    if backups.is_empty() {
        println!();
        println!("  No backups.");
        println!();
        return;
    }
    output::section("BACKUPS");
    for backup in backups {
        let pin = if backup.pinned {
            " [PINNED]".yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "  {}  {}  from {:<10} {:>10}{}",
            backup.id,
            backup.created_at.format("%Y-%m-%d %H:%M"),
            backup.from_version,
            format_bytes(backup.size_bytes),
            pin
        );
    }
    println!();
}

pub async fn prune(config_path: &Path) -> Result<i32> {
    let config = UpdateConfig::load(config_path);
    let report = match DaemonClient::from_config(&config).prune().await {
        Ok(report) => report,
        Err(ClientError::Api { status: 409, .. }) => {
            println!("[BUSY] An update cycle is running; prune refused.");
            return Ok(exit_code::ALREADY_CHECKING);
        }
        Err(e) if e.is_unreachable() => match prune_local(&config) {
            Ok(report) => report,
            Err(PruneLocalError::Busy) => {
                println!("[BUSY] An update cycle is running; prune refused.");
                return Ok(exit_code::ALREADY_CHECKING);
            }
            Err(PruneLocalError::Other(e)) => return Err(e),
        },
        Err(e) => return Err(e.into()),
    };

    println!(
        "[OK] Removed {} backup(s), kept {}, cleaned {} partial(s)",
        report.removed.len(),
        report.kept.len(),
        report.partials_removed
    );
    for id in &report.removed {
        println!("  - {}", id.dimmed());
    }
    Ok(0)
}

#[derive(Debug)]
pub enum PruneLocalError {
    Busy,
    Other(anyhow::Error),
}

pub fn prune_local(config: &UpdateConfig) -> Result<PruneReport, PruneLocalError> {
    let paths = config.state_paths();
    let _lock = match UpdateLock::acquire(&paths.lock_file, "prune") {
        Ok(lock) => lock,
        Err(LockError::AlreadyLocked { .. }) => return Err(PruneLocalError::Busy),
        Err(e) => return Err(PruneLocalError::Other(e.into())),
    };
    BackupManager::from_config(config)
        .prune(&RetentionPolicy::from(&config.retention))
        .map_err(|e| PruneLocalError::Other(e.into()))
}

fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;
    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
