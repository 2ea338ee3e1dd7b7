//! Status Command - what is installed and what the updater is doing
//!
//! Sections:
//! - VERSION: installed version and channel
//! - UPDATER: daemon reachability, phase, schedule
//! - LAST ATTEMPT: the most recent cycle
//! - INCIDENT: only shown after a failed rollback
//!
//! Without a running daemon the report is rebuilt from the state directory.

use anyhow::Result;
use chrono::{DateTime, Utc};
use hoist_common::api::{StatusReport, StatusSource};
use hoist_common::state::{format_age, format_duration};
use hoist_common::UpdateConfig;
use owo_colors::OwoColorize;
use std::path::Path;
use tracing::debug;

use crate::client::DaemonClient;
use crate::output;

pub async fn run(config_path: &Path, json: bool) -> Result<i32> {
    let report = load(config_path).await;
    if json {
        output::print_json(&report);
    } else {
        print_report(&report, Utc::now());
    }
    Ok(0)
}

/// Ask the daemon; fall back to disk when it cannot be reached.
pub async fn load(config_path: &Path) -> StatusReport {
    let config = UpdateConfig::load(config_path);
    match DaemonClient::from_config(&config).status().await {
        Ok(report) => report,
        Err(e) => {
            debug!("Daemon status unavailable ({}); reading state from disk", e);
            StatusReport::from_disk(&config)
        }
    }
}

fn relative(at: Option<DateTime<Utc>>, now: DateTime<Utc>, none: &str) -> String {
    match at {
        Some(at) if at > now => format!("in {}", format_duration((at - now).num_seconds() as u64)),
        Some(at) => format_age((now - at).num_seconds().max(0) as u64),
        None => none.to_string(),
    }
}

pub fn print_report(report: &StatusReport, now: DateTime<Utc>) {
    output::header("hoist Status");

    output::section("VERSION");
    output::row(
        "installed",
        report.installed_version.as_deref().unwrap_or("unknown"),
    );
    output::row("channel", &report.channel);
    if let Some(latest) = &report.latest_available {
        output::row("latest", latest);
    }

    output::section("UPDATER");
    let daemon = match report.source {
        StatusSource::Daemon => "running".bright_green().to_string(),
        StatusSource::Disk => "not reachable (state from disk)".yellow().to_string(),
    };
    output::row("daemon", daemon);
    output::row(
        "phase",
        if report.in_progress {
            report.phase.as_str().bright_cyan().to_string()
        } else {
            report.phase.as_str().to_string()
        },
    );
    output::row(
        "auto update",
        if report.auto_update { "on" } else { "off (notify only)" },
    );
    output::row("interval", format_duration(report.check_interval_secs));
    output::row("last check", relative(report.last_check, now, "never"));
    output::row("next check", relative(report.next_check, now, "not scheduled"));
    if report.restart_pending {
        output::note("New version installed; restart the service to run it");
    }

    if let Some(attempt) = &report.last_attempt {
        output::section("LAST ATTEMPT");
        println!("  {}", output::attempt_line(attempt));
    }

    if let Some(incident) = &report.incident {
        output::section("INCIDENT");
        println!("  {}", incident.bright_red());
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_relative_times() {
        let now = Utc::now();
        assert_eq!(relative(None, now, "never"), "never");
        assert_eq!(relative(Some(now - Duration::seconds(120)), now, "-"), "2m ago");
        assert_eq!(relative(Some(now + Duration::seconds(7200)), now, "-"), "in 2h");
    }
}
