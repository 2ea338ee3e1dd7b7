//! Check Command - run one update cycle now
//!
//! By default the daemon runs the cycle (`POST /v1/update/check`). With
//! `--local` the cycle runs in this process; the on-disk update lock keeps it
//! from overlapping with a cycle the daemon is running.
//!
//! `--dry-run` only asks the registry what is available. It runs in-process,
//! needs no daemon, and is refused while any cycle holds the update lock.

use anyhow::Result;
use hoist_common::api::{exit_code, exit_code_for, CheckResponse, LatestReport};
use hoist_common::{Outcome, Trigger, UpdateClient, UpdateConfig, UpdateError};
use owo_colors::OwoColorize;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::DaemonClient;
use crate::output;

pub async fn run(config_path: &Path, local: bool, json: bool) -> Result<i32> {
    let response = if local {
        run_local(config_path).await
    } else {
        let config = UpdateConfig::load(config_path);
        let daemon = DaemonClient::from_config(&config);
        match daemon.check().await {
            Ok(response) => response,
            Err(e) if e.is_unreachable() => {
                let message = format!(
                    "{}. Start hoistd or run `hoistctl check --local`.",
                    e
                );
                if json {
                    output::print_json(&CheckResponse::Error { message });
                } else {
                    output::display_error(&message);
                }
                return Ok(exit_code::DAEMON_UNREACHABLE);
            }
            Err(e) => CheckResponse::Error {
                message: e.to_string(),
            },
        }
    };

    if json {
        output::print_json(&response);
    } else {
        print_response(&response);
    }
    Ok(response_exit_code(&response))
}

pub async fn dry_run(config_path: &Path, json: bool) -> Result<i32> {
    let client = UpdateClient::new(config_path);
    match client.probe_latest().await {
        Ok(report) => {
            if json {
                output::print_json(&report);
            } else {
                print_latest(&report);
            }
            Ok(exit_code::OK)
        }
        Err(UpdateError::AlreadyChecking) => {
            println!("[BUSY] An update cycle is already running. Try again later.");
            Ok(exit_code::ALREADY_CHECKING)
        }
        Err(e) => {
            output::display_error(&e.to_string());
            Ok(exit_code::FAILED)
        }
    }
}

fn print_latest(report: &LatestReport) {
    output::header("Update Check (dry run)");
    output::section("VERSION");
    output::row("installed", &report.installed_version);
    output::row("channel", &report.channel);
    match &report.latest {
        Some(release) => {
            output::row("latest", &release.version);
            output::row("published", release.published_at.format("%Y-%m-%d %H:%M"));
            if !release.notes.is_empty() {
                output::row("notes", release.notes.lines().next().unwrap_or(""));
            }
        }
        None => output::row("latest", "nothing published"),
    }
    println!();
    if report.update_available {
        println!(
            "{}",
            "[UPDATE] A newer version is available. Run `hoistctl check` to apply it.".bright_green()
        );
    } else {
        println!("[OK] Up to date.");
    }
    println!();
}

/// Run the cycle in-process. Ctrl-C cancels it while cancellation is still safe.
async fn run_local(config_path: &Path) -> CheckResponse {
    let client = UpdateClient::new(config_path);
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted; cancelling the update cycle if still safe");
            on_interrupt.cancel();
        }
    });

    let response = into_response(client.run_cycle(Trigger::Manual, &cancel).await);
    cancel.cancel();
    response
}

pub fn into_response(result: Result<hoist_common::CycleReport, UpdateError>) -> CheckResponse {
    match result {
        Ok(report) => CheckResponse::Completed {
            attempt: report.attempt,
        },
        Err(UpdateError::AlreadyChecking) => CheckResponse::AlreadyChecking,
        Err(e) => CheckResponse::Error {
            message: e.to_string(),
        },
    }
}

pub fn response_exit_code(response: &CheckResponse) -> i32 {
    match response {
        CheckResponse::Completed { attempt } => {
            exit_code_for(attempt.outcome.unwrap_or(Outcome::Failed))
        }
        CheckResponse::AlreadyChecking => exit_code::ALREADY_CHECKING,
        CheckResponse::Error { .. } => exit_code::FAILED,
    }
}

fn print_response(response: &CheckResponse) {
    match response {
        CheckResponse::Completed { attempt } => {
            output::header("Update Check");
            output::section("RESULT");
            output::row("outcome", output::outcome_label(attempt.outcome));
            output::row("from", &attempt.from_version);
            if let Some(to) = &attempt.to_version {
                output::row("to", to);
            }
            if let Some(ms) = attempt.duration_ms() {
                output::row("took", format!("{:.1}s", ms as f64 / 1000.0));
            }
            if let Some(backup) = &attempt.backup_id {
                output::row("backup", backup);
            }
            if let Some(error) = &attempt.error {
                output::row("error", error.red());
                if let Some(phase) = attempt.failed_phase {
                    output::row("failed in", phase);
                }
            }
            for note in &attempt.notes {
                output::note(note);
            }
            if attempt.outcome == Some(Outcome::RollbackFailed) {
                println!();
                println!(
                    "{}",
                    "[CRITICAL] Rollback failed. Scheduled updates are suspended until the incident file is removed."
                        .bright_red()
                );
            }
            println!();
        }
        CheckResponse::AlreadyChecking => {
            println!("[BUSY] An update cycle is already running. Try again later.");
        }
        CheckResponse::Error { message } => output::display_error(message),
    }
}
