//! Output formatting - ASCII-only terminal output
//!
//! Sections are `[NAME]` headers followed by indented `key: value` rows.

use hoist_common::{Outcome, UpdateAttempt};
use owo_colors::OwoColorize;
use serde::Serialize;

pub const SEPARATOR: &str = "------------------------------------------------------------";

pub fn header(title: &str) {
    println!();
    println!("  {}", title.bold());
    println!("{}", SEPARATOR);
}

pub fn section(name: &str) {
    println!();
    println!("[{}]", name.cyan());
}

pub fn row(key: &str, value: impl std::fmt::Display) {
    println!("  {:<14} {}", format!("{}:", key), value);
}

pub fn note(message: &str) {
    println!("[NOTE] {}", message.yellow());
}

pub fn display_error(message: &str) {
    eprintln!();
    eprintln!("[ERROR] {}", message.red());
    eprintln!();
}

/// Pretty JSON to stdout; serialization failures fall back to the debug form.
pub fn print_json<T: Serialize + std::fmt::Debug>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{:?}", value),
    }
}

pub fn outcome_label(outcome: Option<Outcome>) -> String {
    match outcome {
        Some(o @ (Outcome::Success | Outcome::UpToDate | Outcome::Deferred)) => {
            format!("[{}]", o.as_str().to_uppercase()).bright_green().to_string()
        }
        Some(o @ Outcome::RollbackFailed) => {
            format!("[{}]", o.as_str().to_uppercase()).bright_red().to_string()
        }
        Some(o) => format!("[{}]", o.as_str().to_uppercase()).yellow().to_string(),
        None => "[RUNNING]".dimmed().to_string(),
    }
}

/// One-line summary used by `history` and `check`.
pub fn attempt_line(attempt: &UpdateAttempt) -> String {
    let target = match &attempt.to_version {
        Some(to) => format!("{} -> {}", attempt.from_version, to),
        None => attempt.from_version.clone(),
    };
    let mut line = format!(
        "{}  {:<17} {:<9} {}",
        attempt.started_at.format("%Y-%m-%d %H:%M:%S"),
        outcome_label(attempt.outcome),
        format!("{:?}", attempt.trigger).to_lowercase(),
        target
    );
    if let Some(error) = &attempt.error {
        line.push_str(&format!("  ({})", error));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_common::Trigger;

    #[test]
    fn test_attempt_line_shows_versions_and_error() {
        let mut attempt = UpdateAttempt::begin(Trigger::Manual, "1.0.0");
        attempt.to_version = Some("1.1.0".into());
        attempt.error = Some("Network failure: timed out".into());
        let line = attempt_line(&attempt);
        assert!(line.contains("1.0.0 -> 1.1.0"));
        assert!(line.contains("manual"));
        assert!(line.contains("timed out"));
    }
}
