//! History Command - recent update attempts from the audit trail

use anyhow::Result;
use hoist_common::audit::AuditTrail;
use hoist_common::{UpdateAttempt, UpdateConfig};
use std::path::Path;
use tracing::debug;

use crate::client::DaemonClient;
use crate::output;

pub async fn run(config_path: &Path, limit: usize, json: bool) -> Result<i32> {
    let attempts = load(config_path, limit).await?;
    if json {
        output::print_json(&attempts);
        return Ok(0);
    }

    output::header("Update History");
    if attempts.is_empty() {
        println!();
        println!("  No update attempts recorded yet.");
    } else {
        output::section("ATTEMPTS");
        for attempt in &attempts {
            println!("  {}", output::attempt_line(attempt));
        }
    }
    println!();
    Ok(0)
}

/// Newest first. The audit file is append-only, so reading it directly is safe.
pub async fn load(config_path: &Path, limit: usize) -> Result<Vec<UpdateAttempt>> {
    let config = UpdateConfig::load(config_path);
    match DaemonClient::from_config(&config).history(limit).await {
        Ok(attempts) => Ok(attempts),
        Err(e) => {
            debug!("Daemon history unavailable ({}); reading audit trail", e);
            Ok(AuditTrail::new(config.state_paths().audit_file).recent(limit)?)
        }
    }
}
