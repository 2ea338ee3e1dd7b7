//! Update scheduler
//!
//! Wakes every tick, reloads the config (so interval and channel changes take
//! effect without a restart) and runs a scheduled cycle once `check_interval`
//! has passed since the last check. Manual checks count as checks too, since
//! the last check time is read back from `state.json` on every tick.

use chrono::{DateTime, Utc};
use hoist_common::state::UpdateStatus;
use hoist_common::{Trigger, UpdateClient, UpdateError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Scheduler granularity.
pub const DEFAULT_TICK: Duration = Duration::from_secs(30);

/// When the next scheduled check is due.
pub fn next_due(
    last_check: Option<DateTime<Utc>>,
    interval: Duration,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match (last_check, chrono::Duration::from_std(interval)) {
        (Some(last), Ok(interval)) => last + interval,
        _ => now,
    }
}

pub struct Scheduler {
    client: Arc<UpdateClient>,
    tick: Duration,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(client: Arc<UpdateClient>, shutdown: CancellationToken) -> Self {
        Self {
            client,
            tick: DEFAULT_TICK,
            shutdown,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Run until shutdown is requested. An in-flight cycle is allowed to finish
    /// (or cancel itself if it has not reached BACKING_UP yet).
    pub async fn run(self) {
        info!("Update scheduler started (tick {:?})", self.tick);
        // Covers cycles that end without writing state.json (e.g. refused by an incident)
        let mut last_attempted: Option<DateTime<Utc>> = None;

        loop {
            let config = self.client.config();
            let on_disk = UpdateStatus::load(&config.state_paths().state_file).last_check;
            let last_check = on_disk.max(last_attempted);
            let now = Utc::now();
            let due = next_due(last_check, config.check_interval(), now);

            if due <= now {
                let following = next_due(Some(now), config.check_interval(), now);
                self.client.set_next_check(Some(following));
                last_attempted = Some(now);

                info!("Scheduled update check (channel {})", config.channel);
                match self.client.run_cycle(Trigger::Scheduled, &self.shutdown).await {
                    Ok(report) => debug!(
                        "Scheduled cycle {} finished: {}",
                        report.attempt.id,
                        report.outcome()
                    ),
                    Err(UpdateError::AlreadyChecking) => {
                        debug!("Skipping scheduled check; a cycle is already running")
                    }
                    Err(UpdateError::RollbackFailure(reason)) => {
                        error!("Scheduled updates suspended: {}", reason)
                    }
                    Err(e) => warn!("Scheduled check failed to start: {}", e),
                }
            } else {
                self.client.set_next_check(Some(due));
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.tick) => {}
            }
        }

        info!("Update scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_due() {
        let now = Utc::now();
        let hour = Duration::from_secs(3600);
        assert_eq!(next_due(None, hour, now), now);

        let last = now - chrono::Duration::minutes(90);
        assert!(next_due(Some(last), hour, now) < now);

        let recent = now - chrono::Duration::minutes(10);
        assert_eq!(
            next_due(Some(recent), hour, now),
            recent + chrono::Duration::hours(1)
        );
    }
}
