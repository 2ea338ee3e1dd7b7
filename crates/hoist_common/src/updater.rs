//! Update Client Core
//!
//! Drives one update cycle through its phases:
//!
//! ```text
//! IDLE -> CHECKING -> DOWNLOADING -> VERIFYING -> BACKING_UP -> APPLYING
//!      -> RESTARTING -> HEALTH_CHECKING -> DONE | ROLLING_BACK -> IDLE
//! ```
//!
//! Guarantees:
//! 1. At most one cycle per host (in-process try-lock + cross-process lock file)
//! 2. Nothing touches the live tree before the artifact is verified and backed up
//! 3. The live tree is replaced by one journaled swap, never file by file
//! 4. Restart or health failure rolls back to the backup and the old version
//! 5. Every cycle, including no-ops and incident refusals, lands in the audit trail
//! 6. Shutdown can cancel a cycle only before BACKING_UP

use crate::api::{LatestReport, StatusReport, StatusSource};
use crate::atomic::{copy_file_atomic, recover_interrupted_swap, remove_path, swap_in_dir, SwapRecovery};
use crate::audit::{AuditTrail, Outcome, Phase, Trigger, UpdateAttempt};
use crate::backup::{BackupHandle, BackupInfo, BackupManager, PruneReport, RetentionPolicy};
use crate::bundle::unpack_verified;
use crate::checksum::{checksums_match, sha256_file};
use crate::config::UpdateConfig;
use crate::error::{BackupError, LockError, UpdateError};
use crate::health::{wait_for_version, HealthPolicy, HealthProbe, HttpHealthProbe};
use crate::lock::UpdateLock;
use crate::paths::{read_installed_version, sibling_path, StatePaths, UNKNOWN_VERSION};
use crate::release::Release;
use crate::source::{HttpReleaseSource, ReleaseSource};
use crate::state::UpdateStatus;
use crate::supervisor::{Restarter, Supervisor};
use crate::version::{is_newer_version, validate_version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ============================================================================
// Collaborators
// ============================================================================

/// External parties a cycle talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn ReleaseSource>,
    pub restarter: Arc<dyn Restarter>,
    pub health: Arc<dyn HealthProbe>,
}

impl Collaborators {
    /// Registry over HTTP, the configured supervisor, HTTP health probe.
    pub fn from_config(config: &UpdateConfig) -> Result<Self, UpdateError> {
        Ok(Self {
            source: Arc::new(HttpReleaseSource::from_config(config)?),
            restarter: Arc::new(Supervisor::from_config(&config.supervisor)),
            health: Arc::new(HttpHealthProbe::from_config(&config.health)?),
        })
    }
}

/// Builds collaborators for each cycle from that cycle's config.
pub type CollaboratorFactory =
    Arc<dyn Fn(&UpdateConfig) -> Result<Collaborators, UpdateError> + Send + Sync>;

/// Where the client reads its configuration from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Re-read before every cycle
    File(PathBuf),
    Fixed(UpdateConfig),
}

/// Terminal record of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub attempt: UpdateAttempt,
}

impl CycleReport {
    pub fn outcome(&self) -> Outcome {
        self.attempt.outcome.unwrap_or(Outcome::Failed)
    }
}

// ============================================================================
// Update Client
// ============================================================================

pub struct UpdateClient {
    config_source: ConfigSource,
    factory: CollaboratorFactory,
    cycle_lock: tokio::sync::Mutex<()>,
    phase: watch::Sender<Phase>,
    next_check: Mutex<Option<DateTime<Utc>>>,
}

impl UpdateClient {
    /// Production client: config file on disk, HTTP collaborators.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self::with_factory(
            ConfigSource::File(config_path.into()),
            Arc::new(Collaborators::from_config),
        )
    }

    pub fn with_factory(config_source: ConfigSource, factory: CollaboratorFactory) -> Self {
        let (phase, _) = watch::channel(Phase::Idle);
        Self {
            config_source,
            factory,
            cycle_lock: tokio::sync::Mutex::new(()),
            phase,
            next_check: Mutex::new(None),
        }
    }

    /// Fixed config and fixed collaborators (tests, one-shot tools).
    pub fn with_collaborators(config: UpdateConfig, collaborators: Collaborators) -> Self {
        Self::with_factory(
            ConfigSource::Fixed(config),
            Arc::new(move |_: &UpdateConfig| Ok(collaborators.clone())),
        )
    }

    /// Current configuration (re-read from disk for file-backed clients).
    pub fn config(&self) -> UpdateConfig {
        match &self.config_source {
            ConfigSource::File(path) => UpdateConfig::load(path),
            ConfigSource::Fixed(config) => config.clone(),
        }
    }

    pub fn config_path(&self) -> Option<&Path> {
        match &self.config_source {
            ConfigSource::File(path) => Some(path),
            ConfigSource::Fixed(_) => None,
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.cycle_lock.try_lock().is_err()
    }

    /// Wait for an in-flight cycle to finish.
    pub async fn wait_idle(&self) {
        let _guard = self.cycle_lock.lock().await;
    }

    pub fn set_next_check(&self, at: Option<DateTime<Utc>>) {
        if let Ok(mut next) = self.next_check.lock() {
            *next = at;
        }
    }

    pub fn next_check(&self) -> Option<DateTime<Utc>> {
        self.next_check.lock().ok().and_then(|next| *next)
    }

    pub fn status(&self) -> StatusReport {
        let mut report = StatusReport::from_disk(&self.config());
        report.source = StatusSource::Daemon;
        report.phase = self.phase();
        report.in_progress = self.is_busy();
        if let Some(next) = self.next_check() {
            report.next_check = Some(next);
        }
        report
    }

    /// Most recent attempts, newest first.
    pub fn history(&self, limit: usize) -> std::io::Result<Vec<UpdateAttempt>> {
        AuditTrail::new(self.config().state_paths().audit_file).recent(limit)
    }

    pub fn backups(&self) -> Result<Vec<BackupInfo>, BackupError> {
        BackupManager::from_config(&self.config()).list()
    }

    /// Apply the retention policy outside a cycle. Refuses while a cycle runs.
    pub fn prune_backups(&self) -> Result<PruneReport, UpdateError> {
        let _guard = self
            .cycle_lock
            .try_lock()
            .map_err(|_| UpdateError::AlreadyChecking)?;
        let config = self.config();
        BackupManager::from_config(&config)
            .prune(&RetentionPolicy::from(&config.retention))
            .map_err(UpdateError::BackupFailure)
    }

    /// Ask the release source what the configured channel offers.
    ///
    /// Read-only: no download, no backup, nothing recorded. Still refused while
    /// a cycle runs here or in another process.
    pub async fn probe_latest(&self) -> Result<LatestReport, UpdateError> {
        let _cycle_guard = self
            .cycle_lock
            .try_lock()
            .map_err(|_| UpdateError::AlreadyChecking)?;
        let config = self.config();
        if let Some(holder) = UpdateLock::holder(&config.state_paths().lock_file) {
            if holder.is_active() {
                info!("Update cycle running in PID {} ({})", holder.pid, holder.step);
                return Err(UpdateError::AlreadyChecking);
            }
        }

        let collaborators = (self.factory)(&config)?;
        let limit = config.network.manifest_timeout();
        let latest = tokio::time::timeout(limit, collaborators.source.latest(&config.channel))
            .await
            .unwrap_or_else(|_| {
                Err(UpdateError::NetworkFailure(format!(
                    "manifest query timed out after {:?}",
                    limit
                )))
            })?;
        if let Some(release) = &latest {
            validate_version(&release.version).map_err(|e| {
                UpdateError::IntegrityFailure(format!("manifest offered an unusable version: {}", e))
            })?;
        }

        let installed_version = read_installed_version(&config.install_dir)
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        let update_available = latest
            .as_ref()
            .is_some_and(|release| is_newer_version(&installed_version, &release.version));
        Ok(LatestReport {
            installed_version,
            channel: config.channel,
            latest,
            update_available,
        })
    }

    /// Run one update cycle to a terminal state.
    ///
    /// Returns `AlreadyChecking` immediately when another cycle holds the lock.
    /// Every other outcome, failures included, comes back as a `CycleReport`.
    pub async fn run_cycle(
        &self,
        trigger: Trigger,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, UpdateError> {
        let _cycle_guard = self
            .cycle_lock
            .try_lock()
            .map_err(|_| UpdateError::AlreadyChecking)?;

        let config = self.config();
        let paths = config.state_paths();
        let lock = match UpdateLock::acquire(&paths.lock_file, Phase::Checking.as_str()) {
            Ok(lock) => lock,
            Err(LockError::AlreadyLocked { pid, step, .. }) => {
                info!("Update cycle already running in PID {} ({})", pid, step);
                return Err(UpdateError::AlreadyChecking);
            }
            Err(e) => return Err(e.into()),
        };
        let _phase_reset = PhaseReset(&self.phase);

        if trigger == Trigger::Scheduled && paths.incident_file.exists() {
            warn!(
                "Skipping scheduled update: unresolved incident at {}",
                paths.incident_file.display()
            );
            let refusal = UpdateError::RollbackFailure(format!(
                "unresolved incident; remove {} once the service is repaired",
                paths.incident_file.display()
            ));
            let installed = read_installed_version(&config.install_dir)
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
            let mut attempt = UpdateAttempt::begin(trigger, &installed);
            attempt.finish(Outcome::Failed, Some(&refusal));
            self.record(&config, &paths, &attempt, None, false);
            return Err(refusal);
        }

        settle_install_dir(&config.install_dir)?;

        let from_version =
            read_installed_version(&config.install_dir).unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        let mut cycle = Cycle {
            client: self,
            config: &config,
            paths: &paths,
            lock,
            cancel,
            attempt: UpdateAttempt::begin(trigger, &from_version),
            latest_available: None,
            restart_pending: false,
        };
        info!(
            "Update cycle {} started ({:?}, installed {})",
            cycle.attempt.id, trigger, from_version
        );

        let resolution = cycle.drive().await;
        let mut attempt = cycle.attempt;
        attempt.finish(resolution.outcome, resolution.error.as_ref());

        match (&resolution.error, resolution.outcome) {
            (_, Outcome::RollbackFailed) => error!(
                "Update cycle {} ended {}: {}",
                attempt.id,
                resolution.outcome,
                attempt.error.as_deref().unwrap_or("")
            ),
            (Some(e), outcome) => warn!(
                "Update cycle {} ended {} in {}: {}",
                attempt.id,
                outcome,
                attempt.responsible_phase(),
                e
            ),
            (None, outcome) => info!("Update cycle {} ended {}", attempt.id, outcome),
        }

        self.record(&config, &paths, &attempt, cycle.latest_available, cycle.restart_pending);
        Ok(CycleReport { attempt })
    }

    fn record(
        &self,
        config: &UpdateConfig,
        paths: &StatePaths,
        attempt: &UpdateAttempt,
        latest_available: Option<String>,
        restart_pending: bool,
    ) {
        if let Err(e) = AuditTrail::new(&paths.audit_file).append(attempt) {
            error!("Failed to append to audit trail: {}", e);
        }

        let mut status = UpdateStatus::load(&paths.state_file);
        status.installed_version = read_installed_version(&config.install_dir);
        status.channel = Some(config.channel.clone());
        status.last_check = Some(attempt.started_at);
        status.next_check = self
            .next_check()
            .or_else(|| chrono::Duration::from_std(config.check_interval()).ok().map(|d| Utc::now() + d));
        if latest_available.is_some() {
            status.latest_available = latest_available;
        }
        match attempt.outcome {
            Some(Outcome::Success) => status.restart_pending = restart_pending,
            Some(Outcome::RolledBack) | Some(Outcome::RollbackFailed) => status.restart_pending = false,
            _ => {}
        }
        status.last_attempt = Some(attempt.clone());
        if let Err(e) = status.save(&paths.state_file) {
            error!("Failed to save update status: {}", e);
        }

        if attempt.outcome == Some(Outcome::RollbackFailed) {
            match serde_json::to_vec_pretty(attempt) {
                Ok(body) => {
                    if let Err(e) = crate::atomic::atomic_write(&paths.incident_file, &body) {
                        error!("Failed to write incident file: {}", e);
                    }
                }
                Err(e) => error!("Failed to serialize incident: {}", e),
            }
        }
    }
}

/// Finish any swap a crash interrupted and drop stale staging trees.
fn settle_install_dir(install_dir: &Path) -> Result<(), UpdateError> {
    match recover_interrupted_swap(install_dir) {
        Ok(SwapRecovery::Clean) => {}
        Ok(recovery) => warn!(
            "Settled interrupted swap of {}: {:?}",
            install_dir.display(),
            recovery
        ),
        Err(e) => {
            return Err(UpdateError::ApplyFailure(format!(
                "could not settle interrupted swap: {}",
                e
            )))
        }
    }
    discard(&sibling_path(install_dir, "incoming"));
    Ok(())
}

fn discard(path: &Path) {
    if let Err(e) = remove_path(path) {
        warn!("Could not remove {}: {}", path.display(), e);
    }
}

/// Puts the published phase back to Idle however the cycle ends.
struct PhaseReset<'a>(&'a watch::Sender<Phase>);

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        self.0.send_replace(Phase::Idle);
    }
}

// ============================================================================
// One cycle
// ============================================================================

struct Resolution {
    outcome: Outcome,
    error: Option<UpdateError>,
}

impl Resolution {
    fn ok(outcome: Outcome) -> Self {
        Self {
            outcome,
            error: None,
        }
    }

    fn failed(error: UpdateError) -> Self {
        let outcome = match error {
            UpdateError::Cancelled => Outcome::Cancelled,
            _ => Outcome::Failed,
        };
        Self {
            outcome,
            error: Some(error),
        }
    }
}

struct Cycle<'a> {
    client: &'a UpdateClient,
    config: &'a UpdateConfig,
    paths: &'a StatePaths,
    lock: UpdateLock,
    cancel: &'a CancellationToken,
    attempt: UpdateAttempt,
    latest_available: Option<String>,
    restart_pending: bool,
}

impl Cycle<'_> {
    fn enter(&mut self, phase: Phase) {
        self.attempt.enter(phase);
        self.client.phase.send_replace(phase);
        if let Err(e) = self.lock.update_step(phase.as_str()) {
            debug!("Could not record step in lock file: {}", e);
        }
        info!("Update phase: {}", phase);
    }

    /// Bound a network step by `limit` and abandon it on shutdown.
    async fn guarded<T, F>(&self, limit: Duration, what: &str, fut: F) -> Result<T, UpdateError>
    where
        F: Future<Output = Result<T, UpdateError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(UpdateError::Cancelled),
            result = tokio::time::timeout(limit, fut) => result.unwrap_or_else(|_| {
                Err(UpdateError::NetworkFailure(format!("{} timed out after {:?}", what, limit)))
            }),
        }
    }

    async fn drive(&mut self) -> Resolution {
        // ---- CHECKING ------------------------------------------------------
        self.enter(Phase::Checking);
        let collaborators = match (self.client.factory)(self.config) {
            Ok(collaborators) => collaborators,
            Err(e) => return Resolution::failed(e),
        };

        let channel = self.config.channel.clone();
        let latest = self
            .guarded(
                self.config.network.manifest_timeout(),
                "manifest query",
                collaborators.source.latest(&channel),
            )
            .await;
        let release = match latest {
            Ok(Some(release)) => release,
            Ok(None) => {
                info!("No release published on channel {}", channel);
                return Resolution::ok(Outcome::UpToDate);
            }
            Err(e) => return Resolution::failed(e),
        };
        // The version names the staging directory and the artifact file
        if let Err(e) = validate_version(&release.version) {
            return Resolution::failed(UpdateError::IntegrityFailure(format!(
                "manifest offered an unusable version: {}",
                e
            )));
        }
        self.latest_available = Some(release.version.clone());

        if !is_newer_version(&self.attempt.from_version, &release.version) {
            info!(
                "Installed {} is current (latest on {}: {})",
                self.attempt.from_version, channel, release.version
            );
            return Resolution::ok(Outcome::UpToDate);
        }
        self.attempt.to_version = Some(release.version.clone());

        if self.attempt.trigger == Trigger::Scheduled && !self.config.auto_update {
            info!(
                "Update {} -> {} available; auto_update is off, deferring",
                self.attempt.from_version, release.version
            );
            return Resolution::ok(Outcome::Deferred);
        }

        // ---- DOWNLOADING ---------------------------------------------------
        self.enter(Phase::Downloading);
        let staging = self.paths.staging_dir.join(&release.version);
        if let Err(e) = remove_path(&staging).and_then(|_| fs::create_dir_all(&staging)) {
            return Resolution::failed(e.into());
        }
        let artifact = staging.join(release.artifact_file_name());
        let downloaded = self
            .guarded(
                self.config.network.download_timeout(),
                "download",
                collaborators.source.download(&release, &artifact),
            )
            .await;
        match downloaded {
            Ok(bytes) => info!("Downloaded {} ({} bytes)", release.version, bytes),
            Err(e) => {
                discard(&staging);
                return Resolution::failed(e);
            }
        }

        // ---- VERIFYING -----------------------------------------------------
        self.enter(Phase::Verifying);
        let incoming = sibling_path(&self.config.install_dir, "incoming");
        let verified = verify_and_unpack(&release, &artifact, &incoming);
        discard(&staging);
        if let Err(e) = verified {
            discard(&incoming);
            return Resolution::failed(e);
        }

        // Last point at which shutdown may cancel
        if self.cancel.is_cancelled() {
            discard(&incoming);
            return Resolution::failed(UpdateError::Cancelled);
        }

        // ---- BACKING_UP ----------------------------------------------------
        self.enter(Phase::BackingUp);
        if !self.config.backup_before_update {
            warn!("backup_before_update = false is ignored; taking a backup anyway");
            self.attempt
                .notes
                .push("backup_before_update=false ignored".to_string());
        }
        let backups = BackupManager::from_config(self.config);
        let handle = match backups
            .create(&self.attempt.from_version)
            .and_then(|handle| backups.pin(&handle).map(|_| handle))
        {
            Ok(handle) => handle,
            Err(e) => {
                discard(&incoming);
                return Resolution::failed(UpdateError::BackupFailure(e));
            }
        };
        self.attempt.backup_id = Some(handle.id.clone());

        // ---- APPLYING ------------------------------------------------------
        self.enter(Phase::Applying);
        if let Err(e) = self
            .carry_data_file(&incoming)
            .and_then(|_| swap_in_dir(&self.config.install_dir, &incoming))
        {
            if let Err(re) = recover_interrupted_swap(&self.config.install_dir) {
                error!("Could not settle failed swap: {}", re);
            }
            discard(&incoming);
            release_pin(&backups, &handle);
            return Resolution::failed(UpdateError::ApplyFailure(e.to_string()));
        }
        info!("Installed tree is now {}", release.version);

        // ---- RESTARTING ----------------------------------------------------
        if !self.config.auto_restart {
            self.restart_pending = true;
            self.attempt
                .notes
                .push("restart pending: auto_restart is off".to_string());
            info!("auto_restart is off; {} takes effect on next service restart", release.version);
            self.enter(Phase::Done);
            self.finish_success(&backups, &handle);
            return Resolution::ok(Outcome::Success);
        }

        self.enter(Phase::Restarting);
        let forward = match collaborators.restarter.restart().await {
            Ok(report) => {
                debug!("Restarted via {} in {:?}", report.strategy, report.elapsed);
                self.enter(Phase::HealthChecking);
                let policy = HealthPolicy::from_config(&self.config.health);
                wait_for_version(collaborators.health.as_ref(), &release.version, &policy)
                    .await
                    .map(|_| ())
            }
            Err(e) => Err(UpdateError::RestartFailure(e)),
        };

        match forward {
            Ok(()) => {
                self.enter(Phase::Done);
                self.finish_success(&backups, &handle);
                Resolution::ok(Outcome::Success)
            }
            Err(cause) => self.roll_back(&collaborators, &backups, &handle, cause).await,
        }
    }

    /// A data file inside the install tree must survive the swap.
    fn carry_data_file(&self, incoming: &Path) -> std::io::Result<()> {
        let Some(data_file) = &self.config.data_file else {
            return Ok(());
        };
        let Ok(relative) = data_file.strip_prefix(&self.config.install_dir) else {
            return Ok(());
        };
        if data_file.is_file() {
            copy_file_atomic(data_file, &incoming.join(relative))?;
        }
        Ok(())
    }

    fn finish_success(&self, backups: &BackupManager, handle: &BackupHandle) {
        release_pin(backups, handle);
        match backups.prune(&RetentionPolicy::from(&self.config.retention)) {
            Ok(report) => debug!(
                "Retention: kept {}, removed {}",
                report.kept.len(),
                report.removed.len()
            ),
            Err(e) => warn!("Backup pruning failed: {}", e),
        }
    }

    async fn roll_back(
        &mut self,
        collaborators: &Collaborators,
        backups: &BackupManager,
        handle: &BackupHandle,
        cause: UpdateError,
    ) -> Resolution {
        self.attempt.failed_phase = Some(self.attempt.phase);
        warn!("{}; rolling back to {}", cause, self.attempt.from_version);
        self.enter(Phase::RollingBack);

        let from_version = self.attempt.from_version.clone();
        let policy = HealthPolicy::from_config(&self.config.health);
        let result: Result<(), String> = async {
            backups
                .restore(handle)
                .map_err(|e| format!("restore: {}", e))?;
            collaborators
                .restarter
                .restart()
                .await
                .map_err(|e| format!("restart: {}", e))?;
            wait_for_version(collaborators.health.as_ref(), &from_version, &policy)
                .await
                .map_err(|e| format!("health: {}", e))?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                release_pin(backups, handle);
                info!("Rolled back to {}", from_version);
                Resolution {
                    outcome: Outcome::RolledBack,
                    error: Some(cause),
                }
            }
            Err(reason) => {
                // The backup stays pinned for the operator
                error!(
                    "Rollback to {} failed ({}); operator attention required, backup {} kept",
                    from_version, reason, handle.id
                );
                Resolution {
                    outcome: Outcome::RollbackFailed,
                    error: Some(UpdateError::RollbackFailure(format!(
                        "{} (after: {})",
                        reason, cause
                    ))),
                }
            }
        }
    }
}

fn release_pin(backups: &BackupManager, handle: &BackupHandle) {
    if let Err(e) = backups.unpin(handle) {
        warn!("Could not unpin backup {}: {}", handle.id, e);
    }
}

/// Checksum the artifact, then unpack it next to the live tree and check its marker.
fn verify_and_unpack(release: &Release, artifact: &Path, incoming: &Path) -> Result<(), UpdateError> {
    let actual = sha256_file(artifact)?;
    if !checksums_match(&release.checksum, &actual) {
        return Err(UpdateError::IntegrityFailure(format!(
            "checksum mismatch for {}: expected {}, got {}",
            release.version, release.checksum, actual
        )));
    }

    remove_path(incoming)?;
    unpack_verified(artifact, incoming, &release.version)
        .map_err(|e| UpdateError::IntegrityFailure(format!("bundle rejected: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_maps_cancel() {
        assert_eq!(
            Resolution::failed(UpdateError::Cancelled).outcome,
            Outcome::Cancelled
        );
        assert_eq!(
            Resolution::failed(UpdateError::NetworkFailure("x".into())).outcome,
            Outcome::Failed
        );
    }

    #[test]
    fn test_cycle_report_outcome_defaults_to_failed() {
        let attempt = UpdateAttempt::begin(Trigger::Manual, "1.0.0");
        assert_eq!(CycleReport { attempt }.outcome(), Outcome::Failed);
    }
}
