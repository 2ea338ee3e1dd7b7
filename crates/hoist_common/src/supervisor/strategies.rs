//! Restart strategies, in the order the supervisor tries them:
//! systemd unit, supervisord program, manual signature + start command.

use super::RestartStrategy;
use crate::error::SupervisorError;
use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use sysinfo::System;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// How long to wait for stragglers after SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Run an external command with a timeout; the child is killed if it overruns.
pub(crate) async fn run_command(
    program: &str,
    args: &[&str],
    use_sudo: bool,
    timeout: Duration,
) -> Result<Output, String> {
    let mut cmd = if use_sudo {
        let mut cmd = Command::new("sudo");
        cmd.arg("-n").arg(program);
        cmd
    } else {
        Command::new(program)
    };
    cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(format!("{} could not be run: {}", program, e)),
        Err(_) => Err(format!("{} timed out after {:?}", program, timeout)),
    }
}

fn describe_failure(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("exit status {}", output.status)
    } else {
        stderr
    }
}

// ============================================================================
// systemd
// ============================================================================

pub struct SystemdStrategy {
    unit: String,
    use_sudo: bool,
    timeout: Duration,
}

impl SystemdStrategy {
    pub fn new(unit: &str, use_sudo: bool, timeout: Duration) -> Self {
        Self {
            unit: unit.to_string(),
            use_sudo,
            timeout,
        }
    }

    async fn systemctl(&self, verb: &str) -> Result<(), String> {
        let output = run_command("systemctl", &[verb, &self.unit], self.use_sudo, self.timeout).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(describe_failure(&output))
        }
    }
}

#[async_trait]
impl RestartStrategy for SystemdStrategy {
    fn name(&self) -> &'static str {
        "systemd"
    }

    async fn is_available(&self) -> bool {
        matches!(
            run_command("systemctl", &["cat", &self.unit], false, self.timeout).await,
            Ok(output) if output.status.success()
        )
    }

    async fn stop(&self) -> Result<(), SupervisorError> {
        self.systemctl("stop")
            .await
            .map_err(|reason| SupervisorError::StopFailed {
                strategy: self.name().to_string(),
                reason,
            })
    }

    async fn start(&self) -> Result<(), SupervisorError> {
        self.systemctl("start")
            .await
            .map_err(|reason| SupervisorError::StartFailed {
                strategy: self.name().to_string(),
                reason,
            })
    }
}

// ============================================================================
// supervisord
// ============================================================================

pub struct SupervisordStrategy {
    program: String,
    use_sudo: bool,
    timeout: Duration,
}

impl SupervisordStrategy {
    pub fn new(program: &str, use_sudo: bool, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            use_sudo,
            timeout,
        }
    }

    async fn supervisorctl(&self, verb: &str) -> Result<(), String> {
        let output =
            run_command("supervisorctl", &[verb, &self.program], self.use_sudo, self.timeout).await?;
        // supervisorctl reports some failures on stdout with a zero exit code
        let stdout = String::from_utf8_lossy(&output.stdout).to_lowercase();
        if output.status.success() && !stdout.contains("error") {
            Ok(())
        } else if stdout.contains("not running") && verb == "stop" {
            Ok(())
        } else {
            Err(describe_failure(&output))
        }
    }
}

#[async_trait]
impl RestartStrategy for SupervisordStrategy {
    fn name(&self) -> &'static str {
        "supervisord"
    }

    async fn is_available(&self) -> bool {
        match run_command("supervisorctl", &["status", &self.program], self.use_sudo, self.timeout).await {
            Ok(output) => {
                let text = format!(
                    "{}{}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                )
                .to_lowercase();
                !text.contains("no such process")
                    && !text.contains("refused connection")
                    && !text.contains("no such file")
            }
            Err(_) => false,
        }
    }

    async fn stop(&self) -> Result<(), SupervisorError> {
        self.supervisorctl("stop")
            .await
            .map_err(|reason| SupervisorError::StopFailed {
                strategy: self.name().to_string(),
                reason,
            })
    }

    async fn start(&self) -> Result<(), SupervisorError> {
        self.supervisorctl("start")
            .await
            .map_err(|reason| SupervisorError::StartFailed {
                strategy: self.name().to_string(),
                reason,
            })
    }
}

// ============================================================================
// Manual fallback
// ============================================================================

/// PIDs whose command line contains `signature`, excluding this process.
pub fn find_processes(signature: &str) -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes();
    let own_pid = std::process::id();

    system
        .processes()
        .values()
        .filter(|process| process.pid().as_u32() != own_pid)
        .filter(|process| process.cmd().join(" ").contains(signature))
        .map(|process| process.pid().as_u32())
        .collect()
}

fn signal_all(pids: &[u32], signal: Signal) {
    for pid in pids {
        match kill(Pid::from_raw(*pid as i32), signal) {
            Ok(()) => debug!("Sent {:?} to {}", signal, pid),
            Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => warn!("Could not send {:?} to {}: {}", signal, pid, e),
        }
    }
}

async fn wait_until_gone(signature: &str, timeout: Duration) -> Vec<u32> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = find_processes(signature);
        if remaining.is_empty() || Instant::now() >= deadline {
            return remaining;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Start `command` in its own session with output appended to `log_file`.
fn spawn_detached(command: &[String], working_dir: Option<&Path>, log_file: &Path) -> io::Result<u32> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty start command"))?;

    if let Some(parent) = log_file.parent() {
        fs::create_dir_all(parent)?;
    }
    let log = OpenOptions::new().create(true).append(true).open(log_file)?;
    let log_err = log.try_clone()?;

    let mut cmd = std::process::Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
    // SAFETY: setsid is async-signal-safe and touches no parent state.
    unsafe {
        cmd.pre_exec(|| nix::unistd::setsid().map(|_| ()).map_err(io::Error::from));
    }

    let mut child = cmd.spawn()?;
    let pid = child.id();
    // Reap the child when it eventually exits
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(pid)
}

pub struct ManualStrategy {
    signature: String,
    start_command: Vec<String>,
    working_dir: Option<PathBuf>,
    log_file: PathBuf,
    stop_timeout: Duration,
}

impl ManualStrategy {
    pub fn new(
        signature: &str,
        start_command: Vec<String>,
        working_dir: Option<PathBuf>,
        log_file: PathBuf,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            signature: signature.to_string(),
            start_command,
            working_dir,
            log_file,
            stop_timeout,
        }
    }
}

#[async_trait]
impl RestartStrategy for ManualStrategy {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn is_available(&self) -> bool {
        !self.signature.trim().is_empty() && !self.start_command.is_empty()
    }

    async fn stop(&self) -> Result<(), SupervisorError> {
        let pids = find_processes(&self.signature);
        if pids.is_empty() {
            debug!("No running process matches '{}'", self.signature);
            return Ok(());
        }

        info!("Stopping {} process(es) matching '{}'", pids.len(), self.signature);
        signal_all(&pids, Signal::SIGTERM);
        let remaining = wait_until_gone(&self.signature, self.stop_timeout).await;
        if remaining.is_empty() {
            return Ok(());
        }

        warn!(
            "{} process(es) ignored SIGTERM after {:?}, sending SIGKILL",
            remaining.len(),
            self.stop_timeout
        );
        signal_all(&remaining, Signal::SIGKILL);
        let survivors = wait_until_gone(&self.signature, KILL_GRACE).await;
        if survivors.is_empty() {
            Ok(())
        } else {
            Err(SupervisorError::StopFailed {
                strategy: self.name().to_string(),
                reason: format!("processes still running after SIGKILL: {:?}", survivors),
            })
        }
    }

    async fn start(&self) -> Result<(), SupervisorError> {
        let pid = spawn_detached(&self.start_command, self.working_dir.as_deref(), &self.log_file)
            .map_err(|e| SupervisorError::StartFailed {
                strategy: self.name().to_string(),
                reason: e.to_string(),
            })?;
        info!("Started '{}' as PID {}", self.start_command.join(" "), pid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_manual_requires_signature_and_command() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("service.log");
        let timeout = Duration::from_secs(1);

        let missing_cmd = ManualStrategy::new("app.py", Vec::new(), None, log.clone(), timeout);
        assert!(!missing_cmd.is_available().await);

        let missing_sig = ManualStrategy::new(" ", vec!["true".into()], None, log.clone(), timeout);
        assert!(!missing_sig.is_available().await);

        let ready = ManualStrategy::new("app.py", vec!["true".into()], None, log, timeout);
        assert!(ready.is_available().await);
    }

    #[tokio::test]
    async fn test_manual_restart_of_sleeping_process() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("logs/service.log");
        // A unique argument makes the command line easy to find
        let marker = format!("hoist-test-{}", uuid::Uuid::new_v4());
        let command = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("echo started; sleep 30; true # {}", marker),
        ];
        let strategy = ManualStrategy::new(&marker, command, None, log.clone(), Duration::from_secs(5));

        strategy.start().await.unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while find_processes(&marker).is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!find_processes(&marker).is_empty());

        strategy.stop().await.unwrap();
        assert!(find_processes(&marker).is_empty());
        assert!(log.exists());
    }

    #[tokio::test]
    async fn test_run_command_timeout() {
        let err = run_command("sleep", &["5"], false, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.contains("timed out"));
    }

    #[tokio::test]
    async fn test_run_command_missing_binary() {
        let err = run_command("definitely-not-a-binary-hoist", &[], false, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.contains("could not be run"));
    }
}
