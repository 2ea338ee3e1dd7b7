//! Process Supervisor
//!
//! Stops and restarts the managed service. Strategies are tried in a fixed
//! order and the first available one that succeeds wins; the supervisor then
//! confirms the service is live before reporting success.

pub mod strategies;

use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use strategies::{find_processes, ManualStrategy, SupervisordStrategy, SystemdStrategy};
use tracing::{debug, info, warn};

/// One way of stopping and starting the service.
#[async_trait]
pub trait RestartStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy can manage the service on this host.
    async fn is_available(&self) -> bool;

    async fn stop(&self) -> Result<(), SupervisorError>;

    async fn start(&self) -> Result<(), SupervisorError>;

    async fn restart(&self) -> Result<(), SupervisorError> {
        self.stop().await?;
        self.start().await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartReport {
    pub strategy: String,
    pub elapsed: Duration,
}

/// Seam used by the update core; the `Supervisor` is the production impl.
#[async_trait]
pub trait Restarter: Send + Sync {
    async fn restart(&self) -> Result<RestartReport, SupervisorError>;
}

/// Confirms a restarted service is up.
pub struct LivenessCheck {
    signature: Option<String>,
    readiness_url: Option<String>,
    timeout: Duration,
    poll: Duration,
    client: reqwest::Client,
}

impl LivenessCheck {
    pub fn new(signature: Option<String>, readiness_url: Option<String>, timeout: Duration) -> Self {
        Self {
            signature,
            readiness_url,
            timeout,
            poll: Duration::from_millis(500),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn ready(&self) -> bool {
        match &self.readiness_url {
            Some(url) => matches!(
                self.client.get(url).send().await,
                Ok(response) if response.status().is_success()
            ),
            None => true,
        }
    }

    fn running(&self) -> bool {
        match &self.signature {
            Some(signature) => !find_processes(signature).is_empty(),
            None => true,
        }
    }

    /// Wait until the process is present and the readiness URL answers.
    pub async fn confirm(&self) -> Result<(), SupervisorError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if self.running() && self.ready().await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SupervisorError::LivenessTimeout(self.timeout));
            }
            tokio::time::sleep(self.poll).await;
        }
    }
}

pub struct Supervisor {
    strategies: Vec<Box<dyn RestartStrategy>>,
    liveness: LivenessCheck,
}

impl Supervisor {
    pub fn new(strategies: Vec<Box<dyn RestartStrategy>>, liveness: LivenessCheck) -> Self {
        Self {
            strategies,
            liveness,
        }
    }

    /// Build the strategy chain from what the config names.
    pub fn from_config(config: &SupervisorConfig) -> Self {
        let mut strategies: Vec<Box<dyn RestartStrategy>> = Vec::new();

        if let Some(unit) = &config.systemd_unit {
            strategies.push(Box::new(SystemdStrategy::new(
                unit,
                config.use_sudo,
                config.command_timeout(),
            )));
        }
        if let Some(program) = &config.supervisor_program {
            strategies.push(Box::new(SupervisordStrategy::new(
                program,
                config.use_sudo,
                config.command_timeout(),
            )));
        }
        if let Some(signature) = &config.process_signature {
            strategies.push(Box::new(ManualStrategy::new(
                signature,
                config.start_command.clone(),
                config.working_dir.clone(),
                config.log_file.clone(),
                config.stop_timeout(),
            )));
        }

        let liveness = LivenessCheck::new(
            config.process_signature.clone(),
            config.readiness_url.clone(),
            config.liveness_timeout(),
        );
        Self::new(strategies, liveness)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl Restarter for Supervisor {
    async fn restart(&self) -> Result<RestartReport, SupervisorError> {
        let started = Instant::now();
        let mut last_error = None;
        let mut used = None;

        for strategy in &self.strategies {
            if !strategy.is_available().await {
                debug!("Restart strategy {} not available", strategy.name());
                continue;
            }
            info!("Restarting managed service via {}", strategy.name());
            match strategy.restart().await {
                Ok(()) => {
                    used = Some(strategy.name());
                    break;
                }
                Err(e) => {
                    warn!("Restart via {} failed: {}", strategy.name(), e);
                    last_error = Some(e);
                }
            }
        }

        let strategy = match used {
            Some(name) => name,
            None => return Err(last_error.unwrap_or(SupervisorError::NoStrategyAvailable)),
        };

        self.liveness.confirm().await?;
        let report = RestartReport {
            strategy: strategy.to_string(),
            elapsed: started.elapsed(),
        };
        info!("Service restarted via {} in {:?}", report.strategy, report.elapsed);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Scripted strategy that records what was called on it.
    struct Scripted {
        name: &'static str,
        available: bool,
        stop: Result<(), SupervisorError>,
        start: Result<(), SupervisorError>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RestartStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn stop(&self) -> Result<(), SupervisorError> {
            self.calls.lock().unwrap().push(format!("{}:stop", self.name));
            self.stop.clone()
        }

        async fn start(&self) -> Result<(), SupervisorError> {
            self.calls.lock().unwrap().push(format!("{}:start", self.name));
            self.start.clone()
        }
    }

    fn scripted(
        name: &'static str,
        available: bool,
        start: Result<(), SupervisorError>,
        calls: &Arc<Mutex<Vec<String>>>,
    ) -> Box<dyn RestartStrategy> {
        Box::new(Scripted {
            name,
            available,
            stop: Ok(()),
            start,
            calls: calls.clone(),
        })
    }

    fn no_liveness() -> LivenessCheck {
        LivenessCheck::new(None, None, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_first_available_strategy_wins() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let supervisor = Supervisor::new(
            vec![
                scripted("systemd", false, Ok(()), &calls),
                scripted("supervisord", true, Ok(()), &calls),
                scripted("manual", true, Ok(()), &calls),
            ],
            no_liveness(),
        );

        let report = supervisor.restart().await.unwrap();
        assert_eq!(report.strategy, "supervisord");
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["supervisord:stop", "supervisord:start"]
        );
    }

    #[tokio::test]
    async fn test_falls_through_on_failure() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let failed = SupervisorError::StartFailed {
            strategy: "systemd".into(),
            reason: "unit masked".into(),
        };
        let supervisor = Supervisor::new(
            vec![
                scripted("systemd", true, Err(failed), &calls),
                scripted("manual", true, Ok(()), &calls),
            ],
            no_liveness(),
        );

        assert_eq!(supervisor.restart().await.unwrap().strategy, "manual");
    }

    #[tokio::test]
    async fn test_last_error_reported() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let failed = SupervisorError::StartFailed {
            strategy: "manual".into(),
            reason: "no such file".into(),
        };
        let supervisor = Supervisor::new(
            vec![scripted("manual", true, Err(failed.clone()), &calls)],
            no_liveness(),
        );
        assert_eq!(supervisor.restart().await.unwrap_err(), failed);
    }

    #[tokio::test]
    async fn test_no_strategy_available() {
        let supervisor = Supervisor::from_config(&SupervisorConfig::default());
        assert!(supervisor.strategy_names().is_empty());
        assert_eq!(
            supervisor.restart().await.unwrap_err(),
            SupervisorError::NoStrategyAvailable
        );
    }

    #[tokio::test]
    async fn test_liveness_timeout() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let liveness = LivenessCheck::new(
            Some(format!("no-such-process-{}", uuid::Uuid::new_v4())),
            None,
            Duration::from_millis(50),
        );
        let supervisor = Supervisor::new(vec![scripted("manual", true, Ok(()), &calls)], liveness);
        assert!(matches!(
            supervisor.restart().await,
            Err(SupervisorError::LivenessTimeout(_))
        ));
    }

    #[test]
    fn test_chain_order_from_config() {
        let config = SupervisorConfig {
            systemd_unit: Some("inventory.service".into()),
            supervisor_program: Some("inventory".into()),
            process_signature: Some("app.py".into()),
            start_command: vec!["python3".into(), "app.py".into()],
            ..SupervisorConfig::default()
        };
        assert_eq!(
            Supervisor::from_config(&config).strategy_names(),
            vec!["systemd", "supervisord", "manual"]
        );
    }
}
