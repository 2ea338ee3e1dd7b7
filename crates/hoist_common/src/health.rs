//! Post-restart health checking
//!
//! The managed service exposes `{ "version": "...", "status": "ok" }`. After a
//! restart the client polls it with exponential backoff until it reports the
//! expected version as healthy, or the attempt budget runs out.

use crate::config::HealthConfig;
use crate::error::UpdateError;
use crate::version::same_version;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Liveness payload of the managed service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub version: String,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "ok".to_string()
}

impl ServiceHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "ok" | "healthy" | "up" | "ready"
        )
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// One probe of the liveness surface.
    async fn probe(&self) -> Result<ServiceHealth, String>;
}

/// Probes the liveness URL over HTTP.
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthProbe {
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| UpdateError::NetworkFailure(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn from_config(config: &HealthConfig) -> Result<Self, UpdateError> {
        Self::new(&config.url, Duration::from_secs(config.request_timeout_secs))
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self) -> Result<ServiceHealth, String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        response.json().await.map_err(|e| e.to_string())
    }
}

/// Backoff schedule: `initial * 2^n`, clamped to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl HealthPolicy {
    pub fn from_config(config: &HealthConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay after failed attempt `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Poll until the service reports `expected` as healthy.
pub async fn wait_for_version(
    probe: &dyn HealthProbe,
    expected: &str,
    policy: &HealthPolicy,
) -> Result<ServiceHealth, UpdateError> {
    for attempt in 0..policy.attempts {
        match probe.probe().await {
            Ok(health) if health.is_healthy() && same_version(&health.version, expected) => {
                info!(
                    "Service healthy at version {} (attempt {})",
                    health.version,
                    attempt + 1
                );
                return Ok(health);
            }
            Ok(health) => debug!(
                "Health attempt {}: version={} status={} (want {})",
                attempt + 1,
                health.version,
                health.status,
                expected
            ),
            Err(e) => debug!("Health attempt {} failed: {}", attempt + 1, e),
        }

        if attempt + 1 < policy.attempts {
            tokio::time::sleep(policy.delay(attempt)).await;
        }
    }

    Err(UpdateError::HealthCheckTimeout {
        expected: expected.to_string(),
        attempts: policy.attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        calls: AtomicU32,
        healthy_after: u32,
        version: String,
    }

    #[async_trait]
    impl HealthProbe for Flaky {
        async fn probe(&self) -> Result<ServiceHealth, String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.healthy_after {
                Err("connection refused".to_string())
            } else {
                Ok(ServiceHealth {
                    version: self.version.clone(),
                    status: "ok".to_string(),
                })
            }
        }
    }

    fn fast_policy(attempts: u32) -> HealthPolicy {
        HealthPolicy {
            attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_backoff_doubles_then_clamps() {
        let policy = HealthPolicy {
            attempts: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(2), Duration::from_millis(2000));
        assert_eq!(policy.delay(3), Duration::from_secs(3));
        assert_eq!(policy.delay(40), Duration::from_secs(3));
    }

    #[test]
    fn test_health_status_words() {
        let health = |status: &str| ServiceHealth {
            version: "1.0.0".into(),
            status: status.into(),
        };
        assert!(health("OK").is_healthy());
        assert!(health("healthy").is_healthy());
        assert!(!health("degraded").is_healthy());
    }

    #[test]
    fn test_status_defaults_to_ok() {
        let health: ServiceHealth = serde_json::from_str(r#"{"version": "1.1.0"}"#).unwrap();
        assert!(health.is_healthy());
    }

    #[tokio::test]
    async fn test_wait_succeeds_after_retries() {
        let probe = Flaky {
            calls: AtomicU32::new(0),
            healthy_after: 2,
            version: "1.1.0".into(),
        };
        let health = wait_for_version(&probe, "1.1.0", &fast_policy(5)).await.unwrap();
        assert_eq!(health.version, "1.1.0");
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wrong_version_times_out() {
        let probe = Flaky {
            calls: AtomicU32::new(0),
            healthy_after: 0,
            version: "1.0.0".into(),
        };
        let err = wait_for_version(&probe, "1.1.0", &fast_policy(3)).await.unwrap_err();
        assert!(matches!(err, UpdateError::HealthCheckTimeout { attempts: 3, .. }));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    }
}
