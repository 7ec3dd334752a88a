//! Rollout configuration.
//!
//! Loaded from `$ROLLOUT_CONFIG` if set, otherwise `~/.rollout/config.toml`.
//! The service catalog is the only required section; everything else has
//! defaults tuned for a local docker compose environment.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::deploy::DeploySettings;
use crate::flow::FlowSettings;
use crate::model::{ServiceSpec, Thresholds};

/// Rollout configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Address the webhook server binds to.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Where version records and the event log live.
    /// Defaults to `~/.rollout/state`.
    pub state_dir: Option<PathBuf>,

    /// The service catalog: everything rollout is allowed to touch.
    pub services: Vec<ServiceSpec>,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub deploy: DeployConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub flow: FlowConfig,
}

fn default_listen() -> String {
    "127.0.0.1:9000".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DeployConfig {
    pub restart_attempts: u32,
    pub restart_backoff_ms: u64,
    pub health_timeout_secs: u64,
    pub health_poll_interval_ms: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            restart_attempts: 3,
            restart_backoff_ms: 250,
            health_timeout_secs: 60,
            health_poll_interval_ms: 500,
        }
    }
}

impl DeployConfig {
    pub fn settings(&self) -> DeploySettings {
        DeploySettings {
            restart_attempts: self.restart_attempts,
            restart_backoff: Duration::from_millis(self.restart_backoff_ms),
            health_timeout: Duration::from_secs(self.health_timeout_secs),
            health_interval: Duration::from_millis(self.health_poll_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProbeConfig {
    /// Per-request timeout for latency samples and health checks.
    pub request_timeout_ms: u64,

    /// Wall-clock bound on one sampling pass.
    pub overall_timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 2000,
            overall_timeout_secs: 30,
        }
    }
}

impl ProbeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WebhookConfig {
    /// How long a handler waits for a rollback before answering `pending`.
    pub handler_sla_secs: u64,

    /// How long a completed rollback stays in the idempotency cache.
    pub cache_ttl_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            handler_sla_secs: 10,
            cache_ttl_secs: 3600,
        }
    }
}

impl WebhookConfig {
    pub fn handler_sla(&self) -> Duration {
        Duration::from_secs(self.handler_sla_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RuntimeConfig {
    pub compose_file: PathBuf,
    pub env_file: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            compose_file: PathBuf::from("docker-compose.yml"),
            env_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FlowConfig {
    pub samples_per_round: usize,
    pub max_rounds: u32,
    pub round_delay_ms: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            samples_per_round: 5,
            max_rounds: 10,
            round_delay_ms: 2000,
        }
    }
}

impl FlowConfig {
    pub fn settings(&self) -> FlowSettings {
        FlowSettings {
            samples_per_round: self.samples_per_round,
            max_rounds: self.max_rounds,
            round_delay: Duration::from_millis(self.round_delay_ms),
        }
    }
}

impl Config {
    /// Load config from `$ROLLOUT_CONFIG` or `~/.rollout/config.toml`.
    /// Returns an error if the file is missing or invalid.
    pub fn load() -> Result<Self, String> {
        let path = Self::path().ok_or("could not determine home directory")?;

        if !path.exists() {
            return Err(format!(
                "no config file found at {}\n\
                 Create one with at minimum:\n\n\
                 [[services]]\n\
                 name = \"order-service\"\n\
                 endpoint = \"http://localhost:8080\"\n\
                 healthy-version = \"v1.0\"\n\
                 versions = [\"v1.0\", \"v1.1\"]",
                path.display()
            ));
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;

        let config: Self = toml::from_str(&contents)
            .map_err(|e| format!("invalid config at {}: {e}", path.display()))?;
        config.validate(&path.display().to_string())?;

        Ok(config)
    }

    /// The config file path: `$ROLLOUT_CONFIG` if set, otherwise
    /// `~/.rollout/config.toml`.
    pub fn path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("ROLLOUT_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::home_dir().map(|h| h.join(".rollout").join("config.toml"))
    }

    /// Where version records live, defaulting under the home directory.
    pub fn state_dir(&self) -> Result<PathBuf, String> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => crate::store::VersionStore::default_root()
                .ok_or_else(|| "could not determine home directory".to_string()),
        }
    }

    fn validate(&self, origin: &str) -> Result<(), String> {
        if self.services.is_empty() {
            return Err(format!(
                "no services configured in {origin}\n\
                 Add at least one [[services]] entry."
            ));
        }
        for service in &self.services {
            if !service.knows_version(&service.healthy_version) {
                return Err(format!(
                    "service {} in {origin}: healthy-version {} is not in its versions list",
                    service.name, service.healthy_version
                ));
            }
        }
        Ok(())
    }
}
