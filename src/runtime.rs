//! Runtime control: swapping a service's running artifact.
//!
//! The `Runtime` trait is the seam between the deployment executor and the
//! container runtime. The production implementation drives `docker compose`;
//! tests substitute a fake that records restarts.

use std::path::PathBuf;
use std::process::Command;

/// Errors restarting a service's runtime artifact.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} failed: {stderr}")]
    Failed { command: String, stderr: String },
}

pub type Result<T> = core::result::Result<T, RuntimeError>;

/// Replaces the running instance of a service with a version's artifact.
pub trait Runtime {
    /// Restarts `service` running `version`. Blocks until the runtime
    /// accepts the swap or reports an error; readiness of the new instance
    /// is the executor's health poll, not this call.
    fn restart(&self, service: &str, version: &str) -> Result<()>;

    /// Whether the underlying runtime is reachable at all.
    fn available(&self) -> bool;
}

/// Runtime driving `docker compose up -d --no-deps <service>`.
///
/// The target version is injected as `<SERVICE>_VERSION` in the command's
/// environment, which the compose file resolves into the image tag.
pub struct ComposeRuntime {
    compose_file: PathBuf,
    env_file: Option<PathBuf>,
}

impl ComposeRuntime {
    pub fn new(compose_file: impl Into<PathBuf>, env_file: Option<PathBuf>) -> Self {
        Self {
            compose_file: compose_file.into(),
            env_file,
        }
    }
}

impl Runtime for ComposeRuntime {
    fn restart(&self, service: &str, version: &str) -> Result<()> {
        let mut command = Command::new("docker");
        command.arg("compose").arg("-f").arg(&self.compose_file);
        if let Some(env_file) = &self.env_file {
            command.arg("--env-file").arg(env_file);
        }
        command
            .args(["up", "-d", "--no-deps"])
            .arg(service)
            .env(version_env_var(service), version);

        let rendered = format!("docker compose up -d --no-deps {service}");
        let output = command.output().map_err(|source| RuntimeError::Spawn {
            command: rendered.clone(),
            source,
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(RuntimeError::Failed {
                command: rendered,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn available(&self) -> bool {
        Command::new("docker")
            .arg("info")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

/// Environment variable carrying a service's version.
///
/// Example: `order-service` → `ORDER_SERVICE_VERSION`.
fn version_env_var(service: &str) -> String {
    format!("{}_VERSION", service.to_uppercase().replace('-', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_env_var_maps_service_name() {
        assert_eq!(version_env_var("order-service"), "ORDER_SERVICE_VERSION");
        assert_eq!(version_env_var("payment"), "PAYMENT_VERSION");
    }
}
