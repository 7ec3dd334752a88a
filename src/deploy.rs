//! The deployment executor: transitions a service to a target version.
//!
//! A deploy walks five steps, each with its own failure policy:
//!
//! 1. Validate the service and version against the catalog — fatal, no
//!    side effects.
//! 2. Write the version store — fatal on error, nothing running changed.
//! 3. Restart the runtime artifact — the only retried step, since
//!    transient container runtime errors are expected. The store is
//!    re-read before every attempt to detect a racing writer; a moved
//!    record aborts the deploy instead of restarting onto a stale intent.
//! 4. Poll the health endpoint until healthy or timeout. A timeout marks
//!    the event failed but does NOT revert the store: the version intent
//!    and the runtime health are deliberately separate, so a "deployed but
//!    unhealthy" state stays observable.
//! 5. Append the event to the audit log, success or failed.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use jiff::Timestamp;
use uuid::Uuid;

use crate::model::{DeploymentEvent, InitiatedBy, Outcome, ServiceSpec};
use crate::probe::Probe;
use crate::runtime::Runtime;
use crate::store::{StoreError, VersionStore};

/// Errors that abort a deploy before any event is emitted.
///
/// Restart exhaustion and health timeouts are not here: those produce an
/// `Outcome::Failed` event instead, because the store transition stands.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("unknown version {version} for {service}")]
    UnknownVersion { service: String, version: String },

    #[error("version store: {0}")]
    Store(#[from] StoreError),

    #[error("conflicting write on {service}: intended {intended}, store now holds {found}")]
    Conflict {
        service: String,
        intended: String,
        found: String,
    },
}

pub type Result<T> = core::result::Result<T, DeployError>;

/// Tuning for the retry and health-poll loops.
#[derive(Debug, Clone)]
pub struct DeploySettings {
    /// Restart attempts before giving up (bounded retry for transient
    /// container runtime errors).
    pub restart_attempts: u32,

    /// Backoff before the first retry; doubles per attempt.
    pub restart_backoff: Duration,

    /// How long to poll the health endpoint before declaring the deploy
    /// failed.
    pub health_timeout: Duration,

    /// Delay between health polls.
    pub health_interval: Duration,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            restart_attempts: 3,
            restart_backoff: Duration::from_millis(250),
            health_timeout: Duration::from_secs(60),
            health_interval: Duration::from_millis(500),
        }
    }
}

/// Drives version transitions end to end.
pub struct Executor {
    catalog: Vec<ServiceSpec>,
    store: Arc<VersionStore>,
    runtime: Box<dyn Runtime + Send + Sync>,
    probe: Box<dyn Probe + Send + Sync>,
    settings: DeploySettings,
}

impl Executor {
    pub fn new(
        catalog: Vec<ServiceSpec>,
        store: Arc<VersionStore>,
        runtime: Box<dyn Runtime + Send + Sync>,
        probe: Box<dyn Probe + Send + Sync>,
        settings: DeploySettings,
    ) -> Self {
        Self {
            catalog,
            store,
            runtime,
            probe,
            settings,
        }
    }

    /// Looks up a configured service by name.
    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.catalog.iter().find(|s| s.name == name)
    }

    /// All configured services.
    pub fn catalog(&self) -> &[ServiceSpec] {
        &self.catalog
    }

    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    pub fn probe(&self) -> &(dyn Probe + Send + Sync) {
        self.probe.as_ref()
    }

    /// Whether the underlying runtime is reachable.
    pub fn runtime_available(&self) -> bool {
        self.runtime.available()
    }

    /// Deploys `version` to `service` and returns the emitted event.
    ///
    /// `Err` means the deploy aborted without touching running
    /// infrastructure; `Ok` with a failed outcome means the version intent
    /// was recorded but the runtime swap or health poll failed.
    pub fn deploy(
        &self,
        service: &str,
        version: &str,
        initiated_by: InitiatedBy,
    ) -> Result<DeploymentEvent> {
        let spec = self
            .service(service)
            .ok_or_else(|| DeployError::UnknownService(service.to_string()))?;
        if !spec.knows_version(version) {
            return Err(DeployError::UnknownVersion {
                service: service.to_string(),
                version: version.to_string(),
            });
        }

        let from_version = self.store.get(service)?.map(|r| r.version);
        self.store.set(service, version)?;
        tracing::info!(service, version, ?initiated_by, "version store updated");

        let outcome = match self.restart_with_retry(spec, version)? {
            Ok(()) => {
                if self.poll_healthy(spec) {
                    Outcome::Success
                } else {
                    Outcome::Failed {
                        reason: format!(
                            "health poll timed out after {:?}",
                            self.settings.health_timeout
                        ),
                    }
                }
            }
            Err(reason) => Outcome::Failed { reason },
        };

        let event = DeploymentEvent {
            id: Uuid::new_v4(),
            service: service.to_string(),
            from_version,
            to_version: version.to_string(),
            initiated_by,
            timestamp: Timestamp::now(),
            outcome,
        };
        self.store.append_event(&event)?;

        match &event.outcome {
            Outcome::Success => tracing::info!(service, version, "deploy succeeded"),
            Outcome::Failed { reason } => tracing::warn!(service, version, reason, "deploy failed"),
        }
        Ok(event)
    }

    /// Restarts the runtime artifact, retrying transient failures with a
    /// doubling backoff.
    ///
    /// The store record is re-read before every attempt: another writer may
    /// move it between our write and the swap, or while we wait out a
    /// backoff. A moved record aborts the deploy (outer `Err`, `Conflict`);
    /// exhausted attempts return the final restart error text (inner `Err`)
    /// so the caller can emit a failed event.
    fn restart_with_retry(
        &self,
        spec: &ServiceSpec,
        version: &str,
    ) -> Result<core::result::Result<(), String>> {
        let mut backoff = self.settings.restart_backoff;
        let attempts = self.settings.restart_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if let Some(current) = self.store.get(&spec.name)? {
                if current.version != version {
                    return Err(DeployError::Conflict {
                        service: spec.name.clone(),
                        intended: version.to_string(),
                        found: current.version,
                    });
                }
            }
            match self.runtime.restart(&spec.name, version) {
                Ok(()) => return Ok(Ok(())),
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        service = spec.name,
                        attempt,
                        error = %e,
                        "restart failed, retrying"
                    );
                    thread::sleep(backoff);
                    backoff *= 2;
                }
                Err(e) => {
                    return Ok(Err(format!("restart failed after {attempts} attempts: {e}")));
                }
            }
        }
    }

    /// Polls the health endpoint until it reports healthy or the timeout
    /// elapses.
    fn poll_healthy(&self, spec: &ServiceSpec) -> bool {
        let deadline = Instant::now() + self.settings.health_timeout;
        loop {
            if self.probe.check_health(spec) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.settings.health_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicU32;

    use tempfile::TempDir;

    use crate::testutil::{FakeProbe, FakeRuntime, fast_settings, order_service};

    fn executor(runtime: FakeRuntime, probe: FakeProbe) -> (TempDir, Executor) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(VersionStore::new(dir.path().join("state")).unwrap());
        let executor = Executor::new(
            vec![order_service()],
            store,
            Box::new(runtime),
            Box::new(probe),
            fast_settings(),
        );
        (dir, executor)
    }

    #[test]
    fn deploy_then_read_returns_deployed_version() {
        let (_dir, executor) = executor(FakeRuntime::default(), FakeProbe::healthy());

        let event = executor
            .deploy("order-service", "v1.0", InitiatedBy::Manual)
            .unwrap();

        assert!(event.outcome.is_success());
        let record = executor.store().get("order-service").unwrap().unwrap();
        assert_eq!(record.version, "v1.0");
    }

    #[test]
    fn deploy_unknown_service_is_fatal() {
        let (_dir, executor) = executor(FakeRuntime::default(), FakeProbe::healthy());

        let err = executor
            .deploy("ghost-service", "v1.0", InitiatedBy::Manual)
            .unwrap_err();

        assert!(matches!(err, DeployError::UnknownService(_)));
    }

    #[test]
    fn deploy_unknown_version_has_no_side_effects() {
        let (_dir, executor) = executor(FakeRuntime::default(), FakeProbe::healthy());

        let err = executor
            .deploy("order-service", "v9.9", InitiatedBy::Manual)
            .unwrap_err();

        assert!(matches!(err, DeployError::UnknownVersion { .. }));
        assert!(executor.store().get("order-service").unwrap().is_none());
        assert!(executor.store().load_events("order-service").unwrap().is_empty());
    }

    #[test]
    fn transient_restart_failures_are_retried() {
        let runtime = FakeRuntime {
            fail_first: AtomicU32::new(2),
            ..FakeRuntime::default()
        };
        let (_dir, executor) = executor(runtime, FakeProbe::healthy());

        let event = executor
            .deploy("order-service", "v1.0", InitiatedBy::Manual)
            .unwrap();

        assert!(event.outcome.is_success());
    }

    #[test]
    fn exhausted_restarts_emit_failed_event() {
        let runtime = FakeRuntime {
            fail_first: AtomicU32::new(10),
            ..FakeRuntime::default()
        };
        let (_dir, executor) = executor(runtime, FakeProbe::healthy());

        let event = executor
            .deploy("order-service", "v1.0", InitiatedBy::Manual)
            .unwrap();

        assert!(matches!(event.outcome, Outcome::Failed { .. }));
        // The event made it to the audit log.
        let events = executor.store().load_events("order-service").unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn racing_writer_during_restart_aborts_with_conflict() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(VersionStore::new(dir.path().join("state")).unwrap());
        // The first restart attempt fails; the hook plays a concurrent
        // writer moving the record before the retry re-reads it.
        let racer = Arc::clone(&store);
        let runtime = FakeRuntime {
            fail_first: AtomicU32::new(1),
            on_restart: Some(Box::new(move |service, _| {
                racer.set(service, "v1.0").unwrap();
            })),
            ..FakeRuntime::default()
        };
        let executor = Executor::new(
            vec![order_service()],
            Arc::clone(&store),
            Box::new(runtime),
            Box::new(FakeProbe::healthy()),
            fast_settings(),
        );

        let err = executor
            .deploy("order-service", "v1.1-bad", InitiatedBy::Manual)
            .unwrap_err();

        assert!(matches!(err, DeployError::Conflict { .. }));
        // Aborted: no event emitted, and the racing writer's record stands.
        assert!(store.load_events("order-service").unwrap().is_empty());
        assert_eq!(store.get("order-service").unwrap().unwrap().version, "v1.0");
    }

    #[test]
    fn health_timeout_keeps_store_on_target_version() {
        let (_dir, executor) = executor(FakeRuntime::default(), FakeProbe::unhealthy());

        let event = executor
            .deploy("order-service", "v1.1-bad", InitiatedBy::Manual)
            .unwrap();

        // Failed outcome, but the version intent stands: deployed-but-
        // unhealthy is distinct from not-yet-deployed.
        assert!(matches!(event.outcome, Outcome::Failed { .. }));
        let record = executor.store().get("order-service").unwrap().unwrap();
        assert_eq!(record.version, "v1.1-bad");
    }

    #[test]
    fn event_records_previous_version() {
        let (_dir, executor) = executor(FakeRuntime::default(), FakeProbe::healthy());

        executor
            .deploy("order-service", "v1.0", InitiatedBy::Manual)
            .unwrap();
        let event = executor
            .deploy("order-service", "v1.1-bad", InitiatedBy::Manual)
            .unwrap();

        assert_eq!(event.from_version.as_deref(), Some("v1.0"));
        assert_eq!(event.to_version, "v1.1-bad");
    }
}
