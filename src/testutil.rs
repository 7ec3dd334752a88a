//! Shared test doubles: a runtime that records restarts and probes with
//! scripted answers.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jiff::Timestamp;

use crate::deploy::DeploySettings;
use crate::model::{LatencySample, SampleSet, ServiceSpec};
use crate::probe::Probe;
use crate::runtime::{Runtime, RuntimeError};

/// Runtime double that records restarts, can fail the first N calls, and
/// runs an optional hook on every call. The hook sees the service and
/// version being restarted, which lets a test play a concurrent writer or
/// park a restart mid-flight.
#[derive(Default)]
pub struct FakeRuntime {
    pub restarts: Mutex<Vec<(String, String)>>,
    pub fail_first: AtomicU32,
    pub on_restart: Option<Box<dyn Fn(&str, &str) + Send + Sync>>,
}

impl FakeRuntime {
    pub fn restart_count(&self) -> usize {
        self.restarts.lock().unwrap().len()
    }
}

impl Runtime for FakeRuntime {
    fn restart(&self, service: &str, version: &str) -> crate::runtime::Result<()> {
        if let Some(hook) = &self.on_restart {
            hook(service, version);
        }
        if self.fail_first.load(Ordering::SeqCst) > 0 {
            self.fail_first.fetch_sub(1, Ordering::SeqCst);
            return Err(RuntimeError::Failed {
                command: "fake restart".into(),
                stderr: "transient runtime error".into(),
            });
        }
        self.restarts
            .lock()
            .unwrap()
            .push((service.to_string(), version.to_string()));
        Ok(())
    }

    fn available(&self) -> bool {
        true
    }
}

/// Probe double with a switchable health answer and no samples.
pub struct FakeProbe {
    pub healthy: AtomicBool,
}

impl FakeProbe {
    pub fn healthy() -> Self {
        Self {
            healthy: AtomicBool::new(true),
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            healthy: AtomicBool::new(false),
        }
    }
}

impl Probe for FakeProbe {
    fn sample(&self, _service: &ServiceSpec, _n: usize) -> SampleSet {
        SampleSet {
            samples: Vec::new(),
            partial: false,
        }
    }

    fn check_health(&self, _service: &ServiceSpec) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

/// A runtime and probe pair sharing one "currently running version" cell:
/// the runtime writes it on restart, the probe's latency depends on it.
/// This is what lets the flow scenario play out without real containers.
pub struct ScriptedWorld {
    pub running: Arc<Mutex<String>>,
    pub slow_version: String,
    pub slow_latency_ms: u64,
    pub fast_latency_ms: u64,
}

impl ScriptedWorld {
    pub fn new(initial: &str, slow_version: &str) -> Arc<Self> {
        Arc::new(Self {
            running: Arc::new(Mutex::new(initial.to_string())),
            slow_version: slow_version.to_string(),
            slow_latency_ms: 2000,
            fast_latency_ms: 120,
        })
    }

    fn latency_ms(&self) -> u64 {
        if *self.running.lock().unwrap() == self.slow_version {
            self.slow_latency_ms
        } else {
            self.fast_latency_ms
        }
    }
}

/// Runtime half of a `ScriptedWorld`.
pub struct WorldRuntime(pub Arc<ScriptedWorld>);

impl Runtime for WorldRuntime {
    fn restart(&self, _service: &str, version: &str) -> crate::runtime::Result<()> {
        *self.0.running.lock().unwrap() = version.to_string();
        Ok(())
    }

    fn available(&self) -> bool {
        true
    }
}

/// Probe half of a `ScriptedWorld`.
pub struct WorldProbe(pub Arc<ScriptedWorld>);

impl Probe for WorldProbe {
    fn sample(&self, _service: &ServiceSpec, n: usize) -> SampleSet {
        let duration_ms = self.0.latency_ms();
        let samples = (0..n)
            .map(|_| LatencySample {
                timestamp: Timestamp::now(),
                duration_ms,
                success: true,
            })
            .collect();
        SampleSet {
            samples,
            partial: false,
        }
    }

    fn check_health(&self, _service: &ServiceSpec) -> bool {
        true
    }
}

/// Deploy settings with timeouts short enough for tests.
pub fn fast_settings() -> DeploySettings {
    DeploySettings {
        restart_attempts: 3,
        restart_backoff: Duration::from_millis(1),
        health_timeout: Duration::from_millis(40),
        health_interval: Duration::from_millis(5),
    }
}

/// The catalog entry used throughout the tests.
pub fn order_service() -> ServiceSpec {
    ServiceSpec {
        name: "order-service".into(),
        endpoint: "http://localhost:8080".into(),
        healthy_version: "v1.0".into(),
        versions: vec!["v1.0".into(), "v1.1-bad".into()],
    }
}
