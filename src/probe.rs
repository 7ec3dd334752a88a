//! The health prober: synthetic requests against a live service.
//!
//! Collects raw latency samples; deciding health is the detector's job.
//! The `Probe` trait is the seam the executor and flow orchestrator talk
//! through, so tests can substitute scripted probes for real HTTP.

use std::time::{Duration, Instant};

use jiff::Timestamp;

use crate::model::{LatencySample, SampleSet, ServiceSpec};

/// Errors constructing a prober.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Samples a service's live latency and checks its health endpoint.
pub trait Probe {
    /// Issues up to `n` synthetic requests against the service endpoint.
    ///
    /// Must not block indefinitely: an overall deadline bounds the whole
    /// round, and partial results are returned with `partial = true`.
    fn sample(&self, service: &ServiceSpec, n: usize) -> SampleSet;

    /// One-shot check of the service's health endpoint.
    fn check_health(&self, service: &ServiceSpec) -> bool;
}

/// HTTP prober issuing sequential GETs with a per-request timeout.
#[derive(Clone)]
pub struct HttpProber {
    client: reqwest::blocking::Client,
    overall_timeout: Duration,
}

impl HttpProber {
    /// Builds a prober with the given per-request and per-round timeouts.
    pub fn new(request_timeout: Duration, overall_timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            overall_timeout,
        })
    }
}

impl Probe for HttpProber {
    fn sample(&self, service: &ServiceSpec, n: usize) -> SampleSet {
        let deadline = Instant::now() + self.overall_timeout;
        let mut samples = Vec::with_capacity(n);
        let mut partial = false;

        for _ in 0..n {
            if Instant::now() >= deadline {
                partial = true;
                break;
            }

            let start = Instant::now();
            let success = self
                .client
                .get(&service.endpoint)
                .send()
                .map(|r| r.status().is_success())
                .unwrap_or(false);

            samples.push(LatencySample {
                timestamp: Timestamp::now(),
                duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                success,
            });
        }

        SampleSet { samples, partial }
    }

    fn check_health(&self, service: &ServiceSpec) -> bool {
        self.client
            .get(service.health_url())
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
