//! Probe types: latency samples, sample sets, thresholds, and verdicts.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// One synthetic request's result, as recorded by the health prober.
///
/// Ephemeral: held only in the rolling window used for the current
/// evaluation, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySample {
    pub timestamp: Timestamp,
    pub duration_ms: u64,
    pub success: bool,
}

/// The samples from one probing round.
#[derive(Debug, Clone)]
pub struct SampleSet {
    pub samples: Vec<LatencySample>,

    /// True when the round's overall deadline cut sampling short of the
    /// requested count. Partial results are returned, not discarded.
    pub partial: bool,
}

impl SampleSet {
    /// Arithmetic mean duration over successful samples.
    ///
    /// `None` when no sample succeeded; the detector treats that as
    /// degraded rather than dividing by zero.
    pub fn mean_latency_ms(&self) -> Option<f64> {
        let successes: Vec<u64> = self
            .samples
            .iter()
            .filter(|s| s.success)
            .map(|s| s.duration_ms)
            .collect();
        if successes.is_empty() {
            return None;
        }
        let sum: u64 = successes.iter().sum();
        Some(sum as f64 / successes.len() as f64)
    }

    /// Ratio of failed samples over all samples. Zero for an empty set.
    pub fn failure_ratio(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let failed = self.samples.iter().filter(|s| !s.success).count();
        failed as f64 / self.samples.len() as f64
    }
}

/// Degradation thresholds. Configuration, not hardcoded, so the same
/// detector serves latency-defect and error-rate-defect scenarios.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Thresholds {
    /// Mean latency strictly above this is degraded.
    pub latency_ms: f64,

    /// Failure ratio strictly above this is degraded.
    pub error_ratio: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            latency_ms: 1500.0,
            error_ratio: 0.5,
        }
    }
}

/// The detector's decision. External alert delivery converges on the same
/// type, so the rollback controller is agnostic to the detection source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Healthy,
    Degraded,
}
