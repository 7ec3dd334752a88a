//! The degradation detector: maps latency samples to a verdict.
//!
//! Pure decision function; the prober collects, this decides. An external
//! alert arriving over the webhook bypasses this entirely and converges on
//! the same `Verdict` type.

use crate::model::{LatencySample, SampleSet, Thresholds, Verdict};

/// Evaluates a probing round against the configured thresholds.
///
/// Degraded when the mean duration over successful samples is strictly
/// above the latency threshold, or the failure ratio over all samples is
/// strictly above the error threshold. A mean exactly equal to the
/// threshold is healthy.
///
/// A round with zero successful samples has no defined mean and is
/// degraded unconditionally.
pub fn evaluate(samples: &[LatencySample], thresholds: &Thresholds) -> Verdict {
    let set = SampleSet {
        samples: samples.to_vec(),
        partial: false,
    };

    let Some(mean) = set.mean_latency_ms() else {
        return Verdict::Degraded;
    };

    if mean > thresholds.latency_ms || set.failure_ratio() > thresholds.error_ratio {
        Verdict::Degraded
    } else {
        Verdict::Healthy
    }
}
