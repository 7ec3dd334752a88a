//! The flow orchestrator: a scripted degrade-and-recover exercise.
//!
//! Deploys a known-bad version on purpose, watches the degradation detector
//! catch it, rolls back through the same controller the webhook uses, and
//! confirms recovery. One run is a linear walk through `FlowState`; the
//! returned `FlowReport` carries the timestamped timeline and a pass/fail
//! verdict, which makes it usable both as a demo and as a smoke test of the
//! whole pipeline against a live environment.

use std::thread;
use std::time::Duration;

use jiff::Timestamp;
use uuid::Uuid;

use crate::deploy::Executor;
use crate::detect;
use crate::model::{
    FlowReport, FlowState, InitiatedBy, Outcome, RollbackRequest, RollbackStatus, StageRecord,
    Thresholds, Verdict,
};
use crate::rollback::Controller;

/// Tuning for the monitoring loop.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    /// Latency samples collected per monitoring round.
    pub samples_per_round: usize,

    /// Monitoring rounds before the run is declared failed for never
    /// observing degradation.
    pub max_rounds: u32,

    /// Delay between monitoring rounds.
    pub round_delay: Duration,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            samples_per_round: 5,
            max_rounds: 10,
            round_delay: Duration::from_secs(2),
        }
    }
}

/// Drives one degrade-and-recover run.
pub struct Orchestrator<'a> {
    executor: &'a Executor,
    controller: &'a Controller,
    thresholds: Thresholds,
    settings: FlowSettings,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        executor: &'a Executor,
        controller: &'a Controller,
        thresholds: Thresholds,
        settings: FlowSettings,
    ) -> Self {
        Self {
            executor,
            controller,
            thresholds,
            settings,
        }
    }

    /// Runs the full exercise: deploy `bad_version` to `service`, wait for
    /// the detector to flag it, roll back, confirm recovery.
    pub fn run(&self, service: &str, bad_version: &str) -> FlowReport {
        let mut timeline = Vec::new();
        record(
            &mut timeline,
            FlowState::Idle,
            format!("starting degrade-and-recover run against {service}"),
        );

        // Deploy the bad version. A failed deploy means the exercise never
        // reached the part it is meant to test.
        record(
            &mut timeline,
            FlowState::Deploying,
            format!("deploying {bad_version}"),
        );
        match self.executor.deploy(service, bad_version, InitiatedBy::Manual) {
            Ok(event) => {
                if let Outcome::Failed { reason } = event.outcome {
                    record(
                        &mut timeline,
                        FlowState::Failed,
                        format!("deploy of {bad_version} failed: {reason}"),
                    );
                    return FlowReport {
                        passed: false,
                        timeline,
                    };
                }
            }
            Err(e) => {
                record(&mut timeline, FlowState::Failed, format!("deploy aborted: {e}"));
                return FlowReport {
                    passed: false,
                    timeline,
                };
            }
        }

        // Monitor until the detector flags the service or the round budget
        // runs out.
        record(
            &mut timeline,
            FlowState::Monitoring,
            format!(
                "sampling {} requests per round, up to {} rounds",
                self.settings.samples_per_round, self.settings.max_rounds
            ),
        );
        let Some(spec) = self.executor.service(service) else {
            record(
                &mut timeline,
                FlowState::Failed,
                format!("unknown service: {service}"),
            );
            return FlowReport {
                passed: false,
                timeline,
            };
        };

        let mut degraded_detail = None;
        for round in 1..=self.settings.max_rounds {
            let set = self
                .executor
                .probe()
                .sample(spec, self.settings.samples_per_round);
            let verdict = detect::evaluate(&set.samples, &self.thresholds);
            tracing::info!(
                service,
                round,
                ?verdict,
                mean_latency_ms = set.mean_latency_ms(),
                failure_ratio = set.failure_ratio(),
                "monitoring round"
            );
            if verdict == Verdict::Degraded {
                degraded_detail = Some(format!(
                    "round {round}: mean latency {}, failure ratio {:.2}",
                    set.mean_latency_ms()
                        .map_or_else(|| "n/a".to_string(), |m| format!("{m:.0}ms")),
                    set.failure_ratio()
                ));
                break;
            }
            if round < self.settings.max_rounds {
                thread::sleep(self.settings.round_delay);
            }
        }

        let Some(detail) = degraded_detail else {
            record(
                &mut timeline,
                FlowState::Failed,
                format!(
                    "degradation not observed within {} rounds",
                    self.settings.max_rounds
                ),
            );
            return FlowReport {
                passed: false,
                timeline,
            };
        };
        record(&mut timeline, FlowState::Degraded, detail);

        // Roll back through the controller, same path as the webhook.
        record(
            &mut timeline,
            FlowState::RollingBack,
            format!("rolling back to {}", spec.healthy_version),
        );
        let request = RollbackRequest {
            service: service.to_string(),
            target_version: None,
            alert_id: format!("flow-{}", Uuid::new_v4()),
            reason: "degradation detected during flow run".to_string(),
            triggered_at: Some(Timestamp::now()),
        };
        let result = self.controller.rollback(&request);
        if result.status != RollbackStatus::Completed {
            record(
                &mut timeline,
                FlowState::Failed,
                format!(
                    "rollback {} failed: {}",
                    result.rollback_id,
                    result.error.unwrap_or_else(|| "unknown error".to_string())
                ),
            );
            return FlowReport {
                passed: false,
                timeline,
            };
        }

        // Confirm recovery with one more sampling round.
        let set = self
            .executor
            .probe()
            .sample(spec, self.settings.samples_per_round);
        let verdict = detect::evaluate(&set.samples, &self.thresholds);
        if verdict == Verdict::Healthy {
            record(
                &mut timeline,
                FlowState::Recovered,
                format!(
                    "{} healthy on {} ({})",
                    service, result.new_version, result.rollback_id
                ),
            );
            FlowReport {
                passed: true,
                timeline,
            }
        } else {
            record(
                &mut timeline,
                FlowState::Failed,
                format!("still degraded after rollback to {}", result.new_version),
            );
            FlowReport {
                passed: false,
                timeline,
            }
        }
    }
}

fn record(timeline: &mut Vec<StageRecord>, state: FlowState, detail: String) {
    tracing::info!(state = state.name(), detail, "flow transition");
    timeline.push(StageRecord {
        state,
        at: Timestamp::now(),
        detail,
    });
}
