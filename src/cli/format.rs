//! Human-readable rendering of events and flow timelines.

use crate::model::{DeploymentEvent, FlowReport, InitiatedBy, Outcome};

/// One event as a single log-style line.
pub fn format_event(event: &DeploymentEvent) -> String {
    let from = event.from_version.as_deref().unwrap_or("-");
    let initiated = match event.initiated_by {
        InitiatedBy::Manual => "manual",
        InitiatedBy::AutoRollback => "auto-rollback",
    };
    let outcome = match &event.outcome {
        Outcome::Success => "ok".to_string(),
        Outcome::Failed { reason } => format!("FAILED: {reason}"),
    };
    format!(
        "{}  {}  {} -> {}  [{}]  {}",
        event.timestamp, event.service, from, event.to_version, initiated, outcome
    )
}

/// A flow report as an indented timeline plus a verdict line.
pub fn format_timeline(report: &FlowReport) -> String {
    let mut lines: Vec<String> = report
        .timeline
        .iter()
        .map(|r| format!("{}  [{}]  {}", r.at, r.state.name(), r.detail))
        .collect();
    lines.push(if report.passed {
        "PASSED".to_string()
    } else {
        "FAILED".to_string()
    });
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::Timestamp;
    use uuid::Uuid;

    use crate::model::{FlowState, StageRecord};

    #[test]
    fn format_event_shows_transition_and_outcome() {
        let event = DeploymentEvent {
            id: Uuid::new_v4(),
            service: "order-service".into(),
            from_version: Some("v1.0".into()),
            to_version: "v1.1-bad".into(),
            initiated_by: InitiatedBy::Manual,
            timestamp: Timestamp::UNIX_EPOCH,
            outcome: Outcome::Success,
        };

        let line = format_event(&event);
        assert!(line.contains("order-service"));
        assert!(line.contains("v1.0 -> v1.1-bad"));
        assert!(line.contains("[manual]"));
        assert!(line.ends_with("ok"));
    }

    #[test]
    fn format_event_surfaces_failure_reason() {
        let event = DeploymentEvent {
            id: Uuid::new_v4(),
            service: "order-service".into(),
            from_version: None,
            to_version: "v1.0".into(),
            initiated_by: InitiatedBy::AutoRollback,
            timestamp: Timestamp::UNIX_EPOCH,
            outcome: Outcome::Failed {
                reason: "health poll timed out".into(),
            },
        };

        let line = format_event(&event);
        assert!(line.contains("- -> v1.0"));
        assert!(line.contains("FAILED: health poll timed out"));
    }

    #[test]
    fn format_timeline_ends_with_verdict() {
        let report = FlowReport {
            passed: true,
            timeline: vec![StageRecord {
                state: FlowState::Idle,
                at: Timestamp::UNIX_EPOCH,
                detail: "starting".into(),
            }],
        };

        let text = format_timeline(&report);
        assert!(text.contains("[idle]  starting"));
        assert!(text.ends_with("PASSED"));
    }
}
