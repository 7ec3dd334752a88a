//! Deployment events: the append-only audit trail of version transitions.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable log entry produced on every version transition.
///
/// Created by the deployment executor, appended to the audit log, never
/// mutated. Serialized as one line of JSONL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentEvent {
    pub id: Uuid,
    pub service: String,

    /// Version before the transition, if the store had a record.
    pub from_version: Option<String>,
    pub to_version: String,

    pub initiated_by: InitiatedBy,
    pub timestamp: Timestamp,
    pub outcome: Outcome,
}

/// Who asked for the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitiatedBy {
    /// An operator, via the CLI.
    Manual,

    /// The rollback controller, acting on a degradation alert.
    AutoRollback,
}

/// How the transition ended.
///
/// A failed outcome does not mean the version store was reverted: the
/// version intent stands, only the runtime side failed (see the executor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum Outcome {
    Success,
    Failed { reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_tagged() {
        let json = serde_json::to_string(&Outcome::Failed {
            reason: "health poll timed out".into(),
        })
        .unwrap();
        assert!(json.contains(r#""result":"failed""#));
        assert!(json.contains("health poll timed out"));
    }

    #[test]
    fn initiated_by_uses_kebab_case() {
        let json = serde_json::to_string(&InitiatedBy::AutoRollback).unwrap();
        assert_eq!(json, r#""auto-rollback""#);
    }
}
