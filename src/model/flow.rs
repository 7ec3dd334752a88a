//! Flow types: the demo state machine's states and timeline.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A state of the flow orchestrator's linear state machine.
///
/// Created per run, discarded after a verdict is produced. There are no
/// concurrent branches: every run walks these states in order and stops at
/// the first failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowState {
    Idle,
    Deploying,
    Monitoring,
    Degraded,
    RollingBack,
    Recovered,
    Failed,
}

impl FlowState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Deploying => "deploying",
            Self::Monitoring => "monitoring",
            Self::Degraded => "degraded",
            Self::RollingBack => "rolling-back",
            Self::Recovered => "recovered",
            Self::Failed => "failed",
        }
    }
}

/// One timestamped transition in a flow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub state: FlowState,
    pub at: Timestamp,
    pub detail: String,
}

/// The flow orchestrator's final verdict: pass/fail plus the ordered
/// timeline of every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowReport {
    pub passed: bool,
    pub timeline: Vec<StageRecord>,
}

impl FlowReport {
    /// The state the run ended in.
    pub fn final_state(&self) -> Option<FlowState> {
        self.timeline.last().map(|r| r.state)
    }
}
