//! Core data model for rollout.
//!
//! These types describe the deployment control loop: services and their
//! version records, the audit trail of version transitions, latency probes
//! and verdicts, rollback requests, and the demo flow's state machine.

mod event;
mod flow;
mod probe;
mod rollback;
mod service;

pub use event::{DeploymentEvent, InitiatedBy, Outcome};
pub use flow::{FlowReport, FlowState, StageRecord};
pub use probe::{LatencySample, SampleSet, Thresholds, Verdict};
pub use rollback::{RollbackRequest, RollbackResult, RollbackStatus};
pub use service::{ServiceSpec, VersionRecord};
