//! Rollback types: the webhook request and the structured result.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Input to the rollback controller, whether it arrives over the webhook
/// or from a direct call.
///
/// `alert_id` is the idempotency key: the same id must not trigger two
/// independent rollback executions, which guards against at-least-once
/// redelivery from the external alert source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub service: String,

    /// Version to roll back to. When omitted, the service's configured
    /// last-known-good version is used.
    pub target_version: Option<String>,

    pub alert_id: String,
    pub reason: String,
    pub triggered_at: Option<Timestamp>,
}

/// The controller's structured answer, also the webhook response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResult {
    pub status: RollbackStatus,
    pub service: String,
    pub previous_version: Option<String>,
    pub new_version: String,
    pub rollback_id: String,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Where a rollback stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RollbackStatus {
    Completed,
    Failed,

    /// The deploy is still running; the webhook handler answered within its
    /// SLA instead of holding the connection open for the full health-poll
    /// window. The final result lands in the idempotency cache, so a
    /// redelivered alert observes it.
    Pending,
}
