//! Service types: the deployable unit and its persisted version record.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A deployable unit known to the control loop.
///
/// Defined at configuration time and never deleted during a session.
/// `versions` doubles as the known-artifact registry: a deploy targeting a
/// version outside this list is rejected before anything is touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceSpec {
    /// Unique service name (e.g. `order-service`).
    pub name: String,

    /// Base URL for latency probing and health checks.
    pub endpoint: String,

    /// The designated last-known-good version, used as the rollback target
    /// when a request doesn't name one.
    pub healthy_version: String,

    /// Versions with a known artifact.
    pub versions: Vec<String>,
}

impl ServiceSpec {
    /// Whether an artifact is known for the given version.
    pub fn knows_version(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    /// URL of the service's health endpoint.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.endpoint.trim_end_matches('/'))
    }
}

/// The persisted state for one service: exactly one record at any time.
///
/// Mutated only through the version store's atomic `set`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    pub service: String,
    pub version: String,
    pub updated_at: Timestamp,
}
