use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse health classification returned by `ProviderAdapter::get_health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum HealthStatus {
    /// Provider is responding normally.
    Healthy,
    /// Provider is responding but with elevated latency or partial failures.
    Degraded,
    /// Provider is not responding.
    Down,
}

/// A TTL-cached health snapshot for a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthState {
    /// Current health classification.
    pub status: HealthStatus,
    /// When this snapshot was taken.
    pub last_check: DateTime<Utc>,
    /// Observed round-trip latency of the health check, if measured.
    pub latency_ms: Option<u64>,
    /// Free-form details (e.g. error message on `Down`).
    pub details: Option<String>,
}
