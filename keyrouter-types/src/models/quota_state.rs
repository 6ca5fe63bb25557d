use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Coarse-grained view of how much headroom remains in a key's quota window.
///
/// Thresholds (fraction of `limit` remaining): `Abundant` > 0.5,
/// `Constrained` > 0.2, `Critical` > 0, `Exhausted` == 0. `Recovering` is a
/// transient state set by `QuotaAwarenessEngine` immediately after a window
/// reset, before any usage has been observed in the new window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum CapacityState {
    /// More than half the window's budget remains.
    Abundant,
    /// Between 20% and 50% of the window's budget remains.
    Constrained,
    /// Budget remains but is below 20%.
    Critical,
    /// No budget remains in the current window.
    Exhausted,
    /// Window has just reset; usage has not yet been recorded.
    Recovering,
}

impl CapacityState {
    /// Classify a remaining/limit ratio into a `CapacityState`.
    #[must_use]
    pub fn from_ratio(remaining: u64, limit: u64) -> Self {
        if limit == 0 || remaining == 0 {
            return Self::Exhausted;
        }
        let ratio = remaining as f64 / limit as f64;
        if ratio > 0.5 {
            Self::Abundant
        } else if ratio > 0.2 {
            Self::Constrained
        } else {
            Self::Critical
        }
    }

    /// The routing-score multiplier `RoutingEngine::apply_quota_multipliers`
    /// applies for this state (`spec.md` §4.7).
    #[must_use]
    pub fn score_multiplier(self) -> f64 {
        match self {
            Self::Abundant => 1.20,
            Self::Constrained => 0.85,
            Self::Critical => 0.70,
            Self::Recovering => 0.95,
            Self::Exhausted => 0.0,
        }
    }
}

/// Point-in-time snapshot of a key's quota window, as reported by
/// `QuotaAwarenessEngine::get_quota_state`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaState {
    /// Key this snapshot describes.
    pub key_id: String,
    /// Coarse capacity classification.
    pub capacity_state: CapacityState,
    /// Units consumed within the current window.
    pub used: u64,
    /// Configured maximum units per window.
    pub limit: u64,
    /// Time remaining until the current window resets.
    pub reset_in: Duration,
}

impl QuotaState {
    /// Units remaining in the current window.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_thresholds() {
        assert_eq!(CapacityState::from_ratio(100, 100), CapacityState::Abundant);
        assert_eq!(CapacityState::from_ratio(30, 100), CapacityState::Constrained);
        assert_eq!(CapacityState::from_ratio(10, 100), CapacityState::Critical);
        assert_eq!(CapacityState::from_ratio(0, 100), CapacityState::Exhausted);
    }
}
