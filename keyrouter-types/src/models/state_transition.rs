use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::api_key::KeyState;

/// An immutable audit record of a single `APIKey` state change.
///
/// Once constructed, a `StateTransition` is never mutated; `StateStore`
/// implementations append these as part of the persisted audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// Key this transition applies to.
    pub key_id: String,
    /// State before the transition.
    pub from_state: KeyState,
    /// State after the transition.
    pub to_state: KeyState,
    /// Why the transition occurred (e.g. `"rate_limited"`, `"manual_disable"`).
    pub reason: String,
    /// When the transition was recorded.
    pub occurred_at: DateTime<Utc>,
}

impl StateTransition {
    /// Construct a new transition record, stamping the current time.
    #[must_use]
    pub fn new(
        key_id: impl Into<String>,
        from_state: KeyState,
        to_state: KeyState,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            from_state,
            to_state,
            reason: reason.into(),
            occurred_at: Utc::now(),
        }
    }
}
