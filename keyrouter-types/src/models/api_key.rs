use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RouterError;

/// Lifecycle state of a managed API key.
///
/// See `spec.md` §4.3 for the full transition table; `KeyManager` in the
/// `keyrouter` crate is the only component permitted to drive transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum KeyState {
    /// Eligible for selection; no known constraint applies.
    Available,
    /// Temporarily rejected calls (e.g. rate limited); eligible again after `cooldown_until`.
    Throttled,
    /// Quota for the current window is exhausted; not eligible until reset.
    Exhausted,
    /// Returning from `Throttled`/`Exhausted`, under probation before `Available`.
    Recovering,
    /// Administratively disabled; never eligible until re-enabled.
    Disabled,
    /// Rejected by the provider as invalid (e.g. revoked); never eligible.
    Invalid,
}

/// A single managed credential and its routing-relevant lifecycle state.
///
/// `key_material` is never included in `Debug` output or serialized
/// representations handed to observability sinks; callers that need the
/// plaintext secret must go through `KeyManager::reveal`.
#[derive(Clone, Serialize, Deserialize)]
pub struct APIKey {
    /// Stable identifier for this key (not the secret material itself).
    pub id: String,
    /// Lowercased identifier of the provider this key authenticates against.
    pub provider_id: String,
    /// Encrypted-at-rest key material; see `keyrouter::encryption`.
    pub key_material: String,
    /// Current lifecycle state.
    pub state: KeyState,
    /// Count of requests that completed successfully through this key.
    pub usage_count: u64,
    /// Count of requests that failed through this key.
    pub failure_count: u64,
    /// Set only while `state == Throttled`; cleared on any other state.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Timestamp of the most recent successful use, if any.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Opaque embedder-supplied attributes (e.g. `estimated_cost_per_request`
    /// consulted by the cost routing strategy when no adapter-side estimate
    /// is available).
    pub metadata: HashMap<String, Value>,
}

impl std::fmt::Debug for APIKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("APIKey")
            .field("id", &self.id)
            .field("provider_id", &self.provider_id)
            .field("key_material", &"<redacted>")
            .field("state", &self.state)
            .field("usage_count", &self.usage_count)
            .field("failure_count", &self.failure_count)
            .field("cooldown_until", &self.cooldown_until)
            .field("last_used_at", &self.last_used_at)
            .field("created_at", &self.created_at)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl APIKey {
    /// Construct a new key in the `Available` state, validating identifier shape.
    ///
    /// # Errors
    /// Returns `RouterError::InvalidArg` if `id` is empty or exceeds 255
    /// characters, or if `provider_id` is empty or exceeds 100 characters.
    pub fn new(
        id: impl Into<String>,
        provider_id: impl Into<String>,
        key_material: impl Into<String>,
    ) -> Result<Self, RouterError> {
        let id = id.into().trim().to_string();
        if id.is_empty() || id.len() > 255 {
            return Err(RouterError::invalid_arg(
                "key id must be 1-255 characters",
            ));
        }
        let provider_id = provider_id.into().trim().to_lowercase();
        if provider_id.is_empty() || provider_id.len() > 100 {
            return Err(RouterError::invalid_arg(
                "provider_id must be 1-100 characters",
            ));
        }
        Ok(Self {
            id,
            provider_id,
            key_material: key_material.into(),
            state: KeyState::Available,
            usage_count: 0,
            failure_count: 0,
            cooldown_until: None,
            last_used_at: None,
            created_at: Utc::now(),
            metadata: HashMap::new(),
        })
    }

    /// Attach `metadata` to this key, replacing any previously set map.
    #[must_use]
    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Success rate over all recorded requests; `0.95` (neutral) if unused.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let total = self.usage_count + self.failure_count;
        if total == 0 {
            0.95
        } else {
            (self.usage_count as f64 / total as f64).clamp(0.0, 1.0)
        }
    }

    /// Whether this key is structurally eligible for selection, ignoring quota.
    ///
    /// `Throttled` keys remain ineligible until `cooldown_until` has passed;
    /// callers wanting opportunistic recovery should check `KeyManager`, which
    /// transitions expired `Throttled` keys back to `Available` on read.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        match self.state {
            KeyState::Available | KeyState::Recovering => true,
            KeyState::Throttled => self
                .cooldown_until
                .is_some_and(|until| Utc::now() >= until),
            KeyState::Exhausted | KeyState::Disabled | KeyState::Invalid => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_id() {
        assert!(APIKey::new("", "openai", "secret").is_err());
    }

    #[test]
    fn lowercases_provider_id() {
        let key = APIKey::new("k1", "OpenAI", "secret").unwrap();
        assert_eq!(key.provider_id, "openai");
    }

    #[test]
    fn debug_redacts_key_material() {
        let key = APIKey::new("k1", "openai", "sk-super-secret").unwrap();
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("sk-super-secret"));
    }

    #[test]
    fn neutral_success_rate_when_unused() {
        let key = APIKey::new("k1", "openai", "secret").unwrap();
        assert_eq!(key.success_rate(), 0.95);
    }
}
