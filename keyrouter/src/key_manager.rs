//! `KeyManager`: owns the key lifecycle state machine, encrypts/decrypts key
//! material, and records every transition.
//!
//! Grounded on the retry/failover bookkeeping the teacher's `Borsa` performs
//! implicitly inside `fetch_single_priority_with_fallback` (classify an
//! error, decide whether to keep going), generalized here into an explicit
//! per-key state machine since this workspace's keys (unlike the teacher's
//! stateless connectors) carry durable, auditable lifecycle state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use keyrouter_core::state_store::StateStore;
use keyrouter_middleware::{CooldownTracker, QuotaAwarenessEngine};
use keyrouter_types::{
    APIKey, CapacityState, ErrorCategory, KeyState, RouterConfig, RouterError, StateTransition,
};
use serde_json::Value;

use crate::encryption::Encryptor;

/// Why a transition occurred; recorded on every `StateTransition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Driven by the outcome of a provider request.
    Request,
    /// Driven by a classified provider/adapter error.
    Error,
    /// Driven by `PolicyEngine` evaluation.
    Policy,
    /// Driven by an explicit administrative call.
    Manual,
    /// Driven by background bookkeeping (e.g. opportunistic cooldown expiry).
    Automatic,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Error => "error",
            Self::Policy => "policy",
            Self::Manual => "manual",
            Self::Automatic => "automatic",
        }
    }
}

/// Owns key registration, encryption, lifecycle transitions, and eligibility.
pub struct KeyManager {
    store: Arc<dyn StateStore>,
    encryptor: Encryptor,
    cooldowns: CooldownTracker,
    quota_engine: Arc<QuotaAwarenessEngine>,
    config: RouterConfig,
}

impl KeyManager {
    /// Construct a `KeyManager` backed by `store`, encrypting key material
    /// per `config.encryption`, cooling down per `config.default_cooldown`,
    /// and consulting `quota_engine` to opportunistically recover
    /// `Exhausted`/`Recovering` keys whose quota window has reset.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, config: RouterConfig, quota_engine: Arc<QuotaAwarenessEngine>) -> Self {
        Self {
            encryptor: Encryptor::new(config.encryption.clone()),
            cooldowns: CooldownTracker::new(config.default_cooldown),
            quota_engine,
            store,
            config,
        }
    }

    /// Register a new key, encrypting `key_material` at rest.
    ///
    /// # Errors
    /// Returns `RouterError::InvalidArg` if the id/provider shape is
    /// invalid, `RouterError::Encryption` if encryption fails, or propagates
    /// a `RouterError::StateStore`-class failure from the backing store.
    pub async fn register_key(
        &self,
        id: impl Into<String>,
        provider_id: impl Into<String>,
        key_material: &str,
        metadata: HashMap<String, Value>,
    ) -> Result<APIKey, RouterError> {
        let encrypted = self.encryptor.encrypt(key_material)?;
        let key = APIKey::new(id, provider_id, encrypted)?.with_metadata(metadata);
        self.store.insert_key(key.clone()).await?;
        Ok(key)
    }

    /// Keys eligible for selection against `provider_id`: `Available`
    /// outright, plus `Throttled` keys whose cooldown has elapsed and
    /// `Exhausted`/`Recovering` keys whose quota window has moved on
    /// (both opportunistically transitioned on read, mirroring each other).
    pub async fn get_eligible_keys(&self, provider_id: &str) -> Result<Vec<APIKey>, RouterError> {
        let candidates = self.store.list_keys(Some(provider_id)).await?;
        let mut eligible = Vec::with_capacity(candidates.len());
        for key in candidates {
            if key.state == KeyState::Throttled && key.is_eligible() {
                let recovered = self.transition(
                    &key.id,
                    KeyState::Available,
                    Trigger::Automatic,
                    "cooldown expired",
                )
                .await?;
                eligible.push(recovered);
                continue;
            }
            if key.state == KeyState::Exhausted {
                let quota = self.quota_engine.get_quota_state(&key.id);
                if quota.capacity_state != CapacityState::Exhausted {
                    let recovered = self.transition(
                        &key.id,
                        KeyState::Recovering,
                        Trigger::Automatic,
                        "quota window reset",
                    )
                    .await?;
                    eligible.push(recovered);
                }
                continue;
            }
            if key.state == KeyState::Recovering {
                let quota = self.quota_engine.get_quota_state(&key.id);
                if matches!(quota.capacity_state, CapacityState::Exhausted | CapacityState::Recovering) {
                    eligible.push(key);
                } else {
                    let recovered = self.transition(
                        &key.id,
                        KeyState::Available,
                        Trigger::Automatic,
                        "quota probation cleared",
                    )
                    .await?;
                    eligible.push(recovered);
                }
                continue;
            }
            if key.is_eligible() {
                eligible.push(key);
            }
        }
        Ok(eligible)
    }

    /// Decrypt and return `key_id`'s plaintext key material.
    ///
    /// Emits a `key_access` trace event on both success and failure; the
    /// event never carries the material itself, only the key id and outcome.
    ///
    /// # Errors
    /// Returns `RouterError::NotFound` if the key does not exist, or
    /// `RouterError::Encryption` if decryption fails.
    pub async fn get_key_material(&self, key_id: &str) -> Result<String, RouterError> {
        let result = self.reveal(key_id).await;
        match &result {
            Ok(_) => {
                #[cfg(feature = "tracing")]
                tracing::info!(key_id, outcome = "success", "key_access");
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(key_id, outcome = "failure", error = %e, "key_access");
            }
        }
        result
    }

    async fn reveal(&self, key_id: &str) -> Result<String, RouterError> {
        let key = self
            .store
            .get_key(key_id)
            .await?
            .ok_or_else(|| RouterError::not_found(format!("key '{key_id}'")))?;
        self.encryptor.decrypt(&key.key_material)
    }

    /// Record a successful call through `key_id`: increments `usage_count`
    /// and stamps `last_used_at`.
    pub async fn record_success(&self, key_id: &str) -> Result<APIKey, RouterError> {
        self.store
            .update_key(
                key_id,
                Box::new(|mut key| {
                    key.usage_count += 1;
                    key.last_used_at = Some(Utc::now());
                    Ok(key)
                }),
            )
            .await
    }

    /// Apply the key-state effect of a classified failure (`spec.md` §7):
    /// mutate state and/or bump `failure_count` as the error category dictates.
    pub async fn record_failure(
        &self,
        key_id: &str,
        category: ErrorCategory,
        retry_after_ms: Option<u64>,
    ) -> Result<APIKey, RouterError> {
        match category {
            ErrorCategory::Authentication => {
                self.transition(key_id, KeyState::Invalid, Trigger::Error, "authentication_failed")
                    .await
            }
            ErrorCategory::RateLimit => {
                let cooldown_ms = self.cooldowns.start_cooldown(
                    key_id,
                    retry_after_ms.map(std::time::Duration::from_millis),
                );
                let until = Utc::now()
                    + chrono::Duration::milliseconds(i64::try_from(cooldown_ms).unwrap_or(i64::MAX));
                let key = self
                    .store
                    .update_key(
                        key_id,
                        Box::new(move |mut key| {
                            key.state = KeyState::Throttled;
                            key.cooldown_until = Some(until);
                            Ok(key)
                        }),
                    )
                    .await?;
                self.store
                    .record_transition(StateTransition::new(
                        key_id,
                        KeyState::Available,
                        KeyState::Throttled,
                        "rate_limited",
                    ))
                    .await?;
                Ok(key)
            }
            ErrorCategory::QuotaExceeded => {
                self.transition(key_id, KeyState::Exhausted, Trigger::Error, "quota_exceeded")
                    .await
            }
            ErrorCategory::ProviderUnavailable
            | ErrorCategory::Timeout
            | ErrorCategory::Internal => {
                self.store
                    .update_key(
                        key_id,
                        Box::new(|mut key| {
                            key.failure_count += 1;
                            Ok(key)
                        }),
                    )
                    .await
            }
            ErrorCategory::Authorization
            | ErrorCategory::InvalidRequest
            | ErrorCategory::BudgetExceeded => self
                .store
                .get_key(key_id)
                .await?
                .ok_or_else(|| RouterError::not_found(format!("key '{key_id}'"))),
        }
    }

    /// Transition `key_id` to `new_state`, recording a `StateTransition` with
    /// `reason`. Clears `cooldown_until` unless the destination is `Throttled`.
    ///
    /// # Errors
    /// Returns `RouterError::NotFound` if the key does not exist.
    pub async fn transition(
        &self,
        key_id: &str,
        new_state: KeyState,
        trigger: Trigger,
        reason: &str,
    ) -> Result<APIKey, RouterError> {
        let current = self
            .store
            .get_key(key_id)
            .await?
            .ok_or_else(|| RouterError::not_found(format!("key '{key_id}'")))?;
        let from_state = current.state;
        if new_state != KeyState::Throttled {
            self.cooldowns.clear(key_id);
        }
        let updated = self
            .store
            .update_key(
                key_id,
                Box::new(move |mut key| {
                    key.state = new_state;
                    if new_state != KeyState::Throttled {
                        key.cooldown_until = None;
                    }
                    Ok(key)
                }),
            )
            .await?;
        self.store
            .record_transition(StateTransition::new(
                key_id,
                from_state,
                new_state,
                format!("{}:{reason}", trigger.as_str()),
            ))
            .await?;
        Ok(updated)
    }

    /// Manually re-enable a `Disabled` or `Invalid` key back to `Available`.
    pub async fn enable_key(&self, key_id: &str) -> Result<APIKey, RouterError> {
        self.transition(key_id, KeyState::Available, Trigger::Manual, "manual_enable")
            .await
    }

    /// Manually disable a key, regardless of its current state.
    pub async fn disable_key(&self, key_id: &str) -> Result<APIKey, RouterError> {
        self.transition(key_id, KeyState::Disabled, Trigger::Manual, "manual_disable")
            .await
    }

    /// Default cooldown applied when a rate-limit error carries no provider hint.
    #[must_use]
    pub fn default_cooldown(&self) -> std::time::Duration {
        self.config.default_cooldown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyrouter_mock::InMemoryStateStore;

    fn manager() -> KeyManager {
        unsafe {
            std::env::set_var("KEYROUTER_ENCRYPTION_KEY", "test-passphrase-for-unit-tests");
        }
        let config = RouterConfig::default();
        let quota_engine = Arc::new(QuotaAwarenessEngine::new(config.default_quota.clone(), HashMap::new()));
        KeyManager::new(Arc::new(InMemoryStateStore::new()), config, quota_engine)
    }

    #[tokio::test]
    async fn register_then_eligible_returns_key() {
        let mgr = manager();
        mgr.register_key("k1", "openai", "sk-test", HashMap::new())
            .await
            .unwrap();
        let eligible = mgr.get_eligible_keys("openai").await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, "k1");
    }

    #[tokio::test]
    async fn reveal_round_trips_material() {
        let mgr = manager();
        mgr.register_key("k1", "openai", "sk-test-material", HashMap::new())
            .await
            .unwrap();
        let material = mgr.get_key_material("k1").await.unwrap();
        assert_eq!(material, "sk-test-material");
    }

    #[tokio::test]
    async fn rate_limit_throttles_and_excludes_from_eligibility() {
        let mgr = manager();
        mgr.register_key("k1", "openai", "sk-test", HashMap::new())
            .await
            .unwrap();
        mgr.record_failure("k1", ErrorCategory::RateLimit, Some(60_000))
            .await
            .unwrap();
        let eligible = mgr.get_eligible_keys("openai").await.unwrap();
        assert!(eligible.is_empty());
    }

    #[tokio::test]
    async fn authentication_failure_invalidates_key_permanently() {
        let mgr = manager();
        mgr.register_key("k1", "openai", "sk-test", HashMap::new())
            .await
            .unwrap();
        let key = mgr
            .record_failure("k1", ErrorCategory::Authentication, None)
            .await
            .unwrap();
        assert_eq!(key.state, KeyState::Invalid);
        let eligible = mgr.get_eligible_keys("openai").await.unwrap();
        assert!(eligible.is_empty());
    }

    #[tokio::test]
    async fn exhausted_key_recovers_once_quota_window_resets() {
        let config = RouterConfig::default();
        let quota_engine = Arc::new(QuotaAwarenessEngine::new(
            keyrouter_types::QuotaConfig {
                limit: 1,
                window: std::time::Duration::from_millis(1),
                strategy: keyrouter_types::QuotaConsumptionStrategy::Unit,
            },
            HashMap::new(),
        ));
        unsafe {
            std::env::set_var("KEYROUTER_ENCRYPTION_KEY", "test-passphrase-for-unit-tests");
        }
        let mgr = KeyManager::new(Arc::new(InMemoryStateStore::new()), config, quota_engine.clone());
        mgr.register_key("k1", "openai", "sk-test", HashMap::new())
            .await
            .unwrap();
        quota_engine.record_usage("k1", 1);
        mgr.record_failure("k1", ErrorCategory::QuotaExceeded, None)
            .await
            .unwrap();
        assert!(mgr.get_eligible_keys("openai").await.unwrap().is_empty());

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let eligible = mgr.get_eligible_keys("openai").await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].state, KeyState::Recovering);
    }

    #[tokio::test]
    async fn provider_error_increments_failure_count_without_state_change() {
        let mgr = manager();
        mgr.register_key("k1", "openai", "sk-test", HashMap::new())
            .await
            .unwrap();
        let key = mgr
            .record_failure("k1", ErrorCategory::ProviderUnavailable, None)
            .await
            .unwrap();
        assert_eq!(key.failure_count, 1);
        assert_eq!(key.state, KeyState::Available);
    }
}
