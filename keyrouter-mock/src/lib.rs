//! keyrouter-mock
//!
//! An in-memory `StateStore` and a deterministic `ProviderAdapter` test
//! double, for unit and integration tests elsewhere in the workspace.
//! Grounded on the teacher's `borsa-mock::MockConnector`: same
//! `FAIL`/`TIMEOUT` trigger-symbol convention, here applied to a request's
//! model name instead of an instrument symbol.
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use keyrouter_core::provider_adapter::{
    Capability, DEFAULT_OUTPUT_TOKEN_ESTIMATE, ProviderAdapter, heuristic_output_tokens,
};
use keyrouter_core::state_store::StateStore;
use keyrouter_types::{
    APIKey, Budget, CostEstimate, EstimationMethod, HealthState, HealthStatus, Policy,
    RequestIntent, ResponseMetadata, RouterError, StateTransition, SystemResponse, TokenUsage,
};

/// A request whose `model` field is exactly this string triggers
/// `RouterError::Provider` from `MockProviderAdapter::execute_request`.
pub const TRIGGER_FAIL: &str = "FAIL";
/// A request whose `model` field is exactly this string sleeps briefly
/// before returning, to exercise timeout handling in callers.
pub const TRIGGER_TIMEOUT: &str = "TIMEOUT";

/// Flat per-token price used by both `estimate_cost` and `normalize_response`,
/// so callers exercising `CostController::reconcile` see a small, predictable
/// estimate-vs-actual delta (actual responses always report the same fixed
/// token count, while the estimate varies with `intent.max_tokens`).
const MOCK_COST_PER_TOKEN: f64 = 0.00001;

/// Deterministic `ProviderAdapter` test double.
///
/// Every call succeeds with a canned response unless `intent.model` matches
/// [`TRIGGER_FAIL`] or [`TRIGGER_TIMEOUT`].
pub struct MockProviderAdapter {
    provider_id: String,
    timeout_delay: Duration,
}

impl MockProviderAdapter {
    /// Construct a mock adapter identified as `provider_id`.
    #[must_use]
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            timeout_delay: Duration::from_millis(50),
        }
    }

    /// Override the artificial delay used for [`TRIGGER_TIMEOUT`] requests.
    #[must_use]
    pub const fn with_timeout_delay(mut self, delay: Duration) -> Self {
        self.timeout_delay = delay;
        self
    }
}

#[async_trait]
impl ProviderAdapter for MockProviderAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn execute_request(
        &self,
        _key_material: &str,
        intent: &RequestIntent,
    ) -> Result<serde_json::Value, RouterError> {
        match intent.model.as_str() {
            TRIGGER_FAIL => Err(self.map_error("forced failure", Some(500))),
            TRIGGER_TIMEOUT => {
                tokio::time::sleep(self.timeout_delay).await;
                Ok(serde_json::json!({"content": "delayed response"}))
            }
            _ => Ok(serde_json::json!({"content": "mock response"})),
        }
    }

    fn normalize_response(
        &self,
        raw: serde_json::Value,
        key_id: &str,
        request_id: &str,
    ) -> Result<SystemResponse, RouterError> {
        let content = raw
            .get("content")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let tokens_used = TokenUsage {
            input_tokens: 10,
            output_tokens: 10,
        };
        Ok(SystemResponse {
            content,
            metadata: ResponseMetadata {
                model_used: "mock-model".to_string(),
                tokens_used: Some(tokens_used),
                response_time_ms: 1,
                provider_id: self.provider_id.clone(),
                timestamp: Utc::now(),
                finish_reason: Some("stop".to_string()),
                request_id: Some(request_id.to_string()),
                correlation_id: None,
                additional_metadata: HashMap::new(),
            },
            cost: Some(MOCK_COST_PER_TOKEN * tokens_used.total_tokens() as f64),
            key_used: key_id.to_string(),
            request_id: request_id.to_string(),
        })
    }

    fn map_error(&self, raw_message: &str, status_code: Option<u16>) -> RouterError {
        RouterError::Provider {
            category: keyrouter_types::ErrorCategory::ProviderUnavailable,
            provider_id: self.provider_id.clone(),
            message: raw_message.to_string(),
            provider_code: status_code.map(|c| c.to_string()),
            retryable: true,
            retry_after_ms: None,
        }
    }

    fn get_capabilities(&self) -> Vec<Capability> {
        vec!["chat".to_string(), "completion".to_string()]
    }

    async fn estimate_cost(&self, intent: &RequestIntent) -> Result<CostEstimate, RouterError> {
        let input_tokens = 10;
        let output_tokens = heuristic_output_tokens(intent, DEFAULT_OUTPUT_TOKEN_ESTIMATE);
        let confidence = if intent.max_tokens().is_some() { 0.85 } else { 0.7 };
        let amount = MOCK_COST_PER_TOKEN * (input_tokens + output_tokens) as f64;
        CostEstimate::new(
            amount,
            "USD",
            confidence,
            EstimationMethod::Heuristic,
            input_tokens,
            output_tokens,
        )
    }

    async fn get_health(&self) -> HealthState {
        HealthState {
            status: HealthStatus::Healthy,
            last_check: Utc::now(),
            latency_ms: Some(1),
            details: None,
        }
    }
}

/// In-memory `StateStore`, suitable for tests and local development.
#[derive(Default)]
pub struct InMemoryStateStore {
    keys: Mutex<HashMap<String, APIKey>>,
    transitions: Mutex<Vec<StateTransition>>,
    budgets: Mutex<HashMap<String, Budget>>,
    policies: Mutex<HashMap<String, Policy>>,
    decisions: Mutex<Vec<keyrouter_types::RoutingDecision>>,
}

impl InMemoryStateStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get_key(&self, key_id: &str) -> Result<Option<APIKey>, RouterError> {
        Ok(self
            .keys
            .lock()
            .expect("mutex poisoned")
            .get(key_id)
            .cloned())
    }

    async fn list_keys(&self, provider_id: Option<&str>) -> Result<Vec<APIKey>, RouterError> {
        let keys = self.keys.lock().expect("mutex poisoned");
        Ok(keys
            .values()
            .filter(|k| provider_id.is_none_or(|p| k.provider_id == p))
            .cloned()
            .collect())
    }

    async fn insert_key(&self, key: APIKey) -> Result<(), RouterError> {
        let mut keys = self.keys.lock().expect("mutex poisoned");
        if keys.contains_key(&key.id) {
            return Err(RouterError::InvalidArg(format!(
                "key '{}' already exists",
                key.id
            )));
        }
        keys.insert(key.id.clone(), key);
        Ok(())
    }

    async fn update_key(
        &self,
        key_id: &str,
        f: keyrouter_core::state_store::KeyUpdateFn,
    ) -> Result<APIKey, RouterError> {
        let mut keys = self.keys.lock().expect("mutex poisoned");
        let current = keys
            .get(key_id)
            .cloned()
            .ok_or_else(|| RouterError::not_found(format!("key '{key_id}'")))?;
        let updated = f(current)?;
        keys.insert(key_id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn record_transition(&self, transition: StateTransition) -> Result<(), RouterError> {
        self.transitions
            .lock()
            .expect("mutex poisoned")
            .push(transition);
        Ok(())
    }

    async fn list_transitions(&self, key_id: &str) -> Result<Vec<StateTransition>, RouterError> {
        Ok(self
            .transitions
            .lock()
            .expect("mutex poisoned")
            .iter()
            .filter(|t| t.key_id == key_id)
            .cloned()
            .collect())
    }

    async fn get_budget(&self, budget_id: &str) -> Result<Option<Budget>, RouterError> {
        Ok(self
            .budgets
            .lock()
            .expect("mutex poisoned")
            .get(budget_id)
            .cloned())
    }

    async fn list_budgets(&self) -> Result<Vec<Budget>, RouterError> {
        Ok(self
            .budgets
            .lock()
            .expect("mutex poisoned")
            .values()
            .cloned()
            .collect())
    }

    async fn put_budget(&self, budget: Budget) -> Result<(), RouterError> {
        self.budgets
            .lock()
            .expect("mutex poisoned")
            .insert(budget.id.clone(), budget);
        Ok(())
    }

    async fn list_policies(&self, scope_id: Option<&str>) -> Result<Vec<Policy>, RouterError> {
        let policies = self.policies.lock().expect("mutex poisoned");
        Ok(policies
            .values()
            .filter(|p| scope_id.is_none_or(|s| p.scope_id.as_deref() == Some(s)))
            .cloned()
            .collect())
    }

    async fn put_policy(&self, policy: Policy) -> Result<(), RouterError> {
        self.policies
            .lock()
            .expect("mutex poisoned")
            .insert(policy.id.clone(), policy);
        Ok(())
    }

    async fn record_decision(
        &self,
        decision: keyrouter_types::RoutingDecision,
    ) -> Result<(), RouterError> {
        self.decisions.lock().expect("mutex poisoned").push(decision);
        Ok(())
    }

    async fn list_decisions(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<keyrouter_types::RoutingDecision>, RouterError> {
        let decisions = self.decisions.lock().expect("mutex poisoned");
        match limit {
            Some(n) if n < decisions.len() => {
                Ok(decisions[decisions.len() - n..].to_vec())
            }
            _ => Ok(decisions.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn test_key(id: &str) -> APIKey {
        APIKey::new(id, "openai", "sk-test-material").expect("valid key")
    }

    fn single_message_intent(model: &str) -> RequestIntent {
        let msgs = vec![keyrouter_types::Message::new("user", "hi", None).unwrap()];
        RequestIntent::new(model, msgs, Map::new()).unwrap()
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = InMemoryStateStore::new();
        store.insert_key(test_key("k1")).await.unwrap();
        let fetched = store.get_key("k1").await.unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = InMemoryStateStore::new();
        store.insert_key(test_key("k1")).await.unwrap();
        let err = store.insert_key(test_key("k1")).await.unwrap_err();
        assert!(matches!(err, RouterError::InvalidArg(_)));
    }

    #[tokio::test]
    async fn update_key_is_applied() {
        let store = InMemoryStateStore::new();
        store.insert_key(test_key("k1")).await.unwrap();
        let updated = store
            .update_key(
                "k1",
                Box::new(|mut k| {
                    k.state = keyrouter_types::KeyState::Disabled;
                    Ok(k)
                }),
            )
            .await
            .unwrap();
        assert_eq!(updated.state, keyrouter_types::KeyState::Disabled);
    }

    #[tokio::test]
    async fn mock_adapter_fails_on_trigger_model() {
        let adapter = MockProviderAdapter::new("openai");
        let intent = single_message_intent(TRIGGER_FAIL);
        let result = adapter.execute_request("key-material", &intent).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn mock_adapter_succeeds_on_ordinary_model() {
        let adapter = MockProviderAdapter::new("openai");
        let intent = single_message_intent("gpt-4");
        let result = adapter.execute_request("key-material", &intent).await;
        assert!(result.is_ok());
    }
}
