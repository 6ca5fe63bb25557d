//! `Router`: the orchestrator tying key selection, policy, quota, cost, and
//! provider execution into a single call.
//!
//! Grounded on `Borsa::fetch_single_priority_with_fallback` and
//! `provider_call_with_timeout` (`core.rs`): attempt a priority-ordered
//! sequence of backends under a per-call timeout, classify failures,
//! exclude the failed backend, and retry the next one, aggregating errors
//! into `AllProvidersFailed`/`AllProvidersTimedOut` if every attempt is
//! exhausted. Generalized here from "iterate connectors" to "iterate
//! routing-engine-selected keys, re-scoring after each exclusion."

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use keyrouter_core::provider_adapter::ProviderAdapter;
use keyrouter_core::state_store::StateStore;
use keyrouter_types::{
    ErrorCategory, PolicyScope, PolicyType, QuotaState, RequestIntent, RouterConfig, RouterError,
    SystemResponse,
};

use crate::cost_controller::CostController;
use crate::key_manager::KeyManager;
use crate::policy_engine::{PolicyContext, PolicyEngine};
use crate::routing::RoutingEngine;
use keyrouter_middleware::QuotaAwarenessEngine;

/// Ties every component together behind a single `execute` entry point.
pub struct Router {
    config: RouterConfig,
    store: Arc<dyn StateStore>,
    key_manager: Arc<KeyManager>,
    cost_controller: Arc<CostController>,
    policy_engine: Arc<PolicyEngine>,
    routing_engine: RoutingEngine,
    quota_engine: Arc<QuotaAwarenessEngine>,
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    last_selected: Mutex<HashMap<String, String>>,
}

impl Router {
    #[must_use]
    pub(crate) fn new(
        config: RouterConfig,
        store: Arc<dyn StateStore>,
        adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
        quota_engine: Arc<QuotaAwarenessEngine>,
    ) -> Self {
        Self {
            key_manager: Arc::new(KeyManager::new(store.clone(), config.clone(), quota_engine.clone())),
            cost_controller: Arc::new(CostController::new(store.clone())),
            policy_engine: Arc::new(PolicyEngine::new(store.clone())),
            routing_engine: RoutingEngine::new(),
            quota_engine,
            adapters,
            last_selected: Mutex::new(HashMap::new()),
            store,
            config,
        }
    }

    /// The key lifecycle manager backing this router.
    #[must_use]
    pub fn key_manager(&self) -> &KeyManager {
        &self.key_manager
    }

    /// The budget controller backing this router.
    #[must_use]
    pub fn cost_controller(&self) -> &CostController {
        &self.cost_controller
    }

    /// The policy engine backing this router.
    #[must_use]
    pub fn policy_engine(&self) -> &PolicyEngine {
        &self.policy_engine
    }

    fn quota_snapshot(&self, key_ids: &[String]) -> HashMap<String, QuotaState> {
        key_ids
            .iter()
            .map(|id| (id.clone(), self.quota_engine.get_quota_state(id)))
            .collect()
    }

    /// Route and execute `intent` against `provider_id`, scoring eligible
    /// keys by `objective` (`"cost"`, `"fairness"`, or `"reliability"`).
    ///
    /// Implements `spec.md` §4.8: gather eligible keys, narrow them by
    /// `Routing`/`KeySelection` policies, gate on `CostControl` policy
    /// constraints and budget, select a key, execute with a per-call
    /// timeout, and on a retryable failure exclude that key and try the
    /// next-best one, up to `config.max_key_attempts` or the overall
    /// `request_timeout` deadline.
    ///
    /// # Errors
    /// Returns `RouterError::NoEligibleKeys` if no key survives eligibility
    /// and policy filtering, `RouterError::BudgetExceeded` if a `Hard`
    /// budget or `max_cost_per_request` policy constraint blocks the
    /// request, `RouterError::RequestTimeout` if the overall deadline
    /// elapses, or `RouterError::AllProvidersFailed`/`AllProvidersTimedOut`
    /// if every attempted key fails.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "keyrouter::router::execute", skip(self, intent), fields(provider_id, objective))
    )]
    pub async fn execute(
        &self,
        provider_id: &str,
        intent: &RequestIntent,
        objective: &str,
    ) -> Result<SystemResponse, RouterError> {
        let adapter = self.adapters.get(provider_id).cloned().ok_or_else(|| {
            RouterError::invalid_arg(format!("no adapter registered for provider '{provider_id}'"))
        })?;

        let mut remaining = self.key_manager.get_eligible_keys(provider_id).await?;
        self.apply_key_filtering_policies(&mut remaining).await?;
        if remaining.is_empty() {
            return Err(no_eligible_keys(provider_id));
        }

        let cost_estimate = adapter.estimate_cost(intent).await?;
        self.enforce_cost_control_policies(cost_estimate.amount)
            .await?;

        let deadline = self.config.request_timeout.map(|d| tokio::time::Instant::now() + d);
        let mut errors: Vec<RouterError> = Vec::new();
        let mut timeouts = 0usize;
        let mut attempts = 0usize;

        while attempts < self.config.max_key_attempts && !remaining.is_empty() {
            if let Some(dl) = deadline {
                if tokio::time::Instant::now() >= dl {
                    return Err(RouterError::RequestTimeout);
                }
            }

            let key_ids: Vec<String> = remaining.iter().map(|k| k.id.clone()).collect();
            let quota = self.quota_snapshot(&key_ids);
            let last = self.last_selected.lock().expect("mutex poisoned").get(provider_id).cloned();

            let decision = self.routing_engine.select_key(
                objective,
                provider_id,
                remaining.clone(),
                &quota,
                Some(&cost_estimate),
                last.as_deref(),
            )?;
            let selected_id = decision.selected_key_id.clone();

            let budget_check = self
                .cost_controller
                .check_budget(cost_estimate.amount, provider_id, &selected_id)
                .await?;
            if !budget_check.allowed {
                return Err(self.budget_exceeded_error(budget_check.budget_id).await?);
            }

            attempts += 1;
            match self.attempt(&*adapter, &selected_id, intent).await {
                Ok(response) => {
                    self.key_manager.record_success(&selected_id).await?;
                    self.quota_engine.record_usage(&selected_id, 1);
                    let actual_cost = response.cost.unwrap_or(cost_estimate.amount);
                    let reconciliation = self.cost_controller.reconcile(cost_estimate.amount, actual_cost);
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        key_id = %selected_id,
                        estimated_cost = reconciliation.estimated_cost,
                        actual_cost = reconciliation.actual_cost,
                        error_percentage = reconciliation.error_percentage,
                        "cost_reconciliation"
                    );
                    #[cfg(not(feature = "tracing"))]
                    let _ = &reconciliation;
                    if let Some(budget_id) = budget_check.budget_id {
                        self.cost_controller
                            .update_spending(&budget_id, actual_cost)
                            .await?;
                    }
                    self.last_selected
                        .lock()
                        .expect("mutex poisoned")
                        .insert(provider_id.to_string(), selected_id.clone());
                    self.store.record_decision(decision).await?;
                    return Ok(response);
                }
                Err(err) => {
                    let category = err.category().unwrap_or(ErrorCategory::Internal);
                    let retry_after_ms = retry_after_ms(&err);
                    self.key_manager
                        .record_failure(&selected_id, category, retry_after_ms)
                        .await?;
                    let fatal = matches!(category, ErrorCategory::InvalidRequest);
                    if matches!(category, ErrorCategory::Timeout) {
                        timeouts += 1;
                    }
                    errors.push(err);
                    remaining.retain(|k| k.id != selected_id);
                    if fatal {
                        break;
                    }
                }
            }
        }

        if !errors.is_empty() && timeouts == errors.len() {
            Err(RouterError::AllProvidersTimedOut)
        } else {
            Err(RouterError::AllProvidersFailed(errors))
        }
    }

    async fn attempt(
        &self,
        adapter: &dyn ProviderAdapter,
        key_id: &str,
        intent: &RequestIntent,
    ) -> Result<SystemResponse, RouterError> {
        let key_material = self.key_manager.get_key_material(key_id).await?;
        let request_id = uuid_like_id();
        let raw = provider_call_with_timeout(
            adapter.provider_id(),
            self.config.provider_timeout,
            adapter.execute_request(&key_material, intent),
        )
        .await?;
        adapter.normalize_response(raw, key_id, &request_id)
    }

    async fn apply_key_filtering_policies(
        &self,
        keys: &mut Vec<keyrouter_types::APIKey>,
    ) -> Result<(), RouterError> {
        let mut excluded: HashSet<String> = HashSet::new();
        for policy_type in [PolicyType::Routing, PolicyType::KeySelection] {
            let policies = self
                .policy_engine
                .get_applicable_policies(PolicyScope::Global, policy_type, None)
                .await?;
            for policy in &policies {
                let result = self
                    .policy_engine
                    .evaluate_policy(policy, &PolicyContext { eligible_keys: keys });
                excluded.extend(result.filtered_keys);
            }
        }
        keys.retain(|k| !excluded.contains(&k.id));
        Ok(())
    }

    async fn enforce_cost_control_policies(&self, estimated_cost: f64) -> Result<(), RouterError> {
        let policies = self
            .policy_engine
            .get_applicable_policies(PolicyScope::Global, PolicyType::CostControl, None)
            .await?;
        for policy in &policies {
            let result = self
                .policy_engine
                .evaluate_policy(policy, &PolicyContext { eligible_keys: &[] });
            if let Some(max_cost) = result.constraints.get("max_cost").and_then(serde_json::Value::as_f64) {
                if estimated_cost > max_cost {
                    return Err(RouterError::BudgetExceeded {
                        budget_id: policy.id.clone(),
                        spent: estimated_cost,
                        limit: max_cost,
                    });
                }
            }
        }
        Ok(())
    }

    async fn budget_exceeded_error(&self, budget_id: Option<String>) -> Result<RouterError, RouterError> {
        let (id, spent, limit) = match &budget_id {
            Some(id) => match self.cost_controller.get_budget(id).await? {
                Some(b) => (id.clone(), b.spent, b.limit),
                None => (id.clone(), 0.0, 0.0),
            },
            None => (String::new(), 0.0, 0.0),
        };
        Ok(RouterError::BudgetExceeded {
            budget_id: id,
            spent,
            limit,
        })
    }
}

fn retry_after_ms(err: &RouterError) -> Option<u64> {
    match err {
        RouterError::Provider { retry_after_ms, .. } => *retry_after_ms,
        RouterError::KeyThrottled { reset_in_ms, .. } => Some(*reset_in_ms),
        _ => None,
    }
}

fn no_eligible_keys(provider_id: &str) -> RouterError {
    RouterError::NoEligibleKeys {
        providers: vec![provider_id.to_string()],
    }
}

/// Wrap a provider future with a per-call timeout, mirroring the teacher's
/// `provider_call_with_timeout`.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(
        name = "keyrouter::router::provider_call_with_timeout",
        skip(fut),
        fields(provider_id, timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
    )
)]
async fn provider_call_with_timeout<T, Fut>(
    provider_id: &str,
    timeout: std::time::Duration,
    fut: Fut,
) -> Result<T, RouterError>
where
    Fut: std::future::Future<Output = Result<T, RouterError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or(Err(RouterError::ProviderTimeout {
            provider_id: provider_id.to_string(),
        }))
}

fn uuid_like_id() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyRouterBuilder;
    use keyrouter_mock::{InMemoryStateStore, MockProviderAdapter, TRIGGER_FAIL};
    use keyrouter_types::{Budget, BudgetScope, EnforcementMode, Message};
    use std::collections::HashMap as Map;

    fn intent(model: &str) -> RequestIntent {
        let msgs = vec![Message::new("user", "hi", None).unwrap()];
        RequestIntent::new(model, msgs, Map::new()).unwrap()
    }

    fn router_with(adapters: Vec<&str>) -> Router {
        unsafe {
            std::env::set_var("KEYROUTER_ENCRYPTION_KEY", "test-passphrase-for-router-tests");
        }
        let mut builder = KeyRouterBuilder::new().state_store(Arc::new(InMemoryStateStore::new()));
        for p in adapters {
            builder = builder.with_adapter(Arc::new(MockProviderAdapter::new(p)));
        }
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn routes_to_cheapest_eligible_key() {
        let router = router_with(vec!["openai"]);
        router
            .key_manager()
            .register_key("k1", "openai", "sk-1", Map::new())
            .await
            .unwrap();
        let mut cheap_meta = Map::new();
        cheap_meta.insert("estimated_cost_per_request".to_string(), serde_json::json!(0.001));
        router
            .key_manager()
            .register_key("k2", "openai", "sk-2", cheap_meta)
            .await
            .unwrap();

        let response = router.execute("openai", &intent("gpt-4"), "cost").await.unwrap();
        assert_eq!(response.key_used, "k2");
    }

    #[tokio::test]
    async fn fairness_rotates_among_equally_used_keys() {
        let router = router_with(vec!["openai"]);
        router
            .key_manager()
            .register_key("k1", "openai", "sk-1", Map::new())
            .await
            .unwrap();
        router
            .key_manager()
            .register_key("k2", "openai", "sk-2", Map::new())
            .await
            .unwrap();

        let first = router.execute("openai", &intent("gpt-4"), "fairness").await.unwrap();
        let second = router.execute("openai", &intent("gpt-4"), "fairness").await.unwrap();
        assert_ne!(first.key_used, second.key_used);
    }

    #[tokio::test]
    async fn failover_tries_every_eligible_key_before_giving_up() {
        let router = router_with(vec!["openai"]);
        router
            .key_manager()
            .register_key("k1", "openai", "sk-1", Map::new())
            .await
            .unwrap();
        router
            .key_manager()
            .register_key("k2", "openai", "sk-2", Map::new())
            .await
            .unwrap();

        // Every key hits the same forced-failure model, so the router must
        // exclude each in turn and ultimately exhaust both before failing.
        let response = router.execute("openai", &intent(TRIGGER_FAIL), "fairness").await;
        match response {
            Err(RouterError::AllProvidersFailed(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected AllProvidersFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hard_budget_blocks_request() {
        let router = router_with(vec!["openai"]);
        router
            .key_manager()
            .register_key("k1", "openai", "sk-1", Map::new())
            .await
            .unwrap();
        let budget = Budget::new("global", BudgetScope::Global, None, 0.0, EnforcementMode::Hard).unwrap();
        router.cost_controller().put_budget(budget).await.unwrap();

        let response = router.execute("openai", &intent("gpt-4"), "fairness").await;
        assert!(matches!(response, Err(RouterError::BudgetExceeded { .. })));
    }

    #[tokio::test]
    async fn soft_budget_allows_overage_through() {
        let router = router_with(vec!["openai"]);
        router
            .key_manager()
            .register_key("k1", "openai", "sk-1", Map::new())
            .await
            .unwrap();
        let budget = Budget::new("global", BudgetScope::Global, None, 0.0, EnforcementMode::Soft).unwrap();
        router.cost_controller().put_budget(budget).await.unwrap();

        let response = router.execute("openai", &intent("gpt-4"), "fairness").await;
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn rate_limited_key_is_excluded_from_next_routing_round() {
        let router = router_with(vec!["openai"]);
        router
            .key_manager()
            .register_key("k1", "openai", "sk-1", Map::new())
            .await
            .unwrap();
        router
            .key_manager()
            .record_failure("k1", ErrorCategory::RateLimit, Some(60_000))
            .await
            .unwrap();

        let response = router.execute("openai", &intent("gpt-4"), "fairness").await;
        assert!(matches!(response, Err(RouterError::NoEligibleKeys { .. })));
    }

    #[tokio::test]
    async fn unknown_objective_is_rejected() {
        let router = router_with(vec!["openai"]);
        router
            .key_manager()
            .register_key("k1", "openai", "sk-1", Map::new())
            .await
            .unwrap();
        let response = router.execute("openai", &intent("gpt-4"), "nonexistent").await;
        assert!(matches!(response, Err(RouterError::InvalidArg(_))));
    }

    #[tokio::test]
    async fn unregistered_provider_is_rejected() {
        let router = router_with(vec!["openai"]);
        let response = router.execute("anthropic", &intent("gpt-4"), "fairness").await;
        assert!(matches!(response, Err(RouterError::InvalidArg(_))));
    }

    #[test]
    fn builder_requires_state_store() {
        let err = KeyRouterBuilder::new()
            .with_adapter(Arc::new(MockProviderAdapter::new("openai")))
            .build()
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidArg(_)));
    }

    #[test]
    fn builder_requires_at_least_one_adapter() {
        let err = KeyRouterBuilder::new()
            .state_store(Arc::new(InMemoryStateStore::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidArg(_)));
    }
}
