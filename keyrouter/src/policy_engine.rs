//! `PolicyEngine`: evaluates declarative policies that constrain routing.
//!
//! Grounded on the original Python `PolicyEngine` (`domain/components/policy_engine.py`):
//! same three rule dispatches (`Routing`, `CostControl`, `KeySelection`) and
//! the same recognized rule-key vocabulary, expressed here against a typed
//! `PolicyContext` instead of an untyped `dict[str, Any]`.

use std::collections::HashSet;
use std::sync::Arc;

use keyrouter_core::state_store::StateStore;
use keyrouter_types::{APIKey, Policy, PolicyResult, PolicyScope, PolicyType, RouterError};

/// Routing context a `Policy` is evaluated against.
pub struct PolicyContext<'a> {
    /// Keys under consideration before policy filtering.
    pub eligible_keys: &'a [APIKey],
}

/// Evaluates policies and resolves conflicts between them.
pub struct PolicyEngine {
    store: Arc<dyn StateStore>,
}

impl PolicyEngine {
    /// Construct a `PolicyEngine` backed by `store` for policy persistence.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Insert or replace a policy.
    pub async fn put_policy(&self, policy: Policy) -> Result<(), RouterError> {
        self.store.put_policy(policy).await
    }

    /// Policies applicable to `scope`/`policy_type`, optionally narrowed to a
    /// single `scope_id` (e.g. a specific provider or key), ordered by
    /// descending priority via `resolve_policy_conflicts`.
    pub async fn get_applicable_policies(
        &self,
        scope: PolicyScope,
        policy_type: PolicyType,
        scope_id: Option<&str>,
    ) -> Result<Vec<Policy>, RouterError> {
        let candidates = self.store.list_policies(scope_id).await?;
        let filtered: Vec<Policy> = candidates
            .into_iter()
            .filter(|p| p.scope == scope && p.policy_type == policy_type && p.enabled)
            .collect();
        Ok(self.resolve_policy_conflicts(filtered))
    }

    /// Evaluate `policy` against `context`.
    #[must_use]
    pub fn evaluate_policy(&self, policy: &Policy, context: &PolicyContext<'_>) -> PolicyResult {
        if !policy.enabled {
            return PolicyResult {
                allowed: true,
                reason: format!("Policy {} is disabled", policy.id),
                ..PolicyResult::default()
            };
        }
        match policy.policy_type {
            PolicyType::Routing => self.evaluate_routing_policy(policy, context),
            PolicyType::CostControl => Self::evaluate_cost_control_policy(policy),
            PolicyType::KeySelection => self.evaluate_key_selection_policy(policy, context),
            PolicyType::FailureHandling => PolicyResult {
                allowed: true,
                reason: format!(
                    "Policy {} type {:?} not yet evaluated",
                    policy.id, policy.policy_type
                ),
                applied_policies: vec![policy.id.clone()],
                ..PolicyResult::default()
            },
        }
    }

    fn evaluate_routing_policy(&self, policy: &Policy, context: &PolicyContext<'_>) -> PolicyResult {
        let mut filtered_keys: HashSet<String> = HashSet::new();
        let mut constraints = std::collections::HashMap::new();
        let mut reasons = Vec::new();

        if let Some(max_cost) = policy.rules.get("max_cost") {
            constraints.insert("max_cost".to_string(), max_cost.clone());
            reasons.push(format!("max_cost constraint: ${max_cost}"));
        }

        if let Some(min_reliability) = policy.rules.get("min_reliability").and_then(|v| v.as_f64()) {
            constraints.insert(
                "min_reliability".to_string(),
                serde_json::Value::from(min_reliability),
            );
            for key in context.eligible_keys {
                if key.success_rate() < min_reliability {
                    filtered_keys.insert(key.id.clone());
                    reasons.push(format!(
                        "Key {} below min_reliability {:.2}%",
                        key.id,
                        min_reliability * 100.0
                    ));
                }
            }
        }

        if let Some(allowed_providers) = policy
            .rules
            .get("allowed_providers")
            .and_then(|v| v.as_array())
        {
            let allowed: HashSet<&str> = allowed_providers.iter().filter_map(|v| v.as_str()).collect();
            for key in context.eligible_keys {
                if !allowed.contains(key.provider_id.as_str()) {
                    filtered_keys.insert(key.id.clone());
                    reasons.push(format!(
                        "Key {} provider {} not in allowed list",
                        key.id, key.provider_id
                    ));
                }
            }
        }

        if let Some(blocked_providers) = policy
            .rules
            .get("blocked_providers")
            .and_then(|v| v.as_array())
        {
            let blocked: HashSet<&str> = blocked_providers.iter().filter_map(|v| v.as_str()).collect();
            for key in context.eligible_keys {
                if blocked.contains(key.provider_id.as_str()) {
                    filtered_keys.insert(key.id.clone());
                    reasons.push(format!(
                        "Key {} provider {} is blocked",
                        key.id, key.provider_id
                    ));
                }
            }
        }

        let reason = if reasons.is_empty() {
            format!("Policy {} applied", policy.id)
        } else {
            reasons.join("; ")
        };
        PolicyResult {
            allowed: true,
            filtered_keys: filtered_keys.into_iter().collect(),
            constraints,
            reason,
            applied_policies: vec![policy.id.clone()],
        }
    }

    fn evaluate_cost_control_policy(policy: &Policy) -> PolicyResult {
        let mut constraints = std::collections::HashMap::new();
        let mut reasons = Vec::new();

        if let Some(budget_limit) = policy.rules.get("budget_limit") {
            constraints.insert("budget_limit".to_string(), budget_limit.clone());
            reasons.push(format!("Budget limit: ${budget_limit}"));
        }
        if let Some(max_cost) = policy.rules.get("max_cost_per_request") {
            constraints.insert("max_cost".to_string(), max_cost.clone());
            reasons.push(format!("Max cost per request: ${max_cost}"));
        }

        let reason = if reasons.is_empty() {
            format!("Policy {} applied", policy.id)
        } else {
            reasons.join("; ")
        };
        PolicyResult {
            allowed: true,
            constraints,
            reason,
            applied_policies: vec![policy.id.clone()],
            ..PolicyResult::default()
        }
    }

    fn evaluate_key_selection_policy(
        &self,
        policy: &Policy,
        context: &PolicyContext<'_>,
    ) -> PolicyResult {
        let mut filtered_keys: HashSet<String> = HashSet::new();
        let mut reasons = Vec::new();

        if let Some(key_filters) = policy.rules.get("key_filters").and_then(|v| v.as_object()) {
            if let Some(allowed_states) = key_filters.get("allowed_states").and_then(|v| v.as_array()) {
                let allowed: HashSet<&str> = allowed_states.iter().filter_map(|v| v.as_str()).collect();
                for key in context.eligible_keys {
                    let state_name = key_state_name(key.state);
                    if !allowed.contains(state_name) {
                        filtered_keys.insert(key.id.clone());
                        reasons.push(format!("Key {} state {state_name} not allowed", key.id));
                    }
                }
            }
            if let Some(blocked_keys) = key_filters.get("blocked_keys").and_then(|v| v.as_array()) {
                let blocked: HashSet<&str> = blocked_keys.iter().filter_map(|v| v.as_str()).collect();
                for key in context.eligible_keys {
                    if blocked.contains(key.id.as_str()) {
                        filtered_keys.insert(key.id.clone());
                        reasons.push(format!("Key {} is blocked", key.id));
                    }
                }
            }
        }

        let reason = if reasons.is_empty() {
            format!("Policy {} applied", policy.id)
        } else {
            reasons.join("; ")
        };
        PolicyResult {
            allowed: true,
            filtered_keys: filtered_keys.into_iter().collect(),
            reason,
            applied_policies: vec![policy.id.clone()],
            ..PolicyResult::default()
        }
    }

    /// Sort `policies` by descending `priority`; ties keep input order.
    #[must_use]
    pub fn resolve_policy_conflicts(&self, mut policies: Vec<Policy>) -> Vec<Policy> {
        policies.sort_by(|a, b| b.priority.cmp(&a.priority));
        policies
    }
}

fn key_state_name(state: keyrouter_types::KeyState) -> &'static str {
    use keyrouter_types::KeyState;
    match state {
        KeyState::Available => "available",
        KeyState::Throttled => "throttled",
        KeyState::Exhausted => "exhausted",
        KeyState::Recovering => "recovering",
        KeyState::Disabled => "disabled",
        KeyState::Invalid => "invalid",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyrouter_mock::InMemoryStateStore;
    use keyrouter_types::{APIKey, PolicyScope};
    use std::collections::HashMap;

    fn engine() -> PolicyEngine {
        PolicyEngine::new(Arc::new(InMemoryStateStore::new()))
    }

    fn routing_policy(rules: HashMap<String, serde_json::Value>) -> Policy {
        Policy {
            id: "p1".to_string(),
            policy_type: PolicyType::Routing,
            scope: PolicyScope::Global,
            scope_id: None,
            enabled: true,
            priority: 0,
            rules,
        }
    }

    #[test]
    fn min_reliability_filters_low_success_rate_keys() {
        let engine_ = engine();
        let mut good = APIKey::new("good", "openai", "sk").unwrap();
        good.usage_count = 95;
        good.failure_count = 5;
        let mut bad = APIKey::new("bad", "openai", "sk").unwrap();
        bad.usage_count = 10;
        bad.failure_count = 90;
        let keys = vec![good, bad];

        let mut rules = HashMap::new();
        rules.insert("min_reliability".to_string(), serde_json::json!(0.8));
        let policy = routing_policy(rules);

        let result = engine_.evaluate_policy(&policy, &PolicyContext { eligible_keys: &keys });
        assert_eq!(result.filtered_keys, vec!["bad".to_string()]);
    }

    #[test]
    fn zero_history_key_uses_neutral_success_rate() {
        let engine_ = engine();
        let fresh = APIKey::new("fresh", "openai", "sk").unwrap();
        let keys = vec![fresh];

        let mut rules = HashMap::new();
        rules.insert("min_reliability".to_string(), serde_json::json!(0.99));
        let policy = routing_policy(rules);

        let result = engine_.evaluate_policy(&policy, &PolicyContext { eligible_keys: &keys });
        assert_eq!(result.filtered_keys, vec!["fresh".to_string()]);
    }

    #[test]
    fn disabled_policy_allows_everything() {
        let engine_ = engine();
        let mut policy = routing_policy(HashMap::new());
        policy.enabled = false;
        let keys = vec![APIKey::new("k1", "openai", "sk").unwrap()];
        let result = engine_.evaluate_policy(&policy, &PolicyContext { eligible_keys: &keys });
        assert!(result.allowed);
        assert!(result.filtered_keys.is_empty());
    }

    #[test]
    fn conflicts_resolve_by_descending_priority() {
        let engine_ = engine();
        let mut low = routing_policy(HashMap::new());
        low.id = "low".to_string();
        low.priority = 1;
        let mut high = routing_policy(HashMap::new());
        high.id = "high".to_string();
        high.priority = 10;

        let resolved = engine_.resolve_policy_conflicts(vec![low, high]);
        assert_eq!(resolved[0].id, "high");
    }
}
