use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// What a `Policy` governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum PolicyType {
    /// Constrains which keys are eligible and in what order they are preferred.
    Routing,
    /// Constrains spend.
    CostControl,
    /// Constrains which keys/states are selectable.
    KeySelection,
    /// Constrains behavior on failure (not currently evaluated by `PolicyEngine`).
    FailureHandling,
}

/// Scope at which a `Policy` applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum PolicyScope {
    /// Applies globally.
    Global,
    /// Applies to a single provider.
    PerProvider,
    /// Applies to a single key.
    PerKey,
    /// Applies to a single logical route.
    PerRoute,
}

/// A declarative rule evaluated by `PolicyEngine::evaluate_policy`.
///
/// `rules` is a flat string-keyed map whose recognized keys depend on
/// `policy_type` (e.g. `max_cost`, `min_reliability`, `allowed_providers`,
/// `blocked_providers` for `Routing`; `budget_limit`, `max_cost_per_request`
/// for `CostControl`; `key_filters.allowed_states`, `key_filters.blocked_keys`
/// for `KeySelection`), matching `spec.md` §4.6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Stable identifier.
    pub id: String,
    /// Policy category, dispatches evaluation logic.
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    /// Scope the policy applies at.
    pub scope: PolicyScope,
    /// Identifier of the scoped entity; `None` for `Global`.
    pub scope_id: Option<String>,
    /// Whether the policy is currently active.
    pub enabled: bool,
    /// Higher-priority policies take precedence when conflicts arise
    /// (`resolve_policy_conflicts` sorts descending by this field).
    pub priority: i32,
    /// Declarative rule table.
    pub rules: HashMap<String, Value>,
}

/// Outcome of evaluating a single `Policy` against a routing context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyResult {
    /// Whether the request is permitted to continue.
    pub allowed: bool,
    /// Key IDs excluded by this policy.
    pub filtered_keys: Vec<String>,
    /// Constraints surfaced for downstream components (e.g. `max_cost`).
    pub constraints: HashMap<String, Value>,
    /// Human-readable summary of what this evaluation did.
    pub reason: String,
    /// IDs of the policies that contributed to this result.
    pub applied_policies: Vec<String>,
}
