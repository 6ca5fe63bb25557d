//! Routing strategies and the engine that dispatches between them.
//!
//! No teacher analogue exists for scored multi-strategy key selection (the
//! teacher always fetches from every configured connector and races or
//! falls back by priority order); this module is grounded directly on the
//! original Python `domain/components/routing_strategies/` package instead,
//! one file per strategy, matching that package's own layout.

mod cost_optimized;
mod fairness;
mod reliability_optimized;

pub use cost_optimized::CostOptimizedStrategy;
pub use fairness::FairnessStrategy;
pub use reliability_optimized::ReliabilityOptimizedStrategy;

use std::collections::HashMap;

use keyrouter_types::{
    APIKey, AlternativeRoute, CostEstimate, QuotaState, RouterError, RoutingDecision, RoutingObjective,
};

/// A key's score under a particular strategy, prior to selection.
#[derive(Debug, Clone)]
pub struct ScoredKey {
    /// Key this score belongs to.
    pub key_id: String,
    /// Score in `0.0..=1.0` after normalization (approximately; strategies
    /// clamp but floating-point min-max normalization can land at the
    /// boundaries exactly).
    pub score: f64,
}

/// A pluggable objective a `RoutingEngine` can score eligible keys against.
///
/// Grounded on the original `RoutingStrategy` abstract base
/// (`domain/components/routing_strategies/base.py`-equivalent shape implied
/// by its three concrete subclasses): score, filter by quota, apply quota
/// multipliers, select, explain.
pub trait RoutingStrategy: Send + Sync {
    /// Name surfaced in `RoutingObjective::primary`.
    fn objective_name(&self) -> &'static str;

    /// Score every key in `keys`.
    ///
    /// `quota` is the same per-key snapshot `filter_by_quota_state` saw, made
    /// available here too since `Reliability` folds quota headroom directly
    /// into its composite score rather than only multiplying it in
    /// afterward. `cost_estimate` is the adapter's pre-execution estimate for
    /// the request being routed (`Router::execute` computes it once before
    /// scoring); `Cost` consults it as the shared per-request baseline a key
    /// without its own `metadata.estimated_cost_per_request` override falls
    /// back to.
    fn score_keys(
        &self,
        keys: &[APIKey],
        quota: &HashMap<String, QuotaState>,
        cost_estimate: Option<&CostEstimate>,
    ) -> Vec<ScoredKey>;

    /// Drop keys this strategy considers unusable given their quota state.
    fn filter_by_quota_state(&self, keys: Vec<APIKey>, quota: &HashMap<String, QuotaState>) -> Vec<APIKey>;

    /// Adjust `scores` by each key's quota headroom.
    fn apply_quota_multipliers(
        &self,
        scores: Vec<ScoredKey>,
        quota: &HashMap<String, QuotaState>,
    ) -> Vec<ScoredKey>;

    /// Pick a single key id from `scores`, given the previously selected key
    /// (used only by strategies implementing round-robin tie-breaking).
    fn select_key(&self, scores: &[ScoredKey], last_selected_key_id: Option<&str>) -> Option<String>;

    /// Build a human-readable explanation for why `selected` won.
    fn generate_explanation(
        &self,
        selected: &ScoredKey,
        all_scores: &[ScoredKey],
        keys_by_id: &HashMap<String, &APIKey>,
    ) -> String;
}

/// Dispatches eligible-key scoring/selection to a named `RoutingStrategy`
/// and packages the outcome as an auditable `RoutingDecision`.
///
/// Grounded on `spec.md` §4.7's six-step algorithm: filter by quota, score,
/// apply quota multipliers, select, explain, record alternatives.
pub struct RoutingEngine {
    strategies: HashMap<&'static str, Box<dyn RoutingStrategy>>,
}

impl Default for RoutingEngine {
    fn default() -> Self {
        let mut strategies: HashMap<&'static str, Box<dyn RoutingStrategy>> = HashMap::new();
        strategies.insert("cost", Box::new(CostOptimizedStrategy));
        strategies.insert("fairness", Box::new(FairnessStrategy));
        strategies.insert("reliability", Box::new(ReliabilityOptimizedStrategy));
        Self { strategies }
    }
}

impl RoutingEngine {
    /// Construct an engine with the three built-in strategies registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the strategy served under `objective_name`.
    pub fn register_strategy(&mut self, objective_name: &'static str, strategy: Box<dyn RoutingStrategy>) {
        self.strategies.insert(objective_name, strategy);
    }

    /// Select a key for `objective_name` among `eligible_keys`, given a
    /// snapshot of each key's `quota` state, the adapter's `cost_estimate`
    /// for the request being routed (consulted only by the `Cost`
    /// strategy), and the previously-selected key id (consulted only by
    /// strategies with tie-breaking memory).
    ///
    /// # Errors
    /// Returns `RouterError::InvalidArg` if `objective_name` is not a
    /// registered strategy, or `RouterError::NoEligibleKeys` if every key is
    /// filtered out by quota state or no key scores above zero.
    pub fn select_key(
        &self,
        objective_name: &str,
        provider_id: &str,
        eligible_keys: Vec<APIKey>,
        quota: &HashMap<String, QuotaState>,
        cost_estimate: Option<&CostEstimate>,
        last_selected_key_id: Option<&str>,
    ) -> Result<RoutingDecision, RouterError> {
        let strategy = self.strategies.get(objective_name).ok_or_else(|| {
            RouterError::invalid_arg(format!("unknown routing objective: {objective_name}"))
        })?;
        let no_eligible_keys = || RouterError::NoEligibleKeys {
            providers: vec![provider_id.to_string()],
        };

        let filtered = strategy.filter_by_quota_state(eligible_keys, quota);
        if filtered.is_empty() {
            return Err(no_eligible_keys());
        }
        let keys_by_id: HashMap<String, &APIKey> =
            filtered.iter().map(|k| (k.id.clone(), k)).collect();

        let scored = strategy.score_keys(&filtered, quota, cost_estimate);
        let scored = strategy.apply_quota_multipliers(scored, quota);

        let selected_id = strategy
            .select_key(&scored, last_selected_key_id)
            .ok_or_else(no_eligible_keys)?;
        let selected = scored
            .iter()
            .find(|s| s.key_id == selected_id)
            .expect("select_key returned a key not present in scores");

        let explanation = strategy.generate_explanation(selected, &scored, &keys_by_id);
        let alternatives = scored
            .iter()
            .filter(|s| s.key_id != selected_id)
            .map(|s| AlternativeRoute {
                key_id: s.key_id.clone(),
                score: s.score,
                reason: "not selected".to_string(),
            })
            .collect();

        let objective = RoutingObjective::new(strategy.objective_name(), None, 1.0, 0.0)?;
        RoutingDecision::new(selected_id, selected.score, objective, explanation, alternatives)
    }
}

pub(crate) fn min_max_normalize(scores: &mut [ScoredKey]) {
    if scores.is_empty() {
        return;
    }
    let min = scores.iter().map(|s| s.score).fold(f64::INFINITY, f64::min);
    let max = scores.iter().map(|s| s.score).fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        for s in scores.iter_mut() {
            s.score = 1.0;
        }
        return;
    }
    for s in scores.iter_mut() {
        s.score = (s.score - min) / (max - min);
    }
}

#[cfg(test)]
mod normalize_props {
    use super::*;
    use proptest::prelude::*;

    fn scored(raw: Vec<f64>) -> Vec<ScoredKey> {
        raw.into_iter()
            .enumerate()
            .map(|(i, score)| ScoredKey {
                key_id: format!("k{i}"),
                score,
            })
            .collect()
    }

    proptest! {
        #[test]
        fn min_max_normalize_lands_in_unit_range(raw in proptest::collection::vec(-1_000.0f64..1_000.0, 1..20)) {
            let mut scores = scored(raw);
            min_max_normalize(&mut scores);
            for s in &scores {
                prop_assert!((0.0..=1.0).contains(&s.score));
            }
        }

        #[test]
        fn min_max_normalize_preserves_relative_order(raw in proptest::collection::vec(-1_000.0f64..1_000.0, 2..20)) {
            let before = scored(raw);
            let mut after = before.clone();
            min_max_normalize(&mut after);
            for i in 0..before.len() {
                for j in 0..before.len() {
                    if before[i].score < before[j].score {
                        prop_assert!(after[i].score <= after[j].score);
                    }
                }
            }
        }
    }
}
