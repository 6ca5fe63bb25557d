//! Cost-minimizing routing strategy.
//!
//! Grounded on `domain/components/routing_strategies/cost_optimized.py`:
//! score by inverse estimated cost-per-request (min-max normalized so the
//! cheapest key scores `1.0`), drop only `Exhausted` keys, and apply the
//! same quota multipliers as every other strategy.

use std::collections::HashMap;

use keyrouter_types::{APIKey, CapacityState, CostEstimate, QuotaState};

use super::{ScoredKey, min_max_normalize};
use crate::routing::RoutingStrategy;

const DEFAULT_ESTIMATED_COST_PER_REQUEST: f64 = 0.01;

/// Cost used for `explanation` text: a key's own price override, or the flat
/// default. Has no adapter context (explanations are generated after scoring,
/// from `keys_by_id` alone), so it never sees the adapter-tier estimate.
fn estimated_cost(key: &APIKey) -> f64 {
    key.metadata
        .get("estimated_cost_per_request")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(DEFAULT_ESTIMATED_COST_PER_REQUEST)
}

/// Cost used for scoring: a key's own price override takes precedence (it
/// models negotiated per-key pricing), then the adapter's shared per-request
/// estimate for keys with no override, then the flat default.
fn scoring_cost(key: &APIKey, cost_estimate: Option<&CostEstimate>) -> f64 {
    key.metadata
        .get("estimated_cost_per_request")
        .and_then(serde_json::Value::as_f64)
        .or_else(|| cost_estimate.map(|c| c.amount))
        .unwrap_or(DEFAULT_ESTIMATED_COST_PER_REQUEST)
}

/// Prefers the cheapest eligible key per request.
pub struct CostOptimizedStrategy;

impl RoutingStrategy for CostOptimizedStrategy {
    fn objective_name(&self) -> &'static str {
        "cost"
    }

    fn score_keys(
        &self,
        keys: &[APIKey],
        _quota: &HashMap<String, QuotaState>,
        cost_estimate: Option<&CostEstimate>,
    ) -> Vec<ScoredKey> {
        // Raw score is the negative cost so that, after min-max
        // normalization, the cheapest key lands at 1.0.
        let mut scores: Vec<ScoredKey> = keys
            .iter()
            .map(|k| ScoredKey {
                key_id: k.id.clone(),
                score: -scoring_cost(k, cost_estimate),
            })
            .collect();
        min_max_normalize(&mut scores);
        scores
    }

    fn filter_by_quota_state(&self, keys: Vec<APIKey>, quota: &HashMap<String, QuotaState>) -> Vec<APIKey> {
        keys.into_iter()
            .filter(|k| {
                quota
                    .get(&k.id)
                    .is_none_or(|q| q.capacity_state != CapacityState::Exhausted)
            })
            .collect()
    }

    fn apply_quota_multipliers(
        &self,
        scores: Vec<ScoredKey>,
        quota: &HashMap<String, QuotaState>,
    ) -> Vec<ScoredKey> {
        scores
            .into_iter()
            .map(|mut s| {
                if let Some(q) = quota.get(&s.key_id) {
                    s.score = (s.score * q.capacity_state.score_multiplier()).clamp(0.0, 1.0);
                }
                s
            })
            .collect()
    }

    fn select_key(&self, scores: &[ScoredKey], _last_selected_key_id: Option<&str>) -> Option<String> {
        scores
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .map(|s| s.key_id.clone())
    }

    fn generate_explanation(
        &self,
        selected: &ScoredKey,
        all_scores: &[ScoredKey],
        keys_by_id: &HashMap<String, &APIKey>,
    ) -> String {
        let key = keys_by_id.get(&selected.key_id);
        let cost = key.map(|k| estimated_cost(k)).unwrap_or(DEFAULT_ESTIMATED_COST_PER_REQUEST);
        let cheapest_other = all_scores
            .iter()
            .filter(|s| s.key_id != selected.key_id)
            .filter_map(|s| keys_by_id.get(&s.key_id).map(|k| estimated_cost(k)))
            .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.min(c))));

        let mut explanation = format!(
            "Selected key {} at estimated cost ${cost:.4} per request",
            selected.key_id
        );
        if let Some(next) = cheapest_other {
            if next > cost {
                explanation.push_str(&format!(", saving ${:.4} versus next cheapest", next - cost));
            }
        }
        explanation.push_str(&format!(
            " ({} eligible key(s) considered)",
            all_scores.len()
        ));
        explanation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_with_cost(id: &str, cost: f64) -> APIKey {
        let mut map = HashMap::new();
        map.insert(
            "estimated_cost_per_request".to_string(),
            serde_json::json!(cost),
        );
        APIKey::new(id, "openai", "sk").unwrap().with_metadata(map)
    }

    #[test]
    fn cheapest_key_wins() {
        let strategy = CostOptimizedStrategy;
        let keys = vec![key_with_cost("expensive", 0.05), key_with_cost("cheap", 0.01)];
        let scores = strategy.score_keys(&keys, &HashMap::new(), None);
        let selected = strategy.select_key(&scores, None).unwrap();
        assert_eq!(selected, "cheap");
    }

    #[test]
    fn equal_costs_score_equally() {
        let strategy = CostOptimizedStrategy;
        let keys = vec![key_with_cost("a", 0.02), key_with_cost("b", 0.02)];
        let scores = strategy.score_keys(&keys, &HashMap::new(), None);
        assert!((scores[0].score - scores[1].score).abs() < 1e-9);
    }

    #[test]
    fn key_without_override_falls_back_to_adapter_estimate() {
        let strategy = CostOptimizedStrategy;
        let keys = vec![
            APIKey::new("adapter_priced", "openai", "sk").unwrap(),
            key_with_cost("flat_priced", 0.05),
        ];
        let adapter_estimate =
            CostEstimate::new(0.001, "USD", 0.85, keyrouter_types::EstimationMethod::Heuristic, 10, 10).unwrap();
        let scores = strategy.score_keys(&keys, &HashMap::new(), Some(&adapter_estimate));
        let selected = strategy.select_key(&scores, None).unwrap();
        assert_eq!(selected, "adapter_priced");
    }

    #[test]
    fn exhausted_keys_are_filtered() {
        let strategy = CostOptimizedStrategy;
        let keys = vec![key_with_cost("a", 0.01)];
        let mut quota = HashMap::new();
        quota.insert(
            "a".to_string(),
            QuotaState {
                key_id: "a".to_string(),
                capacity_state: CapacityState::Exhausted,
                used: 10,
                limit: 10,
                reset_in: std::time::Duration::from_secs(1),
            },
        );
        let filtered = strategy.filter_by_quota_state(keys, &quota);
        assert!(filtered.is_empty());
    }
}
