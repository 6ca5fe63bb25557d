//! Load-balancing (fairness) routing strategy.
//!
//! Grounded on `domain/components/routing_strategies/fairness.py`: score by
//! inverse relative usage (min-max normalized; all-equal usage scores
//! everyone `1.0`, enabling plain round robin), filter out only `Exhausted`
//! keys ("fairness should still consider throttled/constrained keys to
//! prevent starvation"), and break ties by rotating past the previously
//! selected key.

use std::collections::HashMap;

use keyrouter_types::{APIKey, CapacityState, CostEstimate, QuotaState};

use super::{ScoredKey, min_max_normalize};
use crate::routing::RoutingStrategy;

fn relative_usage(key: &APIKey, total_usage: u64) -> f64 {
    if total_usage == 0 {
        0.0
    } else {
        key.usage_count as f64 / total_usage as f64
    }
}

/// Distributes load evenly across eligible keys.
pub struct FairnessStrategy;

impl RoutingStrategy for FairnessStrategy {
    fn objective_name(&self) -> &'static str {
        "fairness"
    }

    fn score_keys(
        &self,
        keys: &[APIKey],
        _quota: &HashMap<String, QuotaState>,
        _cost_estimate: Option<&CostEstimate>,
    ) -> Vec<ScoredKey> {
        let total_usage: u64 = keys.iter().map(|k| k.usage_count).sum();
        let mut scores: Vec<ScoredKey> = keys
            .iter()
            .map(|k| ScoredKey {
                key_id: k.id.clone(),
                score: -relative_usage(k, total_usage),
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

    fn select_key(&self, scores: &[ScoredKey], last_selected_key_id: Option<&str>) -> Option<String> {
        if scores.is_empty() {
            return None;
        }
        let top = scores.iter().map(|s| s.score).fold(f64::NEG_INFINITY, f64::max);
        let tied: Vec<&ScoredKey> = scores
            .iter()
            .filter(|s| (s.score - top).abs() < f64::EPSILON)
            .collect();
        if tied.len() == 1 {
            return Some(tied[0].key_id.clone());
        }
        // Round robin among tied keys: rotate past whichever tied key was
        // last selected, falling back to the first if it isn't among them.
        let last_index = last_selected_key_id.and_then(|id| tied.iter().position(|s| s.key_id == id));
        let next_index = last_index.map_or(0, |i| (i + 1) % tied.len());
        Some(tied[next_index].key_id.clone())
    }

    fn generate_explanation(
        &self,
        selected: &ScoredKey,
        all_scores: &[ScoredKey],
        keys_by_id: &HashMap<String, &APIKey>,
    ) -> String {
        let key = keys_by_id.get(&selected.key_id);
        let usage = key.map(|k| k.usage_count).unwrap_or(0);
        let total_usage: u64 = keys_by_id.values().map(|k| k.usage_count).sum();
        let relative = if total_usage == 0 {
            0.0
        } else {
            usage as f64 / total_usage as f64 * 100.0
        };
        format!(
            "Selected key {} with usage count {usage} ({relative:.1}% of total); least used among {} eligible key(s)",
            selected.key_id,
            all_scores.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_with_usage(id: &str, usage: u64) -> APIKey {
        let mut key = APIKey::new(id, "openai", "sk").unwrap();
        key.usage_count = usage;
        key
    }

    #[test]
    fn least_used_key_wins() {
        let strategy = FairnessStrategy;
        let keys = vec![key_with_usage("hot", 90), key_with_usage("cold", 10)];
        let scores = strategy.score_keys(&keys, &HashMap::new(), None);
        let selected = strategy.select_key(&scores, None).unwrap();
        assert_eq!(selected, "cold");
    }

    #[test]
    fn ties_round_robin_past_last_selected() {
        let strategy = FairnessStrategy;
        let keys = vec![key_with_usage("a", 0), key_with_usage("b", 0)];
        let scores = strategy.score_keys(&keys, &HashMap::new(), None);
        let first = strategy.select_key(&scores, None).unwrap();
        let second = strategy.select_key(&scores, Some(&first)).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn unused_keys_score_equally() {
        let strategy = FairnessStrategy;
        let keys = vec![key_with_usage("a", 0), key_with_usage("b", 0)];
        let scores = strategy.score_keys(&keys, &HashMap::new(), None);
        assert!((scores[0].score - scores[1].score).abs() < 1e-9);
    }
}
