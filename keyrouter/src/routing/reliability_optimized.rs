//! Reliability-maximizing routing strategy.
//!
//! Grounded on `domain/components/routing_strategies/reliability_optimized.py`:
//! a weighted composite of success rate (70%), key lifecycle state (20%),
//! and quota headroom (10%), penalized when a key's failure ratio exceeds
//! 10%, then min-max normalized (falling back to a flat `0.1` score if every
//! key ties, rather than the `1.0` the other strategies use, since an
//! all-zero composite here usually means every key is equally unproven
//! rather than equally good).

use std::collections::HashMap;

use keyrouter_types::{APIKey, CapacityState, CostEstimate, KeyState, QuotaState};

use super::ScoredKey;
use crate::routing::RoutingStrategy;

fn key_state_score(state: KeyState) -> f64 {
    match state {
        KeyState::Available => 1.0,
        KeyState::Throttled => 0.7,
        KeyState::Recovering => 0.5,
        KeyState::Exhausted | KeyState::Disabled | KeyState::Invalid => 0.0,
    }
}

fn quota_state_score(quota: Option<&QuotaState>) -> f64 {
    match quota.map(|q| q.capacity_state) {
        Some(CapacityState::Abundant) => 1.0,
        Some(CapacityState::Constrained) => 0.7,
        Some(CapacityState::Critical) => 0.4,
        Some(CapacityState::Recovering) => 0.6,
        Some(CapacityState::Exhausted) => 0.0,
        None => 0.8,
    }
}

fn composite_score(key: &APIKey, quota: Option<&QuotaState>) -> f64 {
    let base = 0.70 * key.success_rate() + 0.20 * key_state_score(key.state) + 0.10 * quota_state_score(quota);

    let total = key.usage_count + key.failure_count;
    if total == 0 {
        return base;
    }
    let failure_ratio = key.failure_count as f64 / total as f64;
    if failure_ratio > 0.10 {
        base * (1.0 - 0.5 * failure_ratio)
    } else {
        base
    }
}

/// Prefers keys with the best recent success rate and healthiest state.
pub struct ReliabilityOptimizedStrategy;

impl RoutingStrategy for ReliabilityOptimizedStrategy {
    fn objective_name(&self) -> &'static str {
        "reliability"
    }

    fn score_keys(
        &self,
        keys: &[APIKey],
        quota: &HashMap<String, QuotaState>,
        _cost_estimate: Option<&CostEstimate>,
    ) -> Vec<ScoredKey> {
        let mut scores: Vec<ScoredKey> = keys
            .iter()
            .map(|k| ScoredKey {
                key_id: k.id.clone(),
                score: composite_score(k, quota.get(&k.id)),
            })
            .collect();
        normalize_with_low_floor(&mut scores);
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
        let success_rate = key.map(|k| k.success_rate()).unwrap_or(0.95);
        format!(
            "Selected key {} with success rate {:.1}% and state {:?} ({} eligible key(s) considered)",
            selected.key_id,
            success_rate * 100.0,
            key.map(|k| k.state),
            all_scores.len()
        )
    }
}

fn normalize_with_low_floor(scores: &mut [ScoredKey]) {
    if scores.is_empty() {
        return;
    }
    let min = scores.iter().map(|s| s.score).fold(f64::INFINITY, f64::min);
    let max = scores.iter().map(|s| s.score).fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        for s in scores.iter_mut() {
            s.score = 0.1;
        }
        return;
    }
    for s in scores.iter_mut() {
        s.score = (s.score - min) / (max - min);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_with_rates(id: &str, usage: u64, failure: u64) -> APIKey {
        let mut key = APIKey::new(id, "openai", "sk").unwrap();
        key.usage_count = usage;
        key.failure_count = failure;
        key
    }

    fn quota_with_state(key_id: &str, capacity_state: CapacityState) -> HashMap<String, QuotaState> {
        let mut quota = HashMap::new();
        quota.insert(
            key_id.to_string(),
            QuotaState {
                key_id: key_id.to_string(),
                capacity_state,
                used: 0,
                limit: 100,
                reset_in: std::time::Duration::from_secs(60),
            },
        );
        quota
    }

    #[test]
    fn more_reliable_key_wins() {
        let strategy = ReliabilityOptimizedStrategy;
        let keys = vec![key_with_rates("flaky", 50, 50), key_with_rates("solid", 99, 1)];
        let scores = strategy.score_keys(&keys, &HashMap::new(), None);
        let selected = strategy.select_key(&scores, None).unwrap();
        assert_eq!(selected, "solid");
    }

    #[test]
    fn identical_keys_fall_back_to_low_floor_score() {
        let strategy = ReliabilityOptimizedStrategy;
        let keys = vec![key_with_rates("a", 10, 0), key_with_rates("b", 10, 0)];
        let scores = strategy.score_keys(&keys, &HashMap::new(), None);
        assert!((scores[0].score - 0.1).abs() < 1e-9);
        assert!((scores[1].score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn high_failure_ratio_is_penalized() {
        let clean = composite_score(&key_with_rates("clean", 95, 5), None);
        let dirty = composite_score(&key_with_rates("dirty", 50, 50), None);
        assert!(dirty < clean);
    }

    #[test]
    fn real_quota_state_differentiates_otherwise_tied_keys() {
        let strategy = ReliabilityOptimizedStrategy;
        let keys = vec![key_with_rates("abundant", 50, 0), key_with_rates("critical", 50, 0)];
        let mut quota = quota_with_state("abundant", CapacityState::Abundant);
        quota.extend(quota_with_state("critical", CapacityState::Critical));
        let scores = strategy.score_keys(&keys, &quota, None);
        let selected = strategy.select_key(&scores, None).unwrap();
        assert_eq!(selected, "abundant");
    }
}
