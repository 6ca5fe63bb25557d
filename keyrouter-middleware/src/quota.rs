//! `QuotaAwarenessEngine`: per-key sliding-window quota tracking.
//!
//! Grounded on `QuotaAwareConnector` from the teacher's middleware crate,
//! restructured from "one runtime per wrapped connector" to "one runtime per
//! tracked key" since `spec.md` §4.4 scopes quota state to `APIKey`, not to
//! a provider connection.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use keyrouter_types::{CapacityState, QuotaConfig, QuotaState};

struct KeyQuotaRuntime {
    limit: u64,
    used_in_window: u64,
    window: Duration,
    window_start: Instant,
    just_reset: bool,
}

impl KeyQuotaRuntime {
    fn new(config: &QuotaConfig) -> Self {
        Self {
            limit: config.limit,
            used_in_window: 0,
            window: config.window,
            window_start: Instant::now(),
            just_reset: false,
        }
    }

    fn maybe_reset(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= self.window {
            self.used_in_window = 0;
            self.window_start = now;
            self.just_reset = true;
        }
    }

    fn snapshot(&self, key_id: &str, now: Instant) -> QuotaState {
        let elapsed = now.duration_since(self.window_start);
        let reset_in = self.window.saturating_sub(elapsed);
        let capacity_state = if self.just_reset && self.used_in_window == 0 {
            CapacityState::Recovering
        } else {
            CapacityState::from_ratio(self.limit.saturating_sub(self.used_in_window), self.limit)
        };
        QuotaState {
            key_id: key_id.to_string(),
            capacity_state,
            used: self.used_in_window,
            limit: self.limit,
            reset_in,
        }
    }
}

/// Tracks quota usage for every managed key and classifies remaining
/// headroom into a `CapacityState` (`spec.md` §4.4).
///
/// Each key's window is tracked independently behind its own lock; a burst
/// of calls against one key never blocks quota queries against another.
pub struct QuotaAwarenessEngine {
    default_config: QuotaConfig,
    overrides: HashMap<String, QuotaConfig>,
    runtimes: Mutex<HashMap<String, KeyQuotaRuntime>>,
}

impl QuotaAwarenessEngine {
    /// Construct an engine with a default quota config applied to any key
    /// without an explicit `overrides` entry.
    #[must_use]
    pub fn new(default_config: QuotaConfig, overrides: HashMap<String, QuotaConfig>) -> Self {
        Self {
            default_config,
            overrides,
            runtimes: Mutex::new(HashMap::new()),
        }
    }

    fn config_for(&self, key_id: &str) -> &QuotaConfig {
        self.overrides.get(key_id).unwrap_or(&self.default_config)
    }

    /// Current quota state for `key_id`, creating a fresh window-tracking
    /// entry on first observation.
    #[must_use]
    pub fn get_quota_state(&self, key_id: &str) -> QuotaState {
        let mut runtimes = self.runtimes.lock().expect("mutex poisoned");
        let now = Instant::now();
        let config = self.config_for(key_id).clone();
        let runtime = runtimes
            .entry(key_id.to_string())
            .or_insert_with(|| KeyQuotaRuntime::new(&config));
        runtime.maybe_reset(now);
        runtime.snapshot(key_id, now)
    }

    /// Record that `units` were consumed against `key_id`'s current window.
    ///
    /// Resets the window first if it has elapsed, matching the
    /// read-before-write pattern `get_quota_state` uses.
    pub fn record_usage(&self, key_id: &str, units: u64) {
        let mut runtimes = self.runtimes.lock().expect("mutex poisoned");
        let now = Instant::now();
        let config = self.config_for(key_id).clone();
        let runtime = runtimes
            .entry(key_id.to_string())
            .or_insert_with(|| KeyQuotaRuntime::new(&config));
        runtime.maybe_reset(now);
        runtime.just_reset = false;
        runtime.used_in_window = runtime.used_in_window.saturating_add(units);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_limit(limit: u64) -> QuotaAwarenessEngine {
        QuotaAwarenessEngine::new(
            QuotaConfig {
                limit,
                window: Duration::from_secs(60),
                strategy: keyrouter_types::QuotaConsumptionStrategy::Unit,
            },
            HashMap::new(),
        )
    }

    #[test]
    fn fresh_key_is_abundant() {
        let engine = engine_with_limit(100);
        let state = engine.get_quota_state("k1");
        assert_eq!(state.capacity_state, CapacityState::Abundant);
        assert_eq!(state.used, 0);
    }

    #[test]
    fn usage_reduces_remaining_and_reclassifies() {
        let engine = engine_with_limit(10);
        for _ in 0..9 {
            engine.record_usage("k1", 1);
        }
        let state = engine.get_quota_state("k1");
        assert_eq!(state.remaining(), 1);
        assert_eq!(state.capacity_state, CapacityState::Critical);
    }

    #[test]
    fn exhausted_at_limit() {
        let engine = engine_with_limit(5);
        engine.record_usage("k1", 5);
        let state = engine.get_quota_state("k1");
        assert_eq!(state.capacity_state, CapacityState::Exhausted);
        assert_eq!(state.remaining(), 0);
    }

    #[test]
    fn independent_keys_do_not_interfere() {
        let engine = engine_with_limit(10);
        engine.record_usage("k1", 9);
        let k2 = engine.get_quota_state("k2");
        assert_eq!(k2.used, 0);
    }
}
