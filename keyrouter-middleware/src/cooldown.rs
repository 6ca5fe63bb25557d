//! Per-key cooldown (throttle) window tracking.
//!
//! Grounded on the teacher's `BlacklistConnector`: a `Mutex`-guarded
//! "blacklisted until" instant per entity, here scoped per `APIKey` rather
//! than per wrapped connector. `KeyManager` (in the `keyrouter` crate) uses
//! this to decide when a `Throttled` key has served its cooldown and is
//! eligible to opportunistically return to `Available`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Tracks cooldown-until timestamps for keys currently in the `Throttled`
/// state.
pub struct CooldownTracker {
    default_duration: Duration,
    state: Mutex<HashMap<String, Instant>>,
}

impl CooldownTracker {
    /// Construct a tracker using `default_duration` when a caller does not
    /// supply a provider-suggested retry delay.
    #[must_use]
    pub fn new(default_duration: Duration) -> Self {
        Self {
            default_duration,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Put `key_id` into cooldown for `suggested` (or the configured
    /// default if `None`), returning the cooldown duration in milliseconds.
    pub fn start_cooldown(&self, key_id: &str, suggested: Option<Duration>) -> u64 {
        let duration = suggested.unwrap_or(self.default_duration);
        let until = Instant::now() + duration;
        self.state
            .lock()
            .expect("mutex poisoned")
            .insert(key_id.to_string(), until);
        duration.as_millis().try_into().unwrap_or(u64::MAX)
    }

    /// Milliseconds remaining in `key_id`'s cooldown, or `None` if it has
    /// none recorded or its cooldown has already elapsed (in which case the
    /// stale entry is removed).
    pub fn remaining_ms(&self, key_id: &str) -> Option<u64> {
        let mut state = self.state.lock().expect("mutex poisoned");
        let now = Instant::now();
        match state.get(key_id) {
            Some(&until) if now < until => {
                let remaining = until.saturating_duration_since(now);
                Some(remaining.as_millis().try_into().unwrap_or(u64::MAX).max(1))
            }
            Some(_) => {
                state.remove(key_id);
                None
            }
            None => None,
        }
    }

    /// `true` if `key_id` is currently within an active cooldown window.
    #[must_use]
    pub fn is_in_cooldown(&self, key_id: &str) -> bool {
        self.remaining_ms(key_id).is_some()
    }

    /// Clear any recorded cooldown for `key_id` (e.g. on manual re-enable).
    pub fn clear(&self, key_id: &str) {
        self.state.lock().expect("mutex poisoned").remove(key_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_blocks_until_elapsed() {
        let tracker = CooldownTracker::new(Duration::from_millis(50));
        tracker.start_cooldown("k1", None);
        assert!(tracker.is_in_cooldown("k1"));
    }

    #[test]
    fn clear_removes_cooldown() {
        let tracker = CooldownTracker::new(Duration::from_secs(60));
        tracker.start_cooldown("k1", None);
        tracker.clear("k1");
        assert!(!tracker.is_in_cooldown("k1"));
    }

    #[test]
    fn honors_suggested_duration_over_default() {
        let tracker = CooldownTracker::new(Duration::from_secs(60));
        let ms = tracker.start_cooldown("k1", Some(Duration::from_millis(10)));
        assert_eq!(ms, 10);
    }

    #[test]
    fn unknown_key_has_no_cooldown() {
        let tracker = CooldownTracker::new(Duration::from_secs(60));
        assert!(tracker.remaining_ms("nope").is_none());
    }
}
