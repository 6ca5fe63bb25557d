//! Configuration types for the router and its components.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Strategy for selecting among eligible keys when more than one is viable
/// at the execution step (`spec.md` §4.8 step 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FetchStrategy {
    /// Use priority order (highest routing score first) and fall back to the
    /// next key on failure.
    #[default]
    PriorityWithFallback,
    /// Race all eligible keys concurrently and return the first success.
    Latency,
}

/// Strategy for consuming units from a key's quota when handling requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum QuotaConsumptionStrategy {
    /// Each request deducts exactly one unit from the quota budget.
    #[default]
    Unit,
    /// The caller specifies a weight (units) to deduct per request.
    Weighted,
}

/// Configuration for a key's quota window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Maximum number of units that may be consumed within a single window.
    pub limit: u64,
    /// Duration of the accounting window.
    pub window: Duration,
    /// Strategy for how requests consume units from the budget.
    pub strategy: QuotaConsumptionStrategy,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            limit: 1000,
            window: Duration::from_secs(60),
            strategy: QuotaConsumptionStrategy::Unit,
        }
    }
}

/// Exponential backoff configuration used when a key re-enters `Recovering`
/// after a cooldown, before being allowed back to `Available`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Minimum backoff delay in milliseconds.
    pub min_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Exponential factor applied after each consecutive failure (>= 1).
    pub factor: u32,
    /// Random jitter percentage `[0, 100]` added to each delay.
    pub jitter_percent: u8,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff_ms: 500,
            max_backoff_ms: 30_000,
            factor: 2,
            jitter_percent: 20,
        }
    }
}

/// Configuration for encrypting key material at rest (`spec.md` §4.3/§6).
///
/// The encryption key itself is never stored in this struct; it is read
/// from `key_env_var` at the moment it is needed. A 44-character value found
/// there is used directly as a raw key; any other value is stretched via
/// PBKDF2-HMAC-SHA256 using `salt_env_var` (or `default_salt` if unset).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Environment variable holding the raw or to-be-derived encryption secret.
    pub key_env_var: String,
    /// Environment variable holding the KDF salt.
    pub salt_env_var: String,
    /// Salt used when `salt_env_var` is unset.
    pub default_salt: String,
    /// PBKDF2 iteration count.
    pub kdf_iterations: u32,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            key_env_var: "KEYROUTER_ENCRYPTION_KEY".to_string(),
            salt_env_var: "KEYROUTER_ENCRYPTION_SALT".to_string(),
            default_salt: "keyrouter-salt".to_string(),
            kdf_iterations: 100_000,
        }
    }
}

/// Global configuration for the `Router` orchestrator and its components.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct RouterConfig {
    /// Default quota configuration applied to keys without an explicit override.
    pub default_quota: QuotaConfig,
    /// Backoff applied while a key is recovering from a cooldown.
    pub backoff: BackoffConfig,
    /// Key material encryption configuration.
    pub encryption: EncryptionConfig,
    /// Strategy for executing against multiple eligible keys.
    pub fetch_strategy: FetchStrategy,
    /// Timeout for an individual provider call.
    pub provider_timeout: Duration,
    /// Overall deadline for a routed request, bounding retries across keys.
    pub request_timeout: Option<Duration>,
    /// Default cooldown duration applied to a key entering `Throttled` when
    /// the provider did not suggest a retry delay.
    pub default_cooldown: Duration,
    /// TTL for cached `ProviderAdapter::get_health` results.
    pub health_check_ttl: Duration,
    /// Maximum number of distinct keys to try before giving up with
    /// `RouterError::AllProvidersFailed`/`AllProvidersTimedOut`.
    pub max_key_attempts: usize,
    /// Upper bound on `StateTransition` records a `StateStore` retains per
    /// key before discarding the oldest (`None` retains all).
    pub max_transitions: Option<usize>,
    /// Upper bound on `RoutingDecision` records a `StateStore` retains
    /// before discarding the oldest (`None` retains all).
    pub max_decisions: Option<usize>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_quota: QuotaConfig::default(),
            backoff: BackoffConfig::default(),
            encryption: EncryptionConfig::default(),
            fetch_strategy: FetchStrategy::default(),
            provider_timeout: Duration::from_secs(30),
            request_timeout: None,
            default_cooldown: Duration::from_secs(60),
            health_check_ttl: Duration::from_secs(60),
            max_key_attempts: 5,
            max_transitions: Some(1000),
            max_decisions: Some(1000),
        }
    }
}
