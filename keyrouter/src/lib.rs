//! keyrouter
//!
//! An intelligent multi-tenant API-key router and proxy fronting one or
//! more LLM (or other credentialed HTTP) providers.
//!
//! Overview
//! - Manages a pool of credentialed keys per provider, encrypting material
//!   at rest and driving an explicit lifecycle state machine
//!   (`KeyManager`).
//! - Scores and selects among eligible keys per request using a pluggable
//!   objective — cost, fairness, or reliability (`RoutingEngine`).
//! - Enforces declarative policies (`PolicyEngine`) and spend budgets
//!   (`CostController`) before a request is allowed to execute.
//! - Tracks per-key quota headroom (`keyrouter_middleware::QuotaAwarenessEngine`)
//!   and rate-limit cooldowns, feeding both into routing scores and
//!   eligibility.
//! - Executes the selected key's request through a caller-supplied
//!   `ProviderAdapter`, retrying on the next-best key when a failure is
//!   retryable (`Router::execute`).
//!
//! Key behaviors and trade-offs
//! - Fetch strategy: each routing round scores only the keys that survived
//!   policy/quota filtering; a retryable failure excludes that key and
//!   re-scores the remainder, rather than retrying the same key.
//! - Objectives: `"cost"` prefers the cheapest key, `"fairness"` rotates
//!   among equally-used keys, `"reliability"` weights success rate, key
//!   state, and quota headroom into one composite score.
//! - Budgets: `Hard` enforcement blocks an over-budget request outright;
//!   `Soft` enforcement allows it through but reports the violation.
#![warn(missing_docs)]

mod cost_controller;
mod encryption;
mod key_manager;
mod policy_engine;
mod router;
mod routing;

pub use cost_controller::CostController;
pub use encryption::Encryptor;
pub use key_manager::{KeyManager, Trigger};
pub use policy_engine::{PolicyContext, PolicyEngine};
pub use router::Router;
pub use routing::{
    CostOptimizedStrategy, FairnessStrategy, ReliabilityOptimizedStrategy, RoutingEngine,
    RoutingStrategy, ScoredKey,
};

pub use keyrouter_core::provider_adapter::{Capability, ProviderAdapter, heuristic_output_tokens};
pub use keyrouter_core::state_store::{KeyUpdateFn, StateStore};
pub use keyrouter_core::{ErrorCategory, RouterError};
pub use keyrouter_middleware::{CooldownTracker, QuotaAwarenessEngine};
pub use keyrouter_types::*;

use std::collections::HashMap;
use std::sync::Arc;

/// Builds a `Router` from a `StateStore`, a set of registered provider
/// adapters, and configuration.
///
/// Grounded on the teacher's `BorsaBuilder`: accumulate registrations,
/// validate at `build()` time rather than at each registration call.
#[derive(Default)]
pub struct KeyRouterBuilder {
    config: RouterConfig,
    store: Option<Arc<dyn StateStore>>,
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl KeyRouterBuilder {
    /// Start building a `Router` with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` instead of `RouterConfig::default()`.
    #[must_use]
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist key/budget/policy/decision state through `store`.
    #[must_use]
    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Register `adapter`, keyed by its own `ProviderAdapter::provider_id`.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.provider_id().to_string(), adapter);
        self
    }

    /// Validate accumulated configuration and construct the `Router`.
    ///
    /// # Errors
    /// Returns `RouterError::InvalidArg` if no `state_store` was supplied or
    /// no provider adapters were registered.
    pub fn build(self) -> Result<Router, RouterError> {
        let store = self
            .store
            .ok_or_else(|| RouterError::invalid_arg("KeyRouterBuilder requires a state_store"))?;
        if self.adapters.is_empty() {
            return Err(RouterError::invalid_arg(
                "KeyRouterBuilder requires at least one registered provider adapter",
            ));
        }
        let quota_engine = Arc::new(QuotaAwarenessEngine::new(
            self.config.default_quota.clone(),
            HashMap::new(),
        ));
        Ok(Router::new(self.config, store, self.adapters, quota_engine))
    }
}
