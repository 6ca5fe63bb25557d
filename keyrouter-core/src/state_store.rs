//! The `StateStore` trait: the durable persistence seam for keys, budgets,
//! policies, and the state-transition audit log (`spec.md` §4.1).
//!
//! Mirrors the original Python `domain/interfaces/state_store.py` surface
//! (`StateStore`, `StateQuery`) which was not retained in the filtered
//! source index; this trait is derived from `spec.md` §4.1's contract text
//! and guarantees (atomic per-key read-modify-write, append-only transition
//! log, best-effort durability with explicit failure signaling via
//! `RouterError::StateStore`).

use async_trait::async_trait;
use keyrouter_types::{APIKey, Budget, Policy, RoutingDecision, StateTransition};

/// A boxed read-modify-write callback for `StateStore::update_key`.
///
/// `update_key` takes this rather than a bare generic `F: FnOnce` so that
/// `StateStore` remains object-safe (`Router` and its components hold it as
/// `Arc<dyn StateStore>`).
pub type KeyUpdateFn =
    Box<dyn FnOnce(APIKey) -> Result<APIKey, keyrouter_types::RouterError> + Send>;

/// Durable storage for router state.
///
/// # Guarantees implementations must provide
/// - `update_key` performs an atomic read-modify-write of a single key: two
///   concurrent callers racing to update the same `key_id` must not produce
///   a result that reflects neither update (last-writer-wins is acceptable;
///   torn writes are not).
/// - `record_transition` is append-only: no method on this trait mutates or
///   removes existing transitions.
/// - Every method may fail with `RouterError::StateStore`; callers
///   (`KeyManager`, `CostController`, `PolicyEngine`) must treat that as a
///   retryable infrastructure failure, distinct from a business-logic
///   rejection.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch a key by ID.
    async fn get_key(&self, key_id: &str) -> Result<Option<APIKey>, keyrouter_types::RouterError>;

    /// List all keys, optionally filtered to a single provider.
    async fn list_keys(
        &self,
        provider_id: Option<&str>,
    ) -> Result<Vec<APIKey>, keyrouter_types::RouterError>;

    /// Insert a new key. Fails if a key with the same `id` already exists.
    async fn insert_key(&self, key: APIKey) -> Result<(), keyrouter_types::RouterError>;

    /// Atomically read-modify-write a key via `f`, returning the updated key.
    ///
    /// `f` receives the current key and returns the next state; returning
    /// `Err` from `f` aborts the update without persisting a change.
    async fn update_key(
        &self,
        key_id: &str,
        f: KeyUpdateFn,
    ) -> Result<APIKey, keyrouter_types::RouterError>;

    /// Append a state-transition audit record.
    async fn record_transition(
        &self,
        transition: StateTransition,
    ) -> Result<(), keyrouter_types::RouterError>;

    /// List transitions recorded for a key, oldest first.
    async fn list_transitions(
        &self,
        key_id: &str,
    ) -> Result<Vec<StateTransition>, keyrouter_types::RouterError>;

    /// Fetch a budget by ID.
    async fn get_budget(
        &self,
        budget_id: &str,
    ) -> Result<Option<Budget>, keyrouter_types::RouterError>;

    /// List all budgets.
    async fn list_budgets(&self) -> Result<Vec<Budget>, keyrouter_types::RouterError>;

    /// Insert or replace a budget.
    async fn put_budget(&self, budget: Budget) -> Result<(), keyrouter_types::RouterError>;

    /// List all policies, optionally filtered by provider scope id.
    async fn list_policies(
        &self,
        scope_id: Option<&str>,
    ) -> Result<Vec<Policy>, keyrouter_types::RouterError>;

    /// Insert or replace a policy.
    async fn put_policy(&self, policy: Policy) -> Result<(), keyrouter_types::RouterError>;

    /// Append a routing decision to the audit trail.
    async fn record_decision(
        &self,
        decision: RoutingDecision,
    ) -> Result<(), keyrouter_types::RouterError>;

    /// List the most recently recorded routing decisions, oldest first,
    /// optionally limited to `limit` most recent entries.
    async fn list_decisions(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<RoutingDecision>, keyrouter_types::RouterError>;
}
