//! The `ProviderAdapter` trait: the single seam between the routing/decision
//! engine and a concrete credentialed HTTP provider.
//!
//! Grounded on the original Python `ProviderAdapter` ABC
//! (`domain/interfaces/provider_adapter.py`), which exposes exactly these six
//! operations rather than the fine-grained per-capability trait split some
//! connector-style crates use — a single adapter fronts one provider's whole
//! surface.

use async_trait::async_trait;
use keyrouter_types::{CostEstimate, HealthState, RequestIntent, RouterError, SystemResponse};

/// A capability an adapter advertises support for (e.g. `"chat"`,
/// `"embeddings"`, `"streaming"`). Capability strings are adapter-defined;
/// the router does not interpret them beyond presence/absence checks.
pub type Capability = String;

/// Implemented once per credentialed provider (OpenAI, Anthropic, a local
/// vLLM deployment, ...). `Router` holds adapters behind `Arc<dyn
/// ProviderAdapter>`, one per `provider_id` referenced by `APIKey::provider_id`.
///
/// # Non-goals
/// This trait does not specify how an implementation performs HTTP I/O
/// (reqwest, hyper, or otherwise) — that is entirely up to the adapter; the
/// router only depends on this trait's contract (`spec.md` §4.2/§6).
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable identifier for the provider this adapter fronts (e.g. `"openai"`).
    fn provider_id(&self) -> &str;

    /// Execute a request against the provider using the given key material.
    ///
    /// Returns the provider's raw response payload; callers normalize it via
    /// `normalize_response`. Implementations should respect the caller's
    /// cancellation (the router wraps this call in a timeout) rather than
    /// spawning detached work.
    ///
    /// # Errors
    /// Returns `RouterError::Provider` (or a more specific variant) on any
    /// provider-side failure; transport errors should be mapped via
    /// `map_error` before being returned.
    async fn execute_request(
        &self,
        key_material: &str,
        intent: &RequestIntent,
    ) -> Result<serde_json::Value, RouterError>;

    /// Convert a raw provider response into the workspace's normalized
    /// `SystemResponse` shape.
    ///
    /// # Errors
    /// Returns `RouterError::Provider` if the raw payload is missing fields
    /// this adapter requires to construct a `SystemResponse`.
    fn normalize_response(
        &self,
        raw: serde_json::Value,
        key_id: &str,
        request_id: &str,
    ) -> Result<SystemResponse, RouterError>;

    /// Classify an arbitrary provider-side error (HTTP status, transport
    /// failure, malformed body) into the workspace's `RouterError` taxonomy,
    /// including whether it should be retried and what it implies for the
    /// key's state (handled by `KeyManager` based on `RouterError::category`).
    fn map_error(&self, raw_message: &str, status_code: Option<u16>) -> RouterError;

    /// Capabilities this adapter supports, used by `PolicyEngine`/`RoutingEngine`
    /// to filter keys whose provider cannot serve a given `RequestIntent`.
    fn get_capabilities(&self) -> Vec<Capability>;

    /// Estimate the cost of executing `intent`, before calling the provider.
    ///
    /// Adapters lacking a price-table entry for `intent.model` should fall
    /// back to the heuristic in `spec.md` §4.2: output tokens estimate =
    /// `min(configured_max, 0.8 * intent.max_tokens(), default)`, reported
    /// with confidence `0.85` when a price table entry exists and `0.7`
    /// under the heuristic fallback.
    ///
    /// # Errors
    /// Returns `RouterError::InvalidArg` if `intent` cannot be costed at all
    /// (e.g. an unrecognized model with no fallback pricing configured).
    async fn estimate_cost(&self, intent: &RequestIntent) -> Result<CostEstimate, RouterError>;

    /// Query (and typically TTL-cache) this adapter's current health.
    async fn get_health(&self) -> HealthState;
}

/// Default output-token estimate used by `estimate_cost` heuristic
/// fallbacks when a request sets no `max_tokens` parameter.
pub const DEFAULT_OUTPUT_TOKEN_ESTIMATE: u64 = 256;

/// Apply the standard heuristic for estimating output tokens absent a
/// price-table entry (`spec.md` §4.2): `min(configured_max, 0.8 *
/// max_tokens, default)`, where the `0.8 * max_tokens` term is omitted if
/// the request did not set `max_tokens`.
#[must_use]
pub fn heuristic_output_tokens(intent: &RequestIntent, configured_max: u64) -> u64 {
    let mut estimate = configured_max.min(DEFAULT_OUTPUT_TOKEN_ESTIMATE);
    if let Some(max_tokens) = intent.max_tokens() {
        let from_max_tokens = (max_tokens as f64 * 0.8) as u64;
        estimate = estimate.min(from_max_tokens);
    }
    estimate.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn heuristic_respects_configured_max() {
        let mut params = HashMap::new();
        params.insert("max_tokens".to_string(), serde_json::Value::from(10_000u64));
        let msgs = vec![keyrouter_types::Message::new("user", "hi", None).unwrap()];
        let intent = RequestIntent::new("gpt-4", msgs, params).unwrap();
        let estimate = heuristic_output_tokens(&intent, 500);
        assert!(estimate <= 500);
    }
}
