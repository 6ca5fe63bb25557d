use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Token accounting for a completed request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input (prompt) tokens consumed.
    pub input_tokens: u64,
    /// Output (completion) tokens produced.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// `input_tokens + output_tokens`.
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Metadata attached to a `SystemResponse`, carried through from the adapter's
/// normalized response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Model identifier actually used (may differ from the requested alias).
    pub model_used: String,
    /// Token accounting, if the provider reported it.
    pub tokens_used: Option<TokenUsage>,
    /// Wall-clock time spent executing the request, in milliseconds.
    pub response_time_ms: u64,
    /// Identifier of the provider that served the request.
    pub provider_id: String,
    /// When the response was produced.
    pub timestamp: DateTime<Utc>,
    /// Why the provider stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
    /// Provider-assigned request identifier, if any.
    pub request_id: Option<String>,
    /// Caller-supplied correlation identifier, echoed back for tracing.
    pub correlation_id: Option<String>,
    /// Any additional provider-specific metadata.
    pub additional_metadata: HashMap<String, serde_json::Value>,
}

/// The final, normalized result handed back to a caller of `Router::route`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemResponse {
    /// Normalized response content.
    pub content: String,
    /// Response metadata.
    pub metadata: ResponseMetadata,
    /// Actual cost incurred, if the provider reported it (else only the
    /// pre-call estimate is available via `CostController`).
    pub cost: Option<f64>,
    /// ID of the key that served this request.
    pub key_used: String,
    /// Caller-supplied or generated identifier for this request.
    pub request_id: String,
}
