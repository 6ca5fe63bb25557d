use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse failure classification surfaced to callers and used by `KeyManager`
/// to decide how a key's state should react to a failed call.
///
/// See `spec.md` §7 for the full retryable-default / key-state-effect table;
/// `RouterError::category` and `RouterError::key_state_effect` encode it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Credentials were rejected outright (expired, revoked, malformed).
    Authentication,
    /// Credentials were accepted but lack permission for the request.
    Authorization,
    /// The provider's short-window rate limit was hit.
    RateLimit,
    /// The key's longer-window quota was exhausted.
    QuotaExceeded,
    /// The call did not complete within its deadline.
    Timeout,
    /// The provider is unreachable or returning server errors.
    ProviderUnavailable,
    /// The request itself was malformed or rejected by validation.
    InvalidRequest,
    /// A budget limit was hit under hard enforcement.
    BudgetExceeded,
    /// An unclassified internal failure.
    Internal,
}

impl ErrorCategory {
    /// Whether callers should retry (typically on a different key) by default.
    ///
    /// `QuotaExceeded` and `Timeout` are deliberately excluded: a quota window
    /// does not clear by retrying immediately, and a deadline that already
    /// elapsed once is not more likely to succeed on the next attempt within
    /// the same routing round.
    #[must_use]
    pub fn retryable_by_default(self) -> bool {
        matches!(self, Self::RateLimit | Self::ProviderUnavailable)
    }
}

/// Unified error type for the keyrouter workspace.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq)]
#[non_exhaustive]
pub enum RouterError {
    /// Invalid input argument or failed model validation.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// A resource could not be found (key, budget, policy, etc.).
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing resource.
        what: String,
    },

    /// No key satisfied eligibility, quota, and policy constraints.
    #[error("no eligible keys available for provider(s): {providers:?}")]
    NoEligibleKeys {
        /// Providers that were considered and had no eligible key.
        providers: Vec<String>,
    },

    /// A budget under `Hard` enforcement would be or was exceeded.
    #[error("budget {budget_id} exceeded: spent={spent} limit={limit}")]
    BudgetExceeded {
        /// Budget that was exceeded.
        budget_id: String,
        /// Spend at the time of rejection.
        spent: f64,
        /// Configured limit.
        limit: f64,
    },

    /// A classified failure from a provider call or adapter, with the
    /// retry/state-transition metadata `KeyManager` and `Router` rely on.
    #[error("{category:?} error from {provider_id}: {message}")]
    Provider {
        /// Coarse classification.
        category: ErrorCategory,
        /// Provider that produced the error.
        provider_id: String,
        /// Human-readable message.
        message: String,
        /// Raw provider-specific error code, if any.
        provider_code: Option<String>,
        /// Whether this particular occurrence should be retried.
        retryable: bool,
        /// Provider-suggested retry delay, if any.
        retry_after_ms: Option<u64>,
    },

    /// An individual provider call exceeded its per-call timeout.
    #[error("provider timed out: {provider_id}")]
    ProviderTimeout {
        /// Provider that timed out.
        provider_id: String,
    },

    /// The overall request exceeded its end-to-end deadline.
    #[error("request timed out")]
    RequestTimeout,

    /// All attempted keys failed; contains the individual failures in
    /// attempt order.
    #[error("all providers failed: {0:?}")]
    AllProvidersFailed(Vec<RouterError>),

    /// All attempted keys timed out.
    #[error("all providers timed out")]
    AllProvidersTimedOut,

    /// The key's quota window is exhausted.
    #[error("quota exceeded for key {key_id}: remaining={remaining} reset_in_ms={reset_in_ms}")]
    QuotaExceeded {
        /// Key whose quota was exhausted.
        key_id: String,
        /// Units remaining (0 in this variant).
        remaining: u64,
        /// Milliseconds until the window resets.
        reset_in_ms: u64,
    },

    /// The key is in a cooldown window following a throttling failure.
    #[error("key {key_id} is throttled: reset_in_ms={reset_in_ms}")]
    KeyThrottled {
        /// Throttled key.
        key_id: String,
        /// Milliseconds remaining in the cooldown window.
        reset_in_ms: u64,
    },

    /// Encryption or decryption of key material failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// The persisted state store reported a failure.
    #[error("state store error: {0}")]
    StateStore(String),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RouterError {
    /// Helper: build an `InvalidArg` error.
    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        Self::InvalidArg(msg.into())
    }

    /// Helper: build a `NotFound` error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Coarse category for this error, if it carries one.
    #[must_use]
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Provider { category, .. } => Some(*category),
            Self::ProviderTimeout { .. } | Self::RequestTimeout | Self::AllProvidersTimedOut => {
                Some(ErrorCategory::Timeout)
            }
            Self::QuotaExceeded { .. } => Some(ErrorCategory::QuotaExceeded),
            Self::KeyThrottled { .. } => Some(ErrorCategory::RateLimit),
            Self::BudgetExceeded { .. } => Some(ErrorCategory::BudgetExceeded),
            Self::InvalidArg(_) => Some(ErrorCategory::InvalidRequest),
            _ => None,
        }
    }

    /// Whether this error should be retried (on a different key) by default.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::AllProvidersFailed(inner) => inner.iter().any(Self::is_retryable),
            other => other
                .category()
                .is_some_and(ErrorCategory::retryable_by_default),
        }
    }

    /// Returns true if this error should be surfaced to users as actionable
    /// (i.e. not a benign not-found, and not an aggregate of only benign errors).
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        match self {
            Self::NotFound { .. } => false,
            Self::AllProvidersFailed(inner) => inner.iter().any(Self::is_actionable),
            _ => true,
        }
    }

    /// Flatten nested `AllProvidersFailed` structures into a plain vector.
    #[must_use]
    pub fn flatten(self) -> Vec<Self> {
        match self {
            Self::AllProvidersFailed(list) => list.into_iter().flat_map(Self::flatten).collect(),
            other => vec![other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_unwraps_nested_aggregates() {
        let err = RouterError::AllProvidersFailed(vec![
            RouterError::AllProvidersFailed(vec![RouterError::Internal("a".into())]),
            RouterError::Internal("b".into()),
        ]);
        assert_eq!(err.flatten().len(), 2);
    }

    #[test]
    fn provider_timeout_not_retryable_by_default() {
        let err = RouterError::ProviderTimeout {
            provider_id: "openai".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn provider_unavailable_retryable_by_default() {
        let err = RouterError::Provider {
            category: ErrorCategory::ProviderUnavailable,
            provider_id: "openai".into(),
            message: "boom".into(),
            provider_code: Some("503".into()),
            retryable: true,
            retry_after_ms: None,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn invalid_arg_not_retryable() {
        let err = RouterError::invalid_arg("bad");
        assert!(!err.is_retryable());
    }
}
