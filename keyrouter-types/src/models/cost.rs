use serde::{Deserialize, Serialize};

use crate::error::RouterError;

/// Method used to produce a `CostEstimate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum EstimationMethod {
    /// Derived from the adapter's configured per-token price table.
    PriceTable,
    /// Heuristic fallback when no price table entry matches the model.
    Heuristic,
}

/// A provider adapter's prediction of what a request will cost before it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Estimated cost amount.
    pub amount: f64,
    /// Upper-cased ISO-4217-style currency code.
    pub currency: String,
    /// Confidence in the estimate, `0.0..=1.0`.
    pub confidence: f64,
    /// How the estimate was produced.
    pub estimation_method: EstimationMethod,
    /// Estimated input token count.
    pub input_tokens_estimate: u64,
    /// Estimated output token count.
    pub output_tokens_estimate: u64,
    /// Optional breakdown (e.g. `{"input": 0.002, "output": 0.008}`).
    pub breakdown: Option<serde_json::Value>,
}

impl CostEstimate {
    /// Construct a `CostEstimate`, validating currency shape and confidence range.
    ///
    /// # Errors
    /// Returns `RouterError::InvalidArg` if `currency` is not exactly 3
    /// alphabetic characters, or `confidence` is outside `[0, 1]`.
    pub fn new(
        amount: f64,
        currency: impl Into<String>,
        confidence: f64,
        estimation_method: EstimationMethod,
        input_tokens_estimate: u64,
        output_tokens_estimate: u64,
    ) -> Result<Self, RouterError> {
        let currency = currency.into().to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(RouterError::invalid_arg(
                "currency must be a 3-letter code",
            ));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(RouterError::invalid_arg("confidence must be within 0..=1"));
        }
        Ok(Self {
            amount,
            currency,
            confidence,
            estimation_method,
            input_tokens_estimate,
            output_tokens_estimate,
            breakdown: None,
        })
    }

    /// Total tokens across input and output estimates.
    #[must_use]
    pub fn total_tokens_estimate(&self) -> u64 {
        self.input_tokens_estimate + self.output_tokens_estimate
    }
}

/// Comparison of an estimated cost against the actual cost reported after execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostReconciliation {
    /// Cost estimated before the request ran.
    pub estimated_cost: f64,
    /// Cost actually incurred, as reported by the provider.
    pub actual_cost: f64,
    /// `actual_cost - estimated_cost`.
    pub error_amount: f64,
    /// Relative error as a percentage; `0.0` when both costs are zero, and
    /// `100.0 * sign(actual)` when only the estimate is zero (avoids
    /// division by zero while still surfacing a large miss).
    pub error_percentage: f64,
}

impl CostReconciliation {
    /// Build a reconciliation from raw estimated/actual costs, computing the
    /// derived error fields the way the original implementation does.
    #[must_use]
    pub fn new(estimated_cost: f64, actual_cost: f64) -> Self {
        let error_amount = actual_cost - estimated_cost;
        let error_percentage = if estimated_cost == 0.0 {
            if actual_cost == 0.0 {
                0.0
            } else {
                100.0 * actual_cost.signum()
            }
        } else {
            (error_amount / estimated_cost) * 100.0
        };
        Self {
            estimated_cost,
            actual_cost,
            error_amount,
            error_percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_currency() {
        assert!(CostEstimate::new(1.0, "usdollars", 0.5, EstimationMethod::Heuristic, 1, 1).is_err());
    }

    #[test]
    fn reconciliation_handles_zero_estimate() {
        let r = CostReconciliation::new(0.0, 0.0);
        assert_eq!(r.error_percentage, 0.0);
        let r = CostReconciliation::new(0.0, 5.0);
        assert_eq!(r.error_percentage, 100.0);
    }

    #[test]
    fn reconciliation_percentage() {
        let r = CostReconciliation::new(10.0, 12.0);
        assert_eq!(r.error_amount, 2.0);
        assert_eq!(r.error_percentage, 20.0);
    }
}
