use serde::{Deserialize, Serialize};

use crate::error::RouterError;

/// Scope at which a `Budget` applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum BudgetScope {
    /// Applies across the whole deployment.
    Global,
    /// Applies to all keys of a single provider.
    PerProvider,
    /// Applies to a single key.
    PerKey,
    /// Applies to a single logical route (caller-defined grouping).
    PerRoute,
}

/// What happens when a budget is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum EnforcementMode {
    /// Requests that would exceed the budget are rejected.
    Hard,
    /// Requests that would exceed the budget are allowed but flagged.
    Soft,
}

/// A spending limit tracked by `CostController`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    /// Stable identifier for this budget.
    pub id: String,
    /// Scope this budget applies at.
    pub scope: BudgetScope,
    /// Identifier of the entity the budget applies to; required unless `scope == Global`.
    pub scope_id: Option<String>,
    /// Maximum spend allowed within the current period, in the budget's currency.
    pub limit: f64,
    /// Spend recorded so far in the current period.
    pub spent: f64,
    /// Enforcement behavior on exceedance.
    pub enforcement_mode: EnforcementMode,
}

impl Budget {
    /// Construct a budget, validating that a scoped budget carries a `scope_id`.
    ///
    /// # Errors
    /// Returns `RouterError::InvalidArg` if `scope != Global` and `scope_id`
    /// is `None`.
    pub fn new(
        id: impl Into<String>,
        scope: BudgetScope,
        scope_id: Option<String>,
        limit: f64,
        enforcement_mode: EnforcementMode,
    ) -> Result<Self, RouterError> {
        if scope != BudgetScope::Global && scope_id.is_none() {
            return Err(RouterError::invalid_arg(
                "scope_id is required for non-global budget scopes",
            ));
        }
        Ok(Self {
            id: id.into(),
            scope,
            scope_id,
            limit,
            spent: 0.0,
            enforcement_mode,
        })
    }

    /// Remaining budget (may be negative under `Soft` enforcement).
    #[must_use]
    pub fn remaining_budget(&self) -> f64 {
        self.limit - self.spent
    }

    /// Whether spend has reached or exceeded the limit.
    #[must_use]
    pub fn is_exceeded(&self) -> bool {
        self.spent >= self.limit
    }

    /// Percentage of the limit consumed, in `[0, 100+]`.
    #[must_use]
    pub fn utilization_percentage(&self) -> f64 {
        if self.limit <= 0.0 {
            0.0
        } else {
            (self.spent / self.limit) * 100.0
        }
    }
}

/// Outcome of a `CostController::check_budget` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetCheckResult {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Remaining budget after the hypothetical spend, if allowed.
    pub remaining_budget: f64,
    /// Whether applying the estimated cost would exceed any applicable budget.
    pub would_exceed: bool,
    /// Identifier of the most constraining budget considered, if any.
    pub budget_id: Option<String>,
    /// Identifiers of all budgets that would be violated by this request.
    pub violated_budgets: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_budget_allows_missing_scope_id() {
        assert!(Budget::new("b1", BudgetScope::Global, None, 100.0, EnforcementMode::Hard).is_ok());
    }

    #[test]
    fn scoped_budget_requires_scope_id() {
        assert!(Budget::new("b1", BudgetScope::PerProvider, None, 100.0, EnforcementMode::Hard).is_err());
    }

    #[test]
    fn utilization_percentage_computed() {
        let mut b = Budget::new("b1", BudgetScope::Global, None, 200.0, EnforcementMode::Soft).unwrap();
        b.spent = 50.0;
        assert_eq!(b.utilization_percentage(), 25.0);
    }
}
