//! `CostController`: budget CRUD, pre-execution budget gating, and
//! post-execution spend reconciliation.
//!
//! Grounded on `spec.md` §4.5; no direct teacher analogue exists (the
//! teacher has no spend-tracking concept), so this follows the same
//! `Arc<dyn StateStore>`-backed, per-entity-lock-free style `KeyManager`
//! uses, since budgets here are serialized through the store's own
//! `update`-style methods rather than an extra lock layer.

use std::sync::Arc;

use keyrouter_core::state_store::StateStore;
use keyrouter_types::{
    Budget, BudgetCheckResult, BudgetScope, CostReconciliation, EnforcementMode, RouterError,
};

/// Budget CRUD and the pre/post-execution spend gate.
pub struct CostController {
    store: Arc<dyn StateStore>,
}

impl CostController {
    /// Construct a controller backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Create or replace a budget.
    pub async fn put_budget(&self, budget: Budget) -> Result<(), RouterError> {
        self.store.put_budget(budget).await
    }

    /// Fetch a budget by id.
    pub async fn get_budget(&self, budget_id: &str) -> Result<Option<Budget>, RouterError> {
        self.store.get_budget(budget_id).await
    }

    fn applies(budget: &Budget, provider_id: &str, key_id: &str) -> bool {
        match budget.scope {
            BudgetScope::Global => true,
            BudgetScope::PerProvider => budget.scope_id.as_deref() == Some(provider_id),
            BudgetScope::PerKey => budget.scope_id.as_deref() == Some(key_id),
            BudgetScope::PerRoute => false,
        }
    }

    /// Evaluate every budget whose scope matches `(provider_id, key_id)`
    /// against a hypothetical spend of `estimate`.
    ///
    /// A budget is violated when `spent + estimate > limit`. Under `Hard`
    /// enforcement any violation makes the whole check `allowed = false`;
    /// under `Soft`, the request is always allowed but violated budgets are
    /// still reported so a caller can increment a warning counter.
    pub async fn check_budget(
        &self,
        estimate: f64,
        provider_id: &str,
        key_id: &str,
    ) -> Result<BudgetCheckResult, RouterError> {
        let budgets = self.store.list_budgets().await?;
        let mut allowed = true;
        let mut would_exceed = false;
        let mut violated = Vec::new();
        let mut tightest: Option<(&str, f64)> = None;

        for budget in &budgets {
            if !Self::applies(budget, provider_id, key_id) {
                continue;
            }
            let remaining_after = budget.limit - (budget.spent + estimate);
            let violates = budget.spent + estimate > budget.limit;
            if violates {
                would_exceed = true;
                violated.push(budget.id.clone());
                if budget.enforcement_mode == EnforcementMode::Hard {
                    allowed = false;
                }
            }
            let remaining_now = budget.remaining_budget();
            if tightest.is_none_or(|(_, r)| remaining_now < r) {
                tightest = Some((budget.id.as_str(), remaining_now));
            }
            let _ = remaining_after;
        }

        let remaining_budget = tightest.map_or(f64::INFINITY, |(_, r)| r - estimate);
        Ok(BudgetCheckResult {
            allowed,
            remaining_budget,
            would_exceed,
            budget_id: tightest.map(|(id, _)| id.to_string()),
            violated_budgets: violated,
        })
    }

    /// Add `amount` to the spend recorded against `budget_id`.
    ///
    /// # Errors
    /// Returns `RouterError::NotFound` if the budget does not exist.
    pub async fn update_spending(&self, budget_id: &str, amount: f64) -> Result<Budget, RouterError> {
        let mut budget = self
            .store
            .get_budget(budget_id)
            .await?
            .ok_or_else(|| RouterError::not_found(format!("budget '{budget_id}'")))?;
        budget.spent += amount;
        self.store.put_budget(budget.clone()).await?;
        Ok(budget)
    }

    /// Record the difference between an `estimate` and the `actual` cost
    /// observed after execution, for later accuracy tuning. Does not itself
    /// adjust any budget's `spent` beyond what `update_spending` already
    /// applied from the estimate.
    #[must_use]
    pub fn reconcile(&self, estimated_cost: f64, actual_cost: f64) -> CostReconciliation {
        CostReconciliation::new(estimated_cost, actual_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyrouter_mock::InMemoryStateStore;
    use keyrouter_types::BudgetScope;

    fn controller() -> CostController {
        CostController::new(Arc::new(InMemoryStateStore::new()))
    }

    #[tokio::test]
    async fn hard_budget_blocks_overage() {
        let ctrl = controller();
        let mut budget =
            Budget::new("global", BudgetScope::Global, None, 100.0, EnforcementMode::Hard).unwrap();
        budget.spent = 99.0;
        ctrl.put_budget(budget).await.unwrap();

        let result = ctrl.check_budget(2.0, "openai", "k1").await.unwrap();
        assert!(!result.allowed);
        assert!(result.would_exceed);
        assert_eq!(result.violated_budgets, vec!["global".to_string()]);
        assert!((result.remaining_budget - (-1.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn soft_budget_allows_but_flags_violation() {
        let ctrl = controller();
        let mut budget =
            Budget::new("global", BudgetScope::Global, None, 100.0, EnforcementMode::Soft).unwrap();
        budget.spent = 99.0;
        ctrl.put_budget(budget).await.unwrap();

        let result = ctrl.check_budget(2.0, "openai", "k1").await.unwrap();
        assert!(result.allowed);
        assert!(result.would_exceed);
    }

    #[tokio::test]
    async fn per_provider_budget_ignored_for_other_providers() {
        let ctrl = controller();
        let budget = Budget::new(
            "openai-budget",
            BudgetScope::PerProvider,
            Some("openai".to_string()),
            10.0,
            EnforcementMode::Hard,
        )
        .unwrap();
        ctrl.put_budget(budget).await.unwrap();

        let result = ctrl.check_budget(5.0, "anthropic", "k1").await.unwrap();
        assert!(result.allowed);
        assert!(result.violated_budgets.is_empty());
    }

    #[tokio::test]
    async fn update_spending_then_reconcile() {
        let ctrl = controller();
        let budget =
            Budget::new("global", BudgetScope::Global, None, 100.0, EnforcementMode::Hard).unwrap();
        ctrl.put_budget(budget).await.unwrap();
        let updated = ctrl.update_spending("global", 5.0).await.unwrap();
        assert_eq!(updated.spent, 5.0);

        let reconciliation = ctrl.reconcile(5.0, 6.0);
        assert_eq!(reconciliation.error_amount, 1.0);
    }
}
