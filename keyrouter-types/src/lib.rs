//! Shared data transfer objects and configuration primitives for the
//! keyrouter workspace: key/quota/budget/policy/routing models and the
//! unified error taxonomy.
#![warn(missing_docs)]

mod config;
mod error;
pub mod models;

pub use config::{
    BackoffConfig, EncryptionConfig, FetchStrategy, QuotaConfig, QuotaConsumptionStrategy,
    RouterConfig,
};
pub use error::{ErrorCategory, RouterError};
pub use models::{
    APIKey, AlternativeRoute, Budget, BudgetCheckResult, BudgetScope, CapacityState, CostEstimate,
    CostReconciliation, EnforcementMode, EstimationMethod, HealthState, HealthStatus, KeyState,
    Message, ObjectiveType, Policy, PolicyResult, PolicyScope, PolicyType, QuotaState,
    RequestIntent, ResponseMetadata, RoutingDecision, RoutingObjective, StateTransition,
    SystemResponse, TokenUsage,
};
