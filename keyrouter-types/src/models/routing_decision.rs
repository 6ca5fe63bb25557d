use serde::{Deserialize, Serialize};

use crate::error::RouterError;

/// A named routing objective a `RoutingEngine` strategy optimizes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ObjectiveType {
    /// Minimize estimated cost.
    Cost,
    /// Maximize success rate / avoid recently-failing keys.
    Reliability,
    /// Distribute load evenly across eligible keys.
    Fairness,
    /// Prefer providers the caller has marked as higher quality (not scored
    /// automatically; carried for forward compatibility, matching the
    /// original model's inclusion of an otherwise-unimplemented variant).
    Quality,
}

const ALLOWED_OBJECTIVE_STRINGS: [&str; 5] = ["cost", "reliability", "fairness", "quality", "latency"];

/// A weighted combination of primary/secondary objectives driving a route decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingObjective {
    /// Primary objective name (validated against `ALLOWED_OBJECTIVE_STRINGS`,
    /// which additionally allows `"latency"` even though it has no matching
    /// `ObjectiveType` variant, mirroring the original implementation).
    pub primary: String,
    /// Optional secondary objective name, same validation as `primary`.
    pub secondary: Option<String>,
    /// Weight given to the primary objective, `0.0..=1.0`.
    pub primary_weight: f64,
    /// Weight given to the secondary objective, `0.0..=1.0`.
    pub secondary_weight: f64,
}

impl RoutingObjective {
    /// Construct and validate a `RoutingObjective`.
    ///
    /// # Errors
    /// Returns `RouterError::InvalidArg` if either objective name is not
    /// recognized, or either weight is outside `[0, 1]`.
    pub fn new(
        primary: impl Into<String>,
        secondary: Option<String>,
        primary_weight: f64,
        secondary_weight: f64,
    ) -> Result<Self, RouterError> {
        let primary = primary.into();
        if !ALLOWED_OBJECTIVE_STRINGS.contains(&primary.as_str()) {
            return Err(RouterError::invalid_arg(format!(
                "unknown routing objective: {primary}"
            )));
        }
        if let Some(s) = &secondary {
            if !ALLOWED_OBJECTIVE_STRINGS.contains(&s.as_str()) {
                return Err(RouterError::invalid_arg(format!(
                    "unknown routing objective: {s}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&primary_weight) || !(0.0..=1.0).contains(&secondary_weight) {
            return Err(RouterError::invalid_arg(
                "objective weights must be within 0..=1",
            ));
        }
        Ok(Self {
            primary,
            secondary,
            primary_weight,
            secondary_weight,
        })
    }
}

/// A route that was considered but not selected, recorded for audit/debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternativeRoute {
    /// Key ID that was considered.
    pub key_id: String,
    /// Score this key received under the active strategy.
    pub score: f64,
    /// Why this route was not selected.
    pub reason: String,
}

/// The outcome of `RoutingEngine::select_key`: which key was chosen, why, and
/// what else was considered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Key ID selected for this request.
    pub selected_key_id: String,
    /// Score the selected key received.
    pub score: f64,
    /// Objective(s) that produced this decision.
    pub objective: RoutingObjective,
    /// Non-empty human-readable explanation of the decision.
    pub explanation: String,
    /// Other eligible keys that were considered but not selected.
    pub alternatives: Vec<AlternativeRoute>,
}

impl RoutingDecision {
    /// Construct a `RoutingDecision`, enforcing a non-empty explanation
    /// (`spec.md` §8 testable property: decisions are always explainable).
    ///
    /// # Errors
    /// Returns `RouterError::InvalidArg` if `explanation` is empty.
    pub fn new(
        selected_key_id: impl Into<String>,
        score: f64,
        objective: RoutingObjective,
        explanation: impl Into<String>,
        alternatives: Vec<AlternativeRoute>,
    ) -> Result<Self, RouterError> {
        let explanation = explanation.into();
        if explanation.is_empty() {
            return Err(RouterError::invalid_arg(
                "routing decision explanation must not be empty",
            ));
        }
        Ok(Self {
            selected_key_id: selected_key_id.into(),
            score,
            objective,
            explanation,
            alternatives,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_objective_name() {
        assert!(RoutingObjective::new("speed", None, 1.0, 0.0).is_err());
    }

    #[test]
    fn accepts_latency_despite_missing_enum_variant() {
        assert!(RoutingObjective::new("latency", None, 1.0, 0.0).is_ok());
    }

    #[test]
    fn rejects_empty_explanation() {
        let objective = RoutingObjective::new("cost", None, 1.0, 0.0).unwrap();
        assert!(RoutingDecision::new("k1", 0.9, objective, "", vec![]).is_err());
    }
}
