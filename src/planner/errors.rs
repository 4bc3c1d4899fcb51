//! Error types for the access planner.

use thiserror::Error;

use crate::bounds::BoundsError;

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;

/// Access-planning failures.
///
/// `NoIndexedPlan` is the only recoverable outcome: the tagged tree
/// cannot be turned into an indexed plan, and the caller should fall
/// back to a collection scan. Everything else means the enumerator
/// handed us an ill-formed tagging; proceeding would produce wrong
/// results, so those are never caught and retried.
#[derive(Debug, Clone, Error)]
pub enum PlannerError {
    /// No indexed plan can answer this predicate tree.
    #[error("no indexed plan: {reason}")]
    NoIndexedPlan { reason: String },

    /// An internal consistency condition failed.
    #[error("planner invariant violated: {0}")]
    InvariantViolation(String),
}

impl PlannerError {
    pub fn no_plan(reason: impl Into<String>) -> Self {
        Self::NoIndexedPlan {
            reason: reason.into(),
        }
    }

    pub fn invariant(condition: impl Into<String>) -> Self {
        let condition = condition.into();
        debug_assert!(false, "planner invariant violated: {condition}");
        Self::InvariantViolation(condition)
    }

    /// True for the recoverable no-plan outcome.
    pub fn is_no_plan(&self) -> bool {
        matches!(self, Self::NoIndexedPlan { .. })
    }
}

impl From<BoundsError> for PlannerError {
    fn from(err: BoundsError) -> Self {
        PlannerError::invariant(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_plan_is_recoverable() {
        let err = PlannerError::no_plan("or child not indexed");
        assert!(err.is_no_plan());
        assert!(err.to_string().contains("or child not indexed"));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "planner invariant violated")]
    fn test_invariant_aborts_debug_builds() {
        let _ = PlannerError::invariant("tag out of range");
    }
}
