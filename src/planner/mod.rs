//! Access-path planning for briardb queries.
//!
//! Given a canonical predicate tree whose leaves the plan enumerator has
//! tagged with index assignments, this subsystem builds the executable
//! query-solution tree: index scans with correct bounds at the leaves,
//! intersections, unions and merge-sorts above them, and residual
//! filters exactly where the bounds' tightness verdicts require a
//! re-check.
//!
//! # Design principles
//!
//! - Pure tree-to-tree: no I/O, no shared state, inputs owned for the
//!   duration of the call.
//! - One recoverable failure: "no indexed plan"; callers fall back to a
//!   collection scan.
//! - Ill-formed taggings are invariant violations, never worked around.

mod access;
mod errors;
mod explain;
mod indexability;
mod query;

pub use access::AccessPlanner;
pub use errors::{PlannerError, PlannerResult};
pub use explain::{expr_to_value, explain};
pub use indexability::{
    array_uses_index_on_children, is_bounds_generating, is_bounds_generating_not,
    node_can_use_index_on_own_field,
};
pub use query::{CanonicalQuery, HintSpec, PlannerParams, ProjectionFlags};
