//! Canonical predicate trees for briardb queries.
//!
//! The canonicalizer produces these trees; the plan enumerator tags their
//! leaves with index assignments; the access planner consumes them. The
//! module also carries the reference evaluator used for residual filters.

mod matcher;
mod node;
mod tag;

pub use node::{Expr, ExprKind, GeoRegion, NearQuery, ValueType};
pub use tag::{sort_children_for_access, IndexTag};
