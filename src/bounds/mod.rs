//! Index-key intervals and the bounds builder.
//!
//! Predicates become per-position interval lists; lists combine by
//! compounding, intersection or union; every translation carries a
//! tightness verdict that tells the planner where residual filtering
//! must happen.

mod builder;
mod interval;
mod list;
pub mod ordering;

pub use builder::{BoundsError, BoundsResult, IndexBoundsBuilder, Tightness};
pub use interval::{Endpoint, Interval};
pub use list::{IndexBounds, OrderedIntervalList, SimpleRange};
