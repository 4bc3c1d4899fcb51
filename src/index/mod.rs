//! Index catalog types consumed by the planner.
//!
//! The planner never touches index storage; it reads catalog entries and
//! addresses them by position in the candidate list a query was planned
//! against.

mod entry;

pub use entry::{IndexEntry, IndexType, KeyKind, KeyPart, KeyPattern};
