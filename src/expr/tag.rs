//! Index tags and the enumerator child-ordering contract.

use super::node::{Expr, ExprKind};

/// The index assignment the plan enumerator leaves on a predicate.
///
/// `index` addresses the candidate index list handed to the planner;
/// `pos` is the key-pattern position the predicate's field occupies in
/// that index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IndexTag {
    pub index: usize,
    pub pos: usize,
}

impl IndexTag {
    pub fn new(index: usize, pos: usize) -> Self {
        Self { index, pos }
    }
}

/// Orders a logical node's children the way the access planner expects:
/// tagged children before untagged ones, near and text predicates first
/// among the tagged (they must open their leaf before ordinary predicates
/// merge into it), then by `(index, pos)`.
///
/// The sort is stable, so children the key does not distinguish keep
/// their canonical order.
pub fn sort_children_for_access(children: &mut [Expr]) {
    children.sort_by_key(|child| match child.effective_tag() {
        Some(tag) => {
            let class = if matches!(
                child.kind,
                ExprKind::GeoNear { .. } | ExprKind::Text { .. }
            ) {
                0usize
            } else {
                1
            };
            (class, tag.index, tag.pos)
        }
        None => (2, usize::MAX, usize::MAX),
    });
}
