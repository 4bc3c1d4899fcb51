//! The indexability oracle: which predicate nodes can drive an index.

use crate::expr::{Expr, ExprKind};

/// True when the node constrains its own field in a way the bounds
/// builder can translate (comparisons, geo, text, value `$elemMatch`).
pub fn node_can_use_index_on_own_field(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Eq { .. }
            | ExprKind::Gt { .. }
            | ExprKind::Gte { .. }
            | ExprKind::Lt { .. }
            | ExprKind::Lte { .. }
            | ExprKind::In { .. }
            | ExprKind::Regex { .. }
            | ExprKind::Exists { .. }
            | ExprKind::Type { .. }
            | ExprKind::Mod { .. }
            | ExprKind::GeoWithin { .. }
            | ExprKind::GeoNear { .. }
            | ExprKind::Text { .. }
            | ExprKind::ElemMatchValue { .. }
    )
}

/// True for a NOT directly over a translatable own-field predicate.
pub fn is_bounds_generating_not(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Not(child) => node_can_use_index_on_own_field(child),
        _ => false,
    }
}

/// True when the node, possibly through one NOT, produces index bounds
/// on its own field.
pub fn is_bounds_generating(expr: &Expr) -> bool {
    node_can_use_index_on_own_field(expr) || is_bounds_generating_not(expr)
}

/// True for array operators whose children carry the index tags:
/// `$all` and the object form of `$elemMatch`.
pub fn array_uses_index_on_children(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::All { .. } | ExprKind::ElemMatchObject { .. }
    )
}
