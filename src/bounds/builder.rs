//! Translation of predicates into index-key intervals.
//!
//! Each translation reports a tightness verdict alongside its intervals:
//! the verdict tells the planner whether the scan alone proves the
//! predicate, whether the index key carries enough data to re-check it
//! in-stage, or whether the full document is needed.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::expr::{Expr, ExprKind, ValueType};
use crate::index::{IndexEntry, KeyKind, KeyPart, KeyPattern};

use super::interval::{Endpoint, Interval};
use super::list::{IndexBounds, OrderedIntervalList};
use super::ordering::prefix_successor;

/// What an index scan's bounds guarantee about a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tightness {
    /// The bounds admit exactly the matching documents.
    Exact,
    /// The bounds over-approximate, but the index key holds enough data
    /// to evaluate the predicate without fetching the document.
    InexactCovered,
    /// The bounds over-approximate and the document must be fetched and
    /// re-checked.
    InexactFetch,
}

#[derive(Debug, Clone, Error)]
pub enum BoundsError {
    /// The planner asked for bounds on a node that cannot produce them;
    /// the enumerator tagging is ill-formed.
    #[error("cannot translate {kind} into index bounds")]
    Untranslatable { kind: &'static str },
}

pub type BoundsResult<T> = Result<T, BoundsError>;

/// Stateless translator from predicates to interval lists.
pub struct IndexBoundsBuilder;

impl IndexBoundsBuilder {
    /// Translates `expr` against the `key_part`-th field of `index`,
    /// replacing `out`'s contents.
    pub fn translate(
        expr: &Expr,
        key_part: &KeyPart,
        index: &IndexEntry,
        out: &mut OrderedIntervalList,
    ) -> BoundsResult<Tightness> {
        let (intervals, tightness) = Self::intervals_for(expr, key_part, index)?;
        out.path = key_part.path.clone();
        out.intervals = intervals;
        out.normalize();
        // A key sourced from one array element cannot prove a predicate
        // about the whole document.
        if index.multikey {
            return Ok(Tightness::InexactFetch);
        }
        Ok(tightness)
    }

    /// Translates `expr` and intersects with the intervals already at
    /// this position (AND on an already-bound position).
    pub fn translate_and_intersect(
        expr: &Expr,
        key_part: &KeyPart,
        index: &IndexEntry,
        out: &mut OrderedIntervalList,
    ) -> BoundsResult<Tightness> {
        let mut scratch = OrderedIntervalList::default();
        let tightness = Self::translate(expr, key_part, index, &mut scratch)?;
        out.path = key_part.path.clone();
        out.intersect_with(&scratch.intervals);
        Ok(tightness)
    }

    /// Translates `expr` and unions with the intervals already at this
    /// position (OR on an already-bound position).
    pub fn translate_and_union(
        expr: &Expr,
        key_part: &KeyPart,
        index: &IndexEntry,
        out: &mut OrderedIntervalList,
    ) -> BoundsResult<Tightness> {
        let mut scratch = OrderedIntervalList::default();
        let tightness = Self::translate(expr, key_part, index, &mut scratch)?;
        out.path = key_part.path.clone();
        out.union_with(scratch.intervals);
        Ok(tightness)
    }

    /// Binds a position to its field with the all-values interval.
    pub fn all_values_for_field(key_part: &KeyPart, out: &mut OrderedIntervalList) {
        out.path = key_part.path.clone();
        out.intervals = vec![Interval::all_values()];
    }

    /// All-values bounds across an entire key pattern.
    pub fn all_values_bounds(key_pattern: &KeyPattern) -> IndexBounds {
        let mut bounds = IndexBounds::sized(key_pattern.len());
        for (field, part) in bounds.fields.iter_mut().zip(key_pattern.parts()) {
            Self::all_values_for_field(part, field);
        }
        bounds
    }

    /// Orders every interval list to match its key part's direction.
    /// Translation always produces ascending lists; descending key parts
    /// scan their field the other way.
    pub fn align_bounds(bounds: &mut IndexBounds, key_pattern: &KeyPattern) {
        for (field, part) in bounds.fields.iter_mut().zip(key_pattern.parts()) {
            if part.kind.direction() == -1 {
                field.reverse();
            }
        }
    }

    fn intervals_for(
        expr: &Expr,
        key_part: &KeyPart,
        index: &IndexEntry,
    ) -> BoundsResult<(Vec<Interval>, Tightness)> {
        // Special key parts never order plain values; anything the
        // planner routes at them scans the whole field.
        match key_part.kind {
            KeyKind::Hashed => {
                return Ok(match &expr.kind {
                    ExprKind::Eq { value, .. } => {
                        (vec![Interval::point(value.clone())], Tightness::InexactFetch)
                    }
                    _ => (vec![Interval::all_values()], Tightness::InexactFetch),
                });
            }
            KeyKind::Geo2d | KeyKind::Geo2dSphere => {
                return Ok((vec![Interval::all_values()], Tightness::InexactFetch));
            }
            KeyKind::Text => {
                return Err(BoundsError::Untranslatable { kind: "text key" });
            }
            KeyKind::Ascending | KeyKind::Descending => {}
        }

        let translated = match &expr.kind {
            ExprKind::Eq { value, .. } => Self::equality_intervals(value),
            ExprKind::Gt { value, .. } => Self::range_intervals(value, RangeSide::Above, false),
            ExprKind::Gte { value, .. } => Self::range_intervals(value, RangeSide::Above, true),
            ExprKind::Lt { value, .. } => Self::range_intervals(value, RangeSide::Below, false),
            ExprKind::Lte { value, .. } => Self::range_intervals(value, RangeSide::Below, true),
            ExprKind::In { values, .. } => {
                let mut intervals = Vec::new();
                let mut tightness = Tightness::Exact;
                for member in values {
                    let (ivs, t) = Self::equality_intervals(member);
                    intervals.extend(ivs);
                    tightness = weakest(tightness, t);
                }
                (intervals, tightness)
            }
            ExprKind::Regex { pattern, .. } => Self::regex_intervals(pattern),
            ExprKind::Exists { exists, .. } => {
                if *exists {
                    (vec![Interval::all_values()], Tightness::InexactFetch)
                } else {
                    (vec![Interval::point(Value::Null)], Tightness::InexactFetch)
                }
            }
            ExprKind::Type { expected, .. } => {
                (vec![type_bracket(*expected)], Tightness::InexactFetch)
            }
            ExprKind::Mod { .. } => {
                (vec![type_bracket(ValueType::Number)], Tightness::InexactCovered)
            }
            ExprKind::Not(child) => {
                let (intervals, tightness) = Self::intervals_for(child, key_part, index)?;
                let mut list = OrderedIntervalList::with_intervals(&key_part.path, intervals);
                list.complement();
                let tightness = match tightness {
                    Tightness::Exact => Tightness::Exact,
                    _ => Tightness::InexactFetch,
                };
                (list.intervals, tightness)
            }
            ExprKind::ElemMatchValue { children, .. } => {
                let mut list = OrderedIntervalList::with_intervals(
                    &key_part.path,
                    vec![Interval::all_values()],
                );
                for child in children {
                    let (intervals, _) = Self::intervals_for(child, key_part, index)?;
                    list.intersect_with(&intervals);
                }
                (list.intervals, Tightness::InexactFetch)
            }
            ExprKind::GeoWithin { .. } => (vec![Interval::all_values()], Tightness::InexactFetch),
            kind => {
                return Err(BoundsError::Untranslatable {
                    kind: Expr::new(kind.clone()).kind_name(),
                })
            }
        };
        Ok(translated)
    }

    fn equality_intervals(value: &Value) -> (Vec<Interval>, Tightness) {
        match value {
            // null also matches a missing field, which the key cannot show.
            Value::Null => (vec![Interval::point(Value::Null)], Tightness::InexactFetch),
            // An array equality matches the array itself or, through
            // element expansion, keys on its first element.
            Value::Array(elements) => {
                let mut intervals = vec![Interval::point(value.clone())];
                if let Some(first) = elements.first() {
                    intervals.push(Interval::point(first.clone()));
                }
                (intervals, Tightness::InexactFetch)
            }
            _ => (vec![Interval::point(value.clone())], Tightness::Exact),
        }
    }

    fn range_intervals(value: &Value, side: RangeSide, inclusive: bool) -> (Vec<Interval>, Tightness) {
        if value.is_null() {
            // Ordered comparisons with null match nothing we can bound.
            return (Vec::new(), Tightness::InexactFetch);
        }
        let bracket = type_bracket(ValueType::of(value));
        let interval = match side {
            RangeSide::Above => Interval::new(
                Endpoint::Val(value.clone()),
                inclusive,
                bracket.end,
                bracket.end_inclusive,
            ),
            RangeSide::Below => Interval::new(
                bracket.start,
                bracket.start_inclusive,
                Endpoint::Val(value.clone()),
                inclusive,
            ),
        };
        let tightness = if value.is_array() {
            Tightness::InexactFetch
        } else {
            Tightness::Exact
        };
        if interval.is_nonempty() {
            (vec![interval], tightness)
        } else {
            (Vec::new(), tightness)
        }
    }

    fn regex_intervals(pattern: &str) -> (Vec<Interval>, Tightness) {
        if let Some(prefix) = literal_prefix(pattern) {
            let interval = Interval::new(
                Endpoint::Val(Value::String(prefix.clone())),
                true,
                Endpoint::Val(Value::String(prefix_successor(&prefix))),
                false,
            );
            return (vec![interval], Tightness::InexactCovered);
        }
        (vec![type_bracket(ValueType::String)], Tightness::InexactCovered)
    }
}

enum RangeSide {
    Above,
    Below,
}

fn weakest(a: Tightness, b: Tightness) -> Tightness {
    use Tightness::*;
    match (a, b) {
        (InexactFetch, _) | (_, InexactFetch) => InexactFetch,
        (InexactCovered, _) | (_, InexactCovered) => InexactCovered,
        _ => Exact,
    }
}

/// The interval covering every value of one type.
///
/// Brackets are expressed with real values where the canonical ordering
/// provides a fence: `true` is the greatest value below the numbers, `""`
/// the least value above them, and so on.
fn type_bracket(t: ValueType) -> Interval {
    let empty_array = || Value::Array(Vec::new());
    let empty_object = || Value::Object(Map::new());
    match t {
        ValueType::Null => Interval::point(Value::Null),
        ValueType::Bool => Interval::new(
            Endpoint::Val(Value::Bool(false)),
            true,
            Endpoint::Val(Value::Bool(true)),
            true,
        ),
        ValueType::Number => Interval::new(
            Endpoint::Val(Value::Bool(true)),
            false,
            Endpoint::Val(Value::String(String::new())),
            false,
        ),
        ValueType::String => Interval::new(
            Endpoint::Val(Value::String(String::new())),
            true,
            Endpoint::Val(empty_array()),
            false,
        ),
        ValueType::Array => Interval::new(
            Endpoint::Val(empty_array()),
            true,
            Endpoint::Val(empty_object()),
            false,
        ),
        ValueType::Object => Interval::new(
            Endpoint::Val(empty_object()),
            true,
            Endpoint::MaxKey,
            true,
        ),
    }
}

/// The literal prefix of an anchored pattern, if the anchor region is
/// free of regex metacharacters.
fn literal_prefix(pattern: &str) -> Option<String> {
    let body = pattern.strip_prefix('^')?;
    let mut prefix = String::new();
    for c in body.chars() {
        if c.is_alphanumeric() || matches!(c, ' ' | '_' | '-' | '/' | ':' | '@') {
            prefix.push(c);
        } else {
            break;
        }
    }
    (!prefix.is_empty()).then_some(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::KeyPattern;
    use serde_json::json;

    fn btree(multikey: bool) -> IndexEntry {
        IndexEntry::new("a_1", KeyPattern::ascending(&["a"])).multikey(multikey)
    }

    fn part() -> KeyPart {
        KeyPart {
            path: "a".to_string(),
            kind: KeyKind::Ascending,
        }
    }

    #[test]
    fn test_equality_is_exact_point() {
        let mut oil = OrderedIntervalList::default();
        let t =
            IndexBoundsBuilder::translate(&Expr::eq("a", json!(5)), &part(), &btree(false), &mut oil)
                .unwrap();
        assert_eq!(t, Tightness::Exact);
        assert_eq!(oil.path, "a");
        assert!(oil.is_single_point());
    }

    #[test]
    fn test_multikey_downgrades_to_fetch() {
        let mut oil = OrderedIntervalList::default();
        let t =
            IndexBoundsBuilder::translate(&Expr::eq("a", json!(5)), &part(), &btree(true), &mut oil)
                .unwrap();
        assert_eq!(t, Tightness::InexactFetch);
        assert!(oil.is_single_point());
    }

    #[test]
    fn test_range_is_type_bracketed() {
        let mut oil = OrderedIntervalList::default();
        let t =
            IndexBoundsBuilder::translate(&Expr::lt("a", json!(10)), &part(), &btree(false), &mut oil)
                .unwrap();
        assert_eq!(t, Tightness::Exact);
        assert!(oil.contains_value(&json!(5)));
        assert!(oil.contains_value(&json!(-1000)));
        assert!(!oil.contains_value(&json!(10)));
        assert!(!oil.contains_value(&json!(true)));
        assert!(!oil.contains_value(&json!("5")));
        assert!(!oil.contains_value(&json!(null)));
    }

    #[test]
    fn test_intersect_narrows_to_point() {
        let mut oil = OrderedIntervalList::default();
        IndexBoundsBuilder::translate(&Expr::eq("a", json!(5)), &part(), &btree(false), &mut oil)
            .unwrap();
        let t = IndexBoundsBuilder::translate_and_intersect(
            &Expr::lt("a", json!(10)),
            &part(),
            &btree(false),
            &mut oil,
        )
        .unwrap();
        assert_eq!(t, Tightness::Exact);
        assert!(oil.is_single_point());
        assert!(oil.contains_value(&json!(5)));
    }

    #[test]
    fn test_union_accumulates_points() {
        let mut oil = OrderedIntervalList::default();
        IndexBoundsBuilder::translate(&Expr::eq("a", json!(1)), &part(), &btree(false), &mut oil)
            .unwrap();
        IndexBoundsBuilder::translate_and_union(
            &Expr::eq("a", json!(7)),
            &part(),
            &btree(false),
            &mut oil,
        )
        .unwrap();
        assert_eq!(oil.intervals.len(), 2);
        assert!(oil.contains_value(&json!(1)));
        assert!(oil.contains_value(&json!(7)));
    }

    #[test]
    fn test_in_translates_to_point_union() {
        let mut oil = OrderedIntervalList::default();
        let t = IndexBoundsBuilder::translate(
            &Expr::is_in("a", vec![json!(3), json!(1)]),
            &part(),
            &btree(false),
            &mut oil,
        )
        .unwrap();
        assert_eq!(t, Tightness::Exact);
        assert_eq!(oil.intervals.len(), 2);
        // Sorted regardless of operand order.
        assert!(oil.intervals[0].contains_value(&json!(1)));
    }

    #[test]
    fn test_in_with_null_needs_fetch() {
        let mut oil = OrderedIntervalList::default();
        let t = IndexBoundsBuilder::translate(
            &Expr::is_in("a", vec![json!(3), json!(null)]),
            &part(),
            &btree(false),
            &mut oil,
        )
        .unwrap();
        assert_eq!(t, Tightness::InexactFetch);
    }

    #[test]
    fn test_anchored_regex_prefix_bounds() {
        let mut oil = OrderedIntervalList::default();
        let t = IndexBoundsBuilder::translate(
            &Expr::regex("a", "^foo"),
            &part(),
            &btree(false),
            &mut oil,
        )
        .unwrap();
        assert_eq!(t, Tightness::InexactCovered);
        assert!(oil.contains_value(&json!("foo")));
        assert!(oil.contains_value(&json!("foobar")));
        assert!(!oil.contains_value(&json!("fop")));
        assert!(!oil.contains_value(&json!("e")));
    }

    #[test]
    fn test_unanchored_regex_scans_all_strings() {
        let mut oil = OrderedIntervalList::default();
        let t = IndexBoundsBuilder::translate(
            &Expr::regex("a", "foo"),
            &part(),
            &btree(false),
            &mut oil,
        )
        .unwrap();
        assert_eq!(t, Tightness::InexactCovered);
        assert!(oil.contains_value(&json!("zzz")));
        assert!(!oil.contains_value(&json!(5)));
    }

    #[test]
    fn test_negation_complements() {
        let mut oil = OrderedIntervalList::default();
        let t = IndexBoundsBuilder::translate(
            &Expr::not(Expr::eq("a", json!(5))),
            &part(),
            &btree(false),
            &mut oil,
        )
        .unwrap();
        assert_eq!(t, Tightness::Exact);
        assert!(!oil.contains_value(&json!(5)));
        assert!(oil.contains_value(&json!(4)));
        assert!(oil.contains_value(&json!(6)));
        assert!(oil.contains_value(&json!("x")));
    }

    #[test]
    fn test_elem_match_value_intersects_children() {
        let mut oil = OrderedIntervalList::default();
        let em = Expr::elem_match_value(
            "a",
            vec![Expr::gt("a", json!(5)), Expr::lt("a", json!(10))],
        );
        let t = IndexBoundsBuilder::translate(&em, &part(), &btree(true), &mut oil).unwrap();
        assert_eq!(t, Tightness::InexactFetch);
        assert!(oil.contains_value(&json!(7)));
        assert!(!oil.contains_value(&json!(5)));
        assert!(!oil.contains_value(&json!(10)));
    }

    #[test]
    fn test_logical_node_is_untranslatable() {
        let mut oil = OrderedIntervalList::default();
        let err = IndexBoundsBuilder::translate(
            &Expr::and(vec![]),
            &part(),
            &btree(false),
            &mut oil,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_all_values_bounds() {
        let pattern = KeyPattern::ascending(&["a", "b"]);
        let bounds = IndexBoundsBuilder::all_values_bounds(&pattern);
        assert_eq!(bounds.fields.len(), 2);
        assert!(bounds.fields.iter().all(OrderedIntervalList::is_all_values));
        assert_eq!(bounds.fields[0].path, "a");
        assert_eq!(bounds.fields[1].path, "b");
    }

    #[test]
    fn test_align_reverses_descending_parts() {
        let pattern = KeyPattern::of(&[("a", KeyKind::Ascending), ("b", KeyKind::Descending)]);
        let mut bounds = IndexBoundsBuilder::all_values_bounds(&pattern);
        bounds.fields[1] = OrderedIntervalList::with_intervals(
            "b",
            vec![Interval::new(
                Endpoint::Val(json!(1)),
                true,
                Endpoint::Val(json!(5)),
                true,
            )],
        );
        IndexBoundsBuilder::align_bounds(&mut bounds, &pattern);
        assert_eq!(bounds.fields[1].intervals[0].start, Endpoint::Val(json!(5)));
    }
}
