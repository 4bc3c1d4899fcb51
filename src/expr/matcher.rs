//! Predicate evaluation against documents.
//!
//! This is the reference evaluator used for residual filters: no type
//! coercion, missing fields never match (except `$eq: null` and
//! `$exists: false`), and a predicate on a field holding an array matches
//! if any element matches.

use serde_json::Value;

use crate::bounds::ordering::value_cmp;

use super::node::{Expr, ExprKind, GeoRegion, NearQuery, ValueType};

impl Expr {
    /// Evaluates this predicate against a document.
    pub fn matches(&self, doc: &Value) -> bool {
        self.matches_with_prefix(doc, "")
    }

    /// Evaluates with `strip` removed from the front of every leaf path.
    ///
    /// Array operators pass their own path down as the prefix so their
    /// children, which carry full dotted paths, resolve relative to the
    /// array element under test.
    fn matches_with_prefix(&self, doc: &Value, strip: &str) -> bool {
        match &self.kind {
            ExprKind::And(children) => children.iter().all(|c| c.matches_with_prefix(doc, strip)),
            ExprKind::Or(children) => children.iter().any(|c| c.matches_with_prefix(doc, strip)),
            ExprKind::Nor(children) => !children.iter().any(|c| c.matches_with_prefix(doc, strip)),
            ExprKind::Not(child) => !child.matches_with_prefix(doc, strip),

            ExprKind::Eq { path, value } => {
                let candidates = resolve(doc, relative(path, strip));
                if value.is_null() && candidates.is_empty() {
                    // Equality with null also matches a missing field.
                    return true;
                }
                any_candidate(&candidates, |v| value_cmp(v, value).is_eq())
            }
            ExprKind::Gt { path, value } => {
                let candidates = resolve(doc, relative(path, strip));
                any_candidate(&candidates, |v| range_match(v, value, |o| o.is_gt()))
            }
            ExprKind::Gte { path, value } => {
                let candidates = resolve(doc, relative(path, strip));
                any_candidate(&candidates, |v| range_match(v, value, |o| o.is_ge()))
            }
            ExprKind::Lt { path, value } => {
                let candidates = resolve(doc, relative(path, strip));
                any_candidate(&candidates, |v| range_match(v, value, |o| o.is_lt()))
            }
            ExprKind::Lte { path, value } => {
                let candidates = resolve(doc, relative(path, strip));
                any_candidate(&candidates, |v| range_match(v, value, |o| o.is_le()))
            }
            ExprKind::In { path, values } => {
                let candidates = resolve(doc, relative(path, strip));
                if values.iter().any(Value::is_null) && candidates.is_empty() {
                    return true;
                }
                any_candidate(&candidates, |v| {
                    values.iter().any(|m| value_cmp(v, m).is_eq())
                })
            }
            ExprKind::Regex { path, pattern } => {
                let candidates = resolve(doc, relative(path, strip));
                let re = match regex::Regex::new(pattern) {
                    Ok(re) => re,
                    Err(_) => return false,
                };
                any_candidate(&candidates, |v| match v {
                    Value::String(s) => re.is_match(s),
                    _ => false,
                })
            }
            ExprKind::Exists { path, exists } => {
                let candidates = resolve(doc, relative(path, strip));
                candidates.is_empty() != *exists
            }
            ExprKind::Type { path, expected } => {
                let candidates = resolve(doc, relative(path, strip));
                if *expected == ValueType::Array {
                    return candidates.iter().any(|v| v.is_array());
                }
                any_candidate(&candidates, |v| ValueType::of(v) == *expected)
            }
            ExprKind::Mod {
                path,
                divisor,
                remainder,
            } => {
                if *divisor == 0 {
                    return false;
                }
                let candidates = resolve(doc, relative(path, strip));
                any_candidate(&candidates, |v| match v.as_f64() {
                    Some(f) => (f.trunc() as i64) % *divisor == *remainder,
                    None => false,
                })
            }
            ExprKind::GeoWithin { path, region } => {
                let candidates = resolve(doc, relative(path, strip));
                candidates
                    .iter()
                    .filter_map(|v| extract_point(v))
                    .any(|p| region.contains(p))
            }
            ExprKind::GeoNear { path, near } => {
                let candidates = resolve(doc, relative(path, strip));
                candidates
                    .iter()
                    .filter_map(|v| extract_point(v))
                    .any(|p| near.admits(p))
            }
            ExprKind::Text { query, .. } => text_matches(doc, query),

            ExprKind::ElemMatchObject { path, children } => {
                let candidates = resolve(doc, relative(path, strip));
                candidates.iter().any(|v| match v {
                    Value::Array(elements) => elements.iter().any(|element| {
                        children
                            .iter()
                            .all(|c| c.matches_with_prefix(element, path))
                    }),
                    _ => false,
                })
            }
            ExprKind::ElemMatchValue { path, children } => {
                let candidates = resolve(doc, relative(path, strip));
                candidates.iter().any(|v| match v {
                    Value::Array(elements) => elements
                        .iter()
                        .any(|element| children.iter().all(|c| c.matches_value(element))),
                    _ => false,
                })
            }
            ExprKind::All { path: _, children } => children
                .iter()
                .all(|c| c.matches_with_prefix(doc, strip)),
        }
    }

    /// Evaluates a value-level predicate directly against `value`,
    /// ignoring paths. Used for `$elemMatch` value-form children.
    fn matches_value(&self, value: &Value) -> bool {
        match &self.kind {
            ExprKind::Eq { value: operand, .. } => value_cmp(value, operand).is_eq(),
            ExprKind::Gt { value: operand, .. } => range_match(value, operand, |o| o.is_gt()),
            ExprKind::Gte { value: operand, .. } => range_match(value, operand, |o| o.is_ge()),
            ExprKind::Lt { value: operand, .. } => range_match(value, operand, |o| o.is_lt()),
            ExprKind::Lte { value: operand, .. } => range_match(value, operand, |o| o.is_le()),
            ExprKind::In { values, .. } => values.iter().any(|m| value_cmp(value, m).is_eq()),
            ExprKind::Regex { pattern, .. } => match (regex::Regex::new(pattern), value) {
                (Ok(re), Value::String(s)) => re.is_match(s),
                _ => false,
            },
            ExprKind::Type { expected, .. } => ValueType::of(value) == *expected,
            ExprKind::Mod {
                divisor, remainder, ..
            } => match (value.as_f64(), *divisor) {
                (_, 0) => false,
                (Some(f), d) => (f.trunc() as i64) % d == *remainder,
                _ => false,
            },
            ExprKind::Not(child) => !child.matches_value(value),
            ExprKind::And(children) => children.iter().all(|c| c.matches_value(value)),
            ExprKind::Or(children) => children.iter().any(|c| c.matches_value(value)),
            _ => false,
        }
    }
}

impl GeoRegion {
    /// Whether the region contains the point.
    pub fn contains(&self, point: [f64; 2]) -> bool {
        distance(self.center, point, self.spherical) <= self.radius
    }
}

impl NearQuery {
    /// Whether a point is admissible for this near query.
    pub fn admits(&self, point: [f64; 2]) -> bool {
        match self.max_distance {
            Some(max) => distance(self.point, point, self.spherical) <= max,
            None => true,
        }
    }
}

fn distance(a: [f64; 2], b: [f64; 2], spherical: bool) -> f64 {
    if spherical {
        // Haversine over a unit sphere; callers scale by their radius.
        let (lng1, lat1) = (a[0].to_radians(), a[1].to_radians());
        let (lng2, lat2) = (b[0].to_radians(), b[1].to_radians());
        let dlat = lat2 - lat1;
        let dlng = lng2 - lng1;
        let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * h.sqrt().asin()
    } else {
        ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
    }
}

/// Reads a point from a `[x, y]` pair or a GeoJSON `Point`.
fn extract_point(value: &Value) -> Option<[f64; 2]> {
    match value {
        Value::Array(a) if a.len() == 2 => Some([a[0].as_f64()?, a[1].as_f64()?]),
        Value::Object(m) => {
            if m.get("type").and_then(Value::as_str) == Some("Point") {
                extract_point(m.get("coordinates")?)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn text_matches(doc: &Value, query: &str) -> bool {
    let mut haystack = Vec::new();
    collect_strings(doc, &mut haystack);
    query.split_whitespace().any(|term| {
        let term = term.to_lowercase();
        haystack.iter().any(|s| s.to_lowercase().contains(&term))
    })
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(a) => a.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(m) => m.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

/// Strips an array-operator prefix from a full dotted path.
fn relative<'p>(path: &'p str, strip: &str) -> &'p str {
    if path == strip {
        return "";
    }
    if strip.is_empty() {
        return path;
    }
    match path.strip_prefix(strip) {
        Some(rest) => rest.strip_prefix('.').unwrap_or(rest),
        None => path,
    }
}

/// Resolves a dotted path to the set of terminal values, descending into
/// arrays of documents along the way.
fn resolve<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut frontier = vec![doc];
    if path.is_empty() {
        return frontier;
    }
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in frontier {
            match value {
                Value::Object(m) => {
                    if let Some(v) = m.get(segment) {
                        next.push(v);
                    }
                }
                Value::Array(elements) => {
                    for element in elements {
                        if let Value::Object(m) = element {
                            if let Some(v) = m.get(segment) {
                                next.push(v);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        frontier = next;
    }
    frontier
}

/// A leaf comparison holds if any terminal value, or any element of a
/// terminal array, satisfies it.
fn any_candidate(candidates: &[&Value], pred: impl Fn(&Value) -> bool) -> bool {
    candidates.iter().any(|v| {
        if pred(v) {
            return true;
        }
        match v {
            Value::Array(elements) => elements.iter().any(&pred),
            _ => false,
        }
    })
}

/// Ordered comparisons only apply within a type bracket.
fn range_match(
    value: &Value,
    operand: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    if ValueType::of(value) != ValueType::of(operand) {
        return false;
    }
    accept(value_cmp(value, operand))
}
