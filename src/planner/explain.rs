//! Deterministic explain rendering for solution trees.

use serde_json::{json, Map, Value};

use crate::expr::{Expr, ExprKind};
use crate::solution::{IntersectKind, SolutionNode};

/// Renders a solution tree as a JSON document, one object per stage.
pub fn explain(node: &SolutionNode) -> Value {
    let mut out = Map::new();
    out.insert("stage".into(), json!(node.stage_name()));

    match node {
        SolutionNode::CollectionScan(n) => {
            out.insert("collection".into(), json!(n.collection));
            out.insert("direction".into(), json!(n.direction));
            if n.tailable {
                out.insert("tailable".into(), json!(true));
            }
        }
        SolutionNode::IndexScan(n) => {
            out.insert("index".into(), json!(n.index_name));
            out.insert("multikey".into(), json!(n.multikey));
            out.insert("direction".into(), json!(n.direction));
            if let Some(range) = &n.bounds.simple_range {
                out.insert(
                    "range".into(),
                    json!({
                        "startKey": range.start_key,
                        "endKey": range.end_key,
                        "endKeyInclusive": range.end_key_inclusive,
                    }),
                );
            } else {
                let mut bounds = Map::new();
                for field in &n.bounds.fields {
                    let intervals: Vec<Value> = field
                        .intervals
                        .iter()
                        .map(|iv| json!(iv.to_string()))
                        .collect();
                    bounds.insert(field.path.clone(), Value::Array(intervals));
                }
                out.insert("bounds".into(), Value::Object(bounds));
            }
        }
        SolutionNode::Geo2d(n) => {
            out.insert("index".into(), json!(n.index_name));
        }
        SolutionNode::GeoNear2dSphere(n) => {
            out.insert("index".into(), json!(n.index_name));
            out.insert("point".into(), json!(n.near.point));
            let mut bounds = Map::new();
            for field in &n.base_bounds.fields {
                let intervals: Vec<Value> = field
                    .intervals
                    .iter()
                    .map(|iv| json!(iv.to_string()))
                    .collect();
                bounds.insert(field.path.clone(), Value::Array(intervals));
            }
            out.insert("baseBounds".into(), Value::Object(bounds));
        }
        SolutionNode::Text(n) => {
            out.insert("index".into(), json!(n.index_name));
            out.insert("query".into(), json!(n.query));
            out.insert("language".into(), json!(n.language));
            if !n.index_prefix.is_empty() {
                let mut prefix = Map::new();
                for (path, value) in &n.index_prefix {
                    prefix.insert(path.clone(), value.clone());
                }
                out.insert("indexPrefix".into(), Value::Object(prefix));
            }
        }
        SolutionNode::MergeSort(n) => {
            let sort: Map<String, Value> = n
                .sort
                .fields()
                .iter()
                .map(|f| (f.path.clone(), json!(f.direction)))
                .collect();
            out.insert("sort".into(), Value::Object(sort));
        }
        SolutionNode::And(n) => {
            out.insert(
                "strategy".into(),
                json!(match n.kind {
                    IntersectKind::Hash => "hash",
                    IntersectKind::Sorted => "sorted",
                }),
            );
        }
        SolutionNode::Fetch(_) | SolutionNode::Or(_) => {}
    }

    if let Some(filter) = node.filter() {
        out.insert("filter".into(), expr_to_value(filter));
    }

    let children = node.children();
    match children.len() {
        0 => {}
        1 => {
            out.insert("inputStage".into(), explain(children[0]));
        }
        _ => {
            out.insert(
                "inputStages".into(),
                Value::Array(children.into_iter().map(explain).collect()),
            );
        }
    }
    Value::Object(out)
}

/// Renders a predicate in query-operator form.
pub fn expr_to_value(expr: &Expr) -> Value {
    fn leaf(path: &str, op: &str, value: Value) -> Value {
        json!({ path: { op: value } })
    }
    match &expr.kind {
        ExprKind::Eq { path, value } => leaf(path, "$eq", value.clone()),
        ExprKind::Gt { path, value } => leaf(path, "$gt", value.clone()),
        ExprKind::Gte { path, value } => leaf(path, "$gte", value.clone()),
        ExprKind::Lt { path, value } => leaf(path, "$lt", value.clone()),
        ExprKind::Lte { path, value } => leaf(path, "$lte", value.clone()),
        ExprKind::In { path, values } => leaf(path, "$in", json!(values)),
        ExprKind::Regex { path, pattern } => leaf(path, "$regex", json!(pattern)),
        ExprKind::Exists { path, exists } => leaf(path, "$exists", json!(exists)),
        ExprKind::Type { path, expected } => leaf(path, "$type", json!(format!("{expected:?}"))),
        ExprKind::Mod {
            path,
            divisor,
            remainder,
        } => leaf(path, "$mod", json!([divisor, remainder])),
        ExprKind::GeoWithin { path, region } => leaf(
            path,
            "$geoWithin",
            json!({ "center": region.center, "radius": region.radius }),
        ),
        ExprKind::GeoNear { path, near } => leaf(path, "$near", json!(near.point)),
        ExprKind::Text { query, language } => {
            json!({ "$text": { "$search": query, "$language": language } })
        }
        ExprKind::And(children) => {
            json!({ "$and": children.iter().map(expr_to_value).collect::<Vec<_>>() })
        }
        ExprKind::Or(children) => {
            json!({ "$or": children.iter().map(expr_to_value).collect::<Vec<_>>() })
        }
        ExprKind::Nor(children) => {
            json!({ "$nor": children.iter().map(expr_to_value).collect::<Vec<_>>() })
        }
        ExprKind::Not(child) => json!({ "$not": expr_to_value(child) }),
        ExprKind::ElemMatchObject { path, children }
        | ExprKind::ElemMatchValue { path, children } => leaf(
            path,
            "$elemMatch",
            json!(children.iter().map(expr_to_value).collect::<Vec<_>>()),
        ),
        ExprKind::All { path, children } => leaf(
            path,
            "$all",
            json!(children.iter().map(expr_to_value).collect::<Vec<_>>()),
        ),
    }
}
