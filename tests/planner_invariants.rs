//! Universal planner invariants
//!
//! Every case plans a tagged predicate tree, checks structural
//! invariants of the produced solution, then round-trips it: a
//! reference evaluation of the plan over an in-memory corpus must
//! return exactly the documents the original predicate matches.

use std::collections::BTreeSet;

use briardb::expr::{Expr, ExprKind, NearQuery};
use briardb::index::{IndexEntry, KeyKind, KeyPattern};
use briardb::planner::{AccessPlanner, CanonicalQuery, PlannerParams};
use briardb::solution::{IndexScanNode, SolutionNode, SortPattern};
use serde_json::{json, Value};

// =============================================================================
// Corpus
// =============================================================================

fn corpus() -> Vec<Value> {
    vec![
        json!({"_id": 1, "a": 5, "b": 7, "x": 5, "name": "barbara"}),
        json!({"_id": 2, "a": 5, "b": 9, "name": "foo"}),
        json!({"_id": 3, "a": 1, "b": 2, "name": "bar"}),
        json!({"_id": 4, "a": [5, 6], "b": 7}),
        json!({"_id": 5, "a": 2, "b": [7, 8]}),
        json!({"_id": 6, "arr": [{"k": 1}, {"k": 2}]}),
        json!({"_id": 7, "arr": [{"k": 1}]}),
        json!({"_id": 8, "e": [{"b": 1, "c": 9}, {"b": 9, "c": 2}]}),
        json!({"_id": 9, "e": [{"b": 1, "c": 2}]}),
        json!({"_id": 10, "b": 3}),
        json!({"_id": 11, "category": "news", "title": "hi world"}),
        json!({"_id": 12, "category": "sports", "title": "hi"}),
        json!({"_id": 13, "loc": [2.0, 1.0], "x": 5}),
        json!({"_id": 14, "loc": [50.0, 50.0], "x": 5}),
    ]
}

// =============================================================================
// Reference Plan Evaluation
// =============================================================================

/// Terminal values of a dotted path, plus the elements of terminal
/// arrays — the values an index would extract keys from.
fn field_values(doc: &Value, path: &str) -> Vec<Value> {
    fn resolve<'a>(doc: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
        match segments.split_first() {
            None => out.push(doc),
            Some((head, rest)) => match doc {
                Value::Object(m) => {
                    if let Some(v) = m.get(*head) {
                        resolve(v, rest, out);
                    }
                }
                Value::Array(elements) => {
                    for element in elements {
                        if element.is_object() {
                            resolve(element, segments, out);
                        }
                    }
                }
                _ => {}
            },
        }
    }
    let segments: Vec<&str> = path.split('.').collect();
    let mut terminals = Vec::new();
    resolve(doc, &segments, &mut terminals);
    let mut values = Vec::new();
    for terminal in terminals {
        values.push(terminal.clone());
        if let Value::Array(elements) = terminal {
            values.extend(elements.iter().cloned());
        }
    }
    values
}

fn oil_accepts(field: &briardb::bounds::OrderedIntervalList, value: &Value) -> bool {
    field
        .intervals
        .iter()
        .any(|iv| iv.contains_value(value) || iv.reversed().contains_value(value))
}

fn scan_accepts(scan: &IndexScanNode, doc: &Value) -> bool {
    assert!(
        scan.bounds.simple_range.is_none(),
        "reference evaluation covers field bounds only"
    );
    scan.bounds.fields.iter().all(|field| {
        field_values(doc, &field.path)
            .iter()
            .any(|v| oil_accepts(field, v))
    })
}

fn passes_filter(filter: Option<&Expr>, doc: &Value) -> bool {
    filter.map_or(true, |f| f.matches(doc))
}

fn execute(node: &SolutionNode, docs: &[Value]) -> BTreeSet<usize> {
    match node {
        SolutionNode::CollectionScan(n) => docs
            .iter()
            .enumerate()
            .filter(|(_, d)| passes_filter(n.filter.as_ref(), d))
            .map(|(i, _)| i)
            .collect(),
        SolutionNode::IndexScan(n) => docs
            .iter()
            .enumerate()
            .filter(|(_, d)| scan_accepts(n, d) && passes_filter(n.filter.as_ref(), d))
            .map(|(i, _)| i)
            .collect(),
        SolutionNode::Geo2d(n) => {
            let path = n.key_pattern.part(0).unwrap().path.clone();
            let pred = Expr::geo_within(path, n.region.clone());
            docs.iter()
                .enumerate()
                .filter(|(_, d)| pred.matches(d) && passes_filter(n.filter.as_ref(), d))
                .map(|(i, _)| i)
                .collect()
        }
        SolutionNode::GeoNear2dSphere(n) => {
            let geo_path = n
                .key_pattern
                .parts()
                .iter()
                .find(|p| p.kind == KeyKind::Geo2dSphere)
                .unwrap()
                .path
                .clone();
            let pred = Expr::geo_near(geo_path, n.near.clone());
            docs.iter()
                .enumerate()
                .filter(|(_, d)| {
                    pred.matches(d)
                        && n.base_bounds.fields.iter().all(|field| {
                            field.is_unassigned()
                                || field_values(d, &field.path).iter().any(|v| oil_accepts(field, v))
                        })
                        && passes_filter(n.filter.as_ref(), d)
                })
                .map(|(i, _)| i)
                .collect()
        }
        SolutionNode::Text(n) => {
            let pred = Expr::text(n.query.clone(), n.language.clone());
            docs.iter()
                .enumerate()
                .filter(|(_, d)| {
                    pred.matches(d)
                        && n.index_prefix
                            .iter()
                            .all(|(path, value)| Expr::eq(path.clone(), value.clone()).matches(d))
                        && passes_filter(n.filter.as_ref(), d)
                })
                .map(|(i, _)| i)
                .collect()
        }
        SolutionNode::Fetch(n) => execute(&n.child, docs)
            .into_iter()
            .filter(|i| passes_filter(n.filter.as_ref(), &docs[*i]))
            .collect(),
        SolutionNode::And(n) => {
            let mut sets = n.children.iter().map(|c| execute(c, docs));
            let first = sets.next().unwrap_or_default();
            sets.fold(first, |acc, s| acc.intersection(&s).copied().collect())
        }
        SolutionNode::Or(n) => n
            .children
            .iter()
            .flat_map(|c| execute(c, docs))
            .collect(),
        SolutionNode::MergeSort(n) => n
            .children
            .iter()
            .flat_map(|c| execute(c, docs))
            .collect(),
    }
}

// =============================================================================
// Structural Invariants
// =============================================================================

fn walk<'n>(node: &'n SolutionNode, visit: &mut impl FnMut(&'n SolutionNode)) {
    visit(node);
    for child in node.children() {
        walk(child, visit);
    }
}

fn count_tagged(root: &Expr) -> usize {
    let mut count = usize::from(root.effective_tag().is_some() && !root.is_logical());
    for child in root.children() {
        count += count_tagged(child);
    }
    count
}

fn check_invariants(root: &Expr, solution: &SolutionNode, indices: &[IndexEntry]) {
    let mut leaf_count = 0;
    walk(solution, &mut |node| match node {
        SolutionNode::IndexScan(scan) => {
            leaf_count += 1;
            let entry = indices
                .iter()
                .find(|e| e.name == scan.index_name)
                .expect("scan references a known index");
            // Finished bounds cover every key position by field name with
            // at least one interval.
            assert_eq!(scan.bounds.fields.len(), entry.key_pattern.len());
            for (field, part) in scan.bounds.fields.iter().zip(entry.key_pattern.parts()) {
                assert_eq!(field.path, part.path);
                assert!(!field.intervals.is_empty());
            }
            // A covered filter must never ride a multikey scan.
            if scan.multikey {
                assert!(
                    scan.filter.is_none(),
                    "multikey scan must not carry an in-stage filter"
                );
            }
        }
        SolutionNode::Text(text) => {
            leaf_count += 1;
            let entry = indices
                .iter()
                .find(|e| e.name == text.index_name)
                .expect("text stage references a known index");
            let prefix_end = entry
                .key_pattern
                .parts()
                .iter()
                .take_while(|p| p.kind != KeyKind::Text)
                .count();
            if prefix_end > 0 {
                assert_eq!(text.index_prefix.len(), prefix_end);
                for ((path, _), part) in text.index_prefix.iter().zip(entry.key_pattern.parts()) {
                    assert_eq!(path, &part.path);
                }
            } else {
                assert!(text.index_prefix.is_empty());
            }
        }
        SolutionNode::Geo2d(_) | SolutionNode::GeoNear2dSphere(_) => leaf_count += 1,
        SolutionNode::Or(or) => {
            for child in &or.children {
                branch_is_self_contained(child);
            }
        }
        SolutionNode::MergeSort(ms) => {
            for child in &ms.children {
                branch_is_self_contained(child);
            }
        }
        _ => {}
    });
    assert!(
        leaf_count <= count_tagged(root).max(1),
        "more index leaves than tagged predicates"
    );
}

/// A union branch may not rely on an ancestor to re-check its residual:
/// it is a fetch, or a leaf whose own filter (if any) is key-evaluable.
fn branch_is_self_contained(node: &SolutionNode) {
    match node {
        SolutionNode::Fetch(_) => {}
        SolutionNode::IndexScan(scan) => {
            if scan.filter.is_some() {
                assert!(!scan.multikey);
            }
        }
        SolutionNode::Text(_) | SolutionNode::Geo2d(_) | SolutionNode::GeoNear2dSphere(_) => {}
        other => panic!("unexpected union branch: {}", other.stage_name()),
    }
}

// =============================================================================
// Case Driver
// =============================================================================

fn verify_case(root: Expr, indices: Vec<IndexEntry>, sort: Option<SortPattern>) -> SolutionNode {
    let docs = corpus();
    let mut query = CanonicalQuery::new("docs", root.clone());
    if let Some(sort) = sort {
        query = query.with_sort(sort);
    }
    let params = PlannerParams::default();
    let planner = AccessPlanner::new(&query, &indices, &params);
    let solution = planner
        .build_indexed_data_access(root.clone())
        .expect("case must produce an indexed plan");

    check_invariants(&root, &solution, &indices);

    let expected: BTreeSet<usize> = docs
        .iter()
        .enumerate()
        .filter(|(_, d)| root.matches(d))
        .map(|(i, _)| i)
        .collect();
    let actual = execute(&solution, &docs);
    assert_eq!(
        actual, expected,
        "plan and predicate disagree on the corpus"
    );
    solution
}

// =============================================================================
// Cases
// =============================================================================

#[test]
fn test_single_equality_exact() {
    verify_case(
        Expr::and(vec![Expr::eq("x", json!(5)).tagged(0, 0)]),
        vec![IndexEntry::new("x_1", KeyPattern::ascending(&["x"]))],
        None,
    );
}

#[test]
fn test_multikey_compound_refetches() {
    verify_case(
        Expr::and(vec![
            Expr::eq("a", json!(5)).tagged(0, 0),
            Expr::eq("b", json!(7)).tagged(0, 1),
        ]),
        vec![IndexEntry::new("a_1_b_1", KeyPattern::ascending(&["a", "b"])).multikey(true)],
        None,
    );
}

#[test]
fn test_or_of_multikey_branches() {
    verify_case(
        Expr::or(vec![
            Expr::eq("a", json!(5)).tagged(0, 0),
            Expr::eq("b", json!(2)).tagged(1, 0),
        ]),
        vec![
            IndexEntry::new("a_1", KeyPattern::ascending(&["a"])).multikey(true),
            IndexEntry::new("b_1", KeyPattern::ascending(&["b"])).multikey(true),
        ],
        None,
    );
}

#[test]
fn test_range_conjunction_intersects() {
    verify_case(
        Expr::and(vec![
            Expr::gte("x", json!(3)).tagged(0, 0),
            Expr::lt("x", json!(6)).tagged(0, 0),
        ]),
        vec![IndexEntry::new("x_1", KeyPattern::ascending(&["x"]))],
        None,
    );
}

#[test]
fn test_anchored_regex_covered_filter() {
    verify_case(
        Expr::and(vec![Expr::regex("name", "^bar").tagged(0, 0)]),
        vec![IndexEntry::new("name_1", KeyPattern::ascending(&["name"]))],
        None,
    );
}

#[test]
fn test_elem_match_same_element_recheck() {
    let inner = Expr::and(vec![
        Expr::eq("e.b", json!(1)).tagged(0, 0),
        Expr::eq("e.c", json!(2)).tagged(0, 1),
    ]);
    // Doc 8 holds b=1 and c=2 on different elements: the scan admits it,
    // the fetch filter must reject it.
    let solution = verify_case(
        Expr::elem_match_object("e", vec![inner]).tagged(0, 0),
        vec![IndexEntry::new("eb_1_ec_1", KeyPattern::ascending(&["e.b", "e.c"])).multikey(true)],
        None,
    );
    assert!(matches!(solution, SolutionNode::Fetch(_)));
}

#[test]
fn test_text_with_prefix_round_trip() {
    verify_case(
        Expr::and(vec![
            Expr::text("hi", "english").tagged(0, 1),
            Expr::eq("category", json!("news")).tagged(0, 0),
        ]),
        vec![IndexEntry::new(
            "category_1_text",
            KeyPattern::of(&[("category", KeyKind::Ascending), ("_fts", KeyKind::Text)]),
        )],
        None,
    );
}

#[test]
fn test_near_with_equality_round_trip() {
    let near = NearQuery {
        point: [2.0, 1.0],
        max_distance: Some(0.01),
        spherical: true,
    };
    verify_case(
        Expr::and(vec![
            Expr::geo_near("loc", near).tagged(0, 0),
            Expr::eq("x", json!(5)).tagged(0, 1),
        ]),
        vec![IndexEntry::new(
            "loc_2dsphere_x_1",
            KeyPattern::of(&[("loc", KeyKind::Geo2dSphere), ("x", KeyKind::Ascending)]),
        )],
        None,
    );
}

#[test]
fn test_residual_untagged_conjunct_goes_to_fetch() {
    let solution = verify_case(
        Expr::and(vec![
            Expr::eq("x", json!(5)).tagged(0, 0),
            Expr::gt("b", json!(6)),
        ]),
        vec![IndexEntry::new("x_1", KeyPattern::ascending(&["x"]))],
        None,
    );
    let SolutionNode::Fetch(fetch) = &solution else {
        panic!("expected FETCH, got {}", solution.stage_name());
    };
    assert!(matches!(
        fetch.filter.as_ref().unwrap().kind,
        ExprKind::Gt { .. }
    ));
}

#[test]
fn test_merge_sorted_or_round_trip() {
    verify_case(
        Expr::or(vec![
            Expr::eq("x", json!(5)).tagged(0, 0),
            Expr::eq("name", json!("bar")).tagged(1, 0),
        ]),
        vec![
            IndexEntry::new("x_1_id_1", KeyPattern::ascending(&["x", "_id"])),
            IndexEntry::new("name_1_id_1", KeyPattern::ascending(&["name", "_id"])),
        ],
        Some(SortPattern::of(&[("_id", 1)])),
    );
}

#[test]
fn test_in_set_round_trip() {
    verify_case(
        Expr::and(vec![
            Expr::is_in("x", vec![json!(4), json!(5)]).tagged(0, 0)
        ]),
        vec![IndexEntry::new("x_1", KeyPattern::ascending(&["x"]))],
        None,
    );
}

#[test]
fn test_all_clauses_round_trip() {
    let first = Expr::elem_match_object(
        "arr",
        vec![Expr::and(vec![Expr::eq("arr.k", json!(1)).tagged(0, 0)])],
    )
    .tagged(0, 0);
    let second = Expr::elem_match_object(
        "arr",
        vec![Expr::and(vec![Expr::eq("arr.k", json!(2)).tagged(0, 0)])],
    )
    .tagged(0, 0);
    verify_case(
        Expr::all("arr", vec![first, second]).tagged(0, 0),
        vec![IndexEntry::new("arrk_1", KeyPattern::ascending(&["arr.k"])).multikey(true)],
        None,
    );
}
