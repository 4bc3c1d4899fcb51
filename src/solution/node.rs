//! The query solution tree.
//!
//! A solution is an executable plan: scans at the leaves, fetches and
//! set operations above them. The planner moves predicate branches into
//! filter slots; execution stages re-check those residually.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::bounds::IndexBounds;
use crate::expr::{Expr, GeoRegion, NearQuery};
use crate::index::KeyPattern;

use super::sorts::{SortField, SortPattern};

/// Full scan over a collection, filtering every document.
#[derive(Debug, Clone)]
pub struct CollectionScanNode {
    pub collection: String,
    pub filter: Option<Expr>,
    /// `1` forward, `-1` reverse.
    pub direction: i32,
    pub tailable: bool,
    pub max_scan: Option<u64>,
}

/// Bounded scan over one index.
#[derive(Debug, Clone)]
pub struct IndexScanNode {
    pub index_name: String,
    pub key_pattern: KeyPattern,
    pub multikey: bool,
    pub bounds: IndexBounds,
    /// `1` forward, `-1` reverse.
    pub direction: i32,
    pub filter: Option<Expr>,
    pub add_key_metadata: bool,
    pub max_scan: Option<u64>,
}

impl IndexScanNode {
    /// Turns a finished forward scan into the equivalent reverse scan.
    pub fn reverse_scan(&mut self) {
        self.bounds.reverse_all();
        self.direction = -self.direction;
    }

    /// The sort orders this scan provides: every contiguous run of the
    /// key pattern that starts at or before the end of the leading
    /// equality prefix (a position bound to a single point imposes no
    /// order of its own, so the suffix order shows through).
    pub fn provided_sorts(&self) -> BTreeSet<SortPattern> {
        let mut base = Vec::new();
        for part in self.key_pattern.parts() {
            if part.kind.is_special() {
                break;
            }
            base.push(SortField {
                path: part.path.clone(),
                direction: part.kind.direction() * self.direction,
            });
        }
        let mut equality_prefix = 0;
        if self.bounds.simple_range.is_none() {
            for field in self.bounds.fields.iter().take(base.len()) {
                if field.is_single_point() {
                    equality_prefix += 1;
                } else {
                    break;
                }
            }
        }
        let mut sorts = BTreeSet::new();
        let last_start = equality_prefix.min(base.len().saturating_sub(1));
        for start in 0..=last_start {
            for end in (start + 1)..=base.len() {
                sorts.insert(SortPattern(base[start..end].to_vec()));
            }
        }
        sorts
    }
}

/// Planar geo scan.
#[derive(Debug, Clone)]
pub struct Geo2dNode {
    pub index_name: String,
    pub key_pattern: KeyPattern,
    pub region: GeoRegion,
    pub filter: Option<Expr>,
}

/// Spherical nearest-first scan.
#[derive(Debug, Clone)]
pub struct GeoNear2dSphereNode {
    pub index_name: String,
    pub key_pattern: KeyPattern,
    pub near: NearQuery,
    /// Bounds over the non-geo key positions, used to constrain the
    /// candidate set the near traversal produces.
    pub base_bounds: IndexBounds,
    pub add_point_meta: bool,
    pub add_dist_meta: bool,
    pub filter: Option<Expr>,
}

/// Full-text scan. With a non-empty `index_prefix` the scan is confined
/// to one prefix partition of the text index.
#[derive(Debug, Clone)]
pub struct TextNode {
    pub index_name: String,
    pub key_pattern: KeyPattern,
    pub query: String,
    pub language: String,
    /// Equality values for the key positions ahead of the text sentinel,
    /// in key-pattern order.
    pub index_prefix: Vec<(String, Value)>,
    pub filter: Option<Expr>,
}

/// Document fetch wrapping one child, re-checking `filter` against the
/// full document.
#[derive(Debug, Clone)]
pub struct FetchNode {
    pub filter: Option<Expr>,
    pub child: Box<SolutionNode>,
}

/// How an intersection stage combines its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntersectKind {
    /// Hash intersection; emits in the order of its last child.
    Hash,
    /// Stream-merge intersection; requires every input in doc-id order.
    Sorted,
}

#[derive(Debug, Clone)]
pub struct AndNode {
    pub kind: IntersectKind,
    pub children: Vec<SolutionNode>,
}

#[derive(Debug, Clone)]
pub struct OrNode {
    pub children: Vec<SolutionNode>,
}

/// Union that interleaves pre-sorted children to preserve `sort`.
#[derive(Debug, Clone)]
pub struct MergeSortNode {
    pub sort: SortPattern,
    pub children: Vec<SolutionNode>,
}

/// One stage of an executable plan.
#[derive(Debug, Clone)]
pub enum SolutionNode {
    CollectionScan(CollectionScanNode),
    IndexScan(IndexScanNode),
    Geo2d(Geo2dNode),
    GeoNear2dSphere(GeoNear2dSphereNode),
    Text(TextNode),
    Fetch(FetchNode),
    And(AndNode),
    Or(OrNode),
    MergeSort(MergeSortNode),
}

impl SolutionNode {
    pub fn stage_name(&self) -> &'static str {
        match self {
            SolutionNode::CollectionScan(_) => "COLLSCAN",
            SolutionNode::IndexScan(_) => "IXSCAN",
            SolutionNode::Geo2d(_) => "GEO_2D",
            SolutionNode::GeoNear2dSphere(_) => "GEO_NEAR_2DSPHERE",
            SolutionNode::Text(_) => "TEXT",
            SolutionNode::Fetch(_) => "FETCH",
            SolutionNode::And(AndNode {
                kind: IntersectKind::Hash,
                ..
            }) => "AND_HASH",
            SolutionNode::And(AndNode {
                kind: IntersectKind::Sorted,
                ..
            }) => "AND_SORTED",
            SolutionNode::Or(_) => "OR",
            SolutionNode::MergeSort(_) => "SORT_MERGE",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, SolutionNode::Text(_))
    }

    /// The residual-filter slot, for stages that have one.
    pub fn filter_slot_mut(&mut self) -> Option<&mut Option<Expr>> {
        match self {
            SolutionNode::CollectionScan(n) => Some(&mut n.filter),
            SolutionNode::IndexScan(n) => Some(&mut n.filter),
            SolutionNode::Geo2d(n) => Some(&mut n.filter),
            SolutionNode::GeoNear2dSphere(n) => Some(&mut n.filter),
            SolutionNode::Text(n) => Some(&mut n.filter),
            SolutionNode::Fetch(n) => Some(&mut n.filter),
            _ => None,
        }
    }

    pub fn filter(&self) -> Option<&Expr> {
        match self {
            SolutionNode::CollectionScan(n) => n.filter.as_ref(),
            SolutionNode::IndexScan(n) => n.filter.as_ref(),
            SolutionNode::Geo2d(n) => n.filter.as_ref(),
            SolutionNode::GeoNear2dSphere(n) => n.filter.as_ref(),
            SolutionNode::Text(n) => n.filter.as_ref(),
            SolutionNode::Fetch(n) => n.filter.as_ref(),
            _ => None,
        }
    }

    /// Child stages, for tree walks.
    pub fn children(&self) -> Vec<&SolutionNode> {
        match self {
            SolutionNode::Fetch(n) => vec![n.child.as_ref()],
            SolutionNode::And(n) => n.children.iter().collect(),
            SolutionNode::Or(n) => n.children.iter().collect(),
            SolutionNode::MergeSort(n) => n.children.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// True when the stage emits documents in doc-id order, the property
    /// stream-merge intersection needs.
    pub fn sorted_by_doc_id(&self) -> bool {
        match self {
            SolutionNode::IndexScan(n) => {
                n.bounds.simple_range.is_none()
                    && !n.bounds.fields.is_empty()
                    && n.bounds
                        .fields
                        .iter()
                        .all(|f| f.is_single_point())
            }
            SolutionNode::Fetch(n) => n.child.sorted_by_doc_id(),
            _ => false,
        }
    }

    /// The set of sort orders this stage provides.
    pub fn provided_sorts(&self) -> BTreeSet<SortPattern> {
        match self {
            SolutionNode::IndexScan(n) => n.provided_sorts(),
            SolutionNode::Fetch(n) => n.child.provided_sorts(),
            SolutionNode::MergeSort(n) => {
                let mut sorts = BTreeSet::new();
                sorts.insert(n.sort.clone());
                sorts
            }
            SolutionNode::And(n) if n.kind == IntersectKind::Hash => n
                .children
                .last()
                .map(|c| c.provided_sorts())
                .unwrap_or_default(),
            _ => BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::{IndexBoundsBuilder, Interval, OrderedIntervalList};
    use crate::index::{IndexEntry, KeyKind};
    use serde_json::json;

    fn scan_over(pattern: KeyPattern) -> IndexScanNode {
        let bounds = IndexBoundsBuilder::all_values_bounds(&pattern);
        IndexScanNode {
            index_name: "test".into(),
            key_pattern: pattern,
            multikey: false,
            bounds,
            direction: 1,
            filter: None,
            add_key_metadata: false,
            max_scan: None,
        }
    }

    #[test]
    fn test_full_pattern_sort_provided() {
        let scan = scan_over(KeyPattern::ascending(&["a", "b"]));
        let sorts = scan.provided_sorts();
        assert!(sorts.contains(&SortPattern::of(&[("a", 1), ("b", 1)])));
        assert!(sorts.contains(&SortPattern::of(&[("a", 1)])));
        assert!(!sorts.contains(&SortPattern::of(&[("b", 1)])));
    }

    #[test]
    fn test_equality_prefix_exposes_suffix_sort() {
        let mut scan = scan_over(KeyPattern::ascending(&["a", "b"]));
        scan.bounds.fields[0] =
            OrderedIntervalList::with_intervals("a", vec![Interval::point(json!(5))]);
        let sorts = scan.provided_sorts();
        assert!(sorts.contains(&SortPattern::of(&[("b", 1)])));
    }

    #[test]
    fn test_reverse_scan_flips_directions() {
        let mut scan = scan_over(KeyPattern::of(&[
            ("a", KeyKind::Ascending),
            ("b", KeyKind::Descending),
        ]));
        scan.reverse_scan();
        assert_eq!(scan.direction, -1);
        let sorts = scan.provided_sorts();
        assert!(sorts.contains(&SortPattern::of(&[("a", -1), ("b", 1)])));
    }

    #[test]
    fn test_sorted_by_doc_id_requires_all_points() {
        let mut scan = scan_over(KeyPattern::ascending(&["a", "b"]));
        assert!(!SolutionNode::IndexScan(scan.clone()).sorted_by_doc_id());
        scan.bounds.fields[0] =
            OrderedIntervalList::with_intervals("a", vec![Interval::point(json!(1))]);
        scan.bounds.fields[1] =
            OrderedIntervalList::with_intervals("b", vec![Interval::point(json!(2))]);
        let node = SolutionNode::IndexScan(scan);
        assert!(node.sorted_by_doc_id());

        let fetch = SolutionNode::Fetch(FetchNode {
            filter: None,
            child: Box::new(node),
        });
        assert!(fetch.sorted_by_doc_id());
    }

    #[test]
    fn test_special_part_truncates_sorts() {
        let entry = IndexEntry::new(
            "loc",
            KeyPattern::of(&[("loc", KeyKind::Geo2dSphere), ("x", KeyKind::Ascending)]),
        );
        let scan = scan_over(entry.key_pattern);
        assert!(scan.provided_sorts().is_empty());
    }
}
