//! Construction of query solution trees from tagged predicate trees.
//!
//! The plan enumerator has already decided which predicates use which
//! indexes; this module turns those decisions into an executable tree.
//! The work splits into leaf handling (build one scan from one
//! predicate, merge further predicates into it, finish its bounds) and
//! logical assembly (collect the leaves under an AND or OR, combine
//! them, and hang residual filters where the tightness verdicts demand
//! re-checking).
//!
//! The predicate tree is consumed: branches an index scan proves are
//! dropped, branches a scan can re-check from its key move onto the
//! scan, and everything else stays on the logical root to become the
//! filter of a wrapping fetch.

use tracing::{debug, trace, warn};

use crate::bounds::{IndexBounds, IndexBoundsBuilder, Tightness};
use crate::expr::{Expr, ExprKind};
use crate::index::{IndexEntry, KeyKind};
use crate::solution::{
    AndNode, CollectionScanNode, FetchNode, Geo2dNode, GeoNear2dSphereNode, IndexScanNode,
    IntersectKind, MergeSortNode, OrNode, SolutionNode, TextNode,
};

use super::errors::{PlannerError, PlannerResult};
use super::indexability;
use super::query::{CanonicalQuery, HintSpec, PlannerParams};

/// The logical context a predicate is being merged under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeKind {
    And,
    Or,
}

/// The in-flight leaf while walking a logical node's children.
#[derive(Default)]
struct ScanState {
    scan: Option<SolutionNode>,
    index: Option<usize>,
}

/// Builds access stages for one canonical query against one candidate
/// index list.
pub struct AccessPlanner<'a> {
    query: &'a CanonicalQuery,
    indices: &'a [IndexEntry],
    #[allow(dead_code)]
    params: &'a PlannerParams,
}

impl<'a> AccessPlanner<'a> {
    pub fn new(
        query: &'a CanonicalQuery,
        indices: &'a [IndexEntry],
        params: &'a PlannerParams,
    ) -> Self {
        Self {
            query,
            indices,
            params,
        }
    }

    /// Builds the indexed data-access tree for a tagged predicate tree.
    ///
    /// Consumes the tree: proven branches are dropped, the rest become
    /// residual filters inside the returned solution. A
    /// [`PlannerError::NoIndexedPlan`] result means the caller should
    /// fall back to [`AccessPlanner::make_collection_scan`].
    pub fn build_indexed_data_access(&self, mut root: Expr) -> PlannerResult<SolutionNode> {
        self.build_access(&mut root, false)
    }

    fn build_access(&self, root: &mut Expr, in_array_operator: bool) -> PlannerResult<SolutionNode> {
        if root.is_logical() && !indexability::is_bounds_generating_not(root) {
            return match &root.kind {
                ExprKind::And(_) => self.build_indexed_and(root, in_array_operator),
                ExprKind::Or(_) => self.build_indexed_or(root, in_array_operator),
                _ => Err(PlannerError::no_plan(
                    "negated logical nodes cannot be answered with an index",
                )),
            };
        }

        // Everything below is over a single field.
        let Some(tag) = root.effective_tag() else {
            return Err(PlannerError::no_plan(
                "predicate reached the planner without an index tag",
            ));
        };

        if indexability::is_bounds_generating(root) {
            let index = self.index(tag.index)?;
            let (mut leaf, tightness) = self.make_leaf_node(index, tag.pos, root)?;
            Self::finish_leaf_node(&mut leaf, index)?;

            if in_array_operator {
                // The enclosing array operator's fetch re-checks.
                return Ok(leaf);
            }

            return Ok(match tightness {
                // The scan alone admits exactly the matching documents.
                Tightness::Exact => leaf,
                // The key carries the data; re-check during the scan.
                Tightness::InexactCovered if !index.multikey => {
                    attach_filter(&mut leaf, take_expr(root))?;
                    leaf
                }
                // The document must be fetched and re-checked.
                _ => fetch(Some(take_expr(root)), leaf),
            });
        }

        if indexability::array_uses_index_on_children(root) {
            let solution = match &root.kind {
                ExprKind::All { .. } => {
                    // A conjunction of the indexed sub-clauses.
                    let mut built = Vec::new();
                    for child in root.children_mut() {
                        match self.build_access(child, true) {
                            Ok(node) => built.push(node),
                            Err(e) if e.is_no_plan() => continue,
                            Err(e) => return Err(e),
                        }
                    }
                    match built.len() {
                        0 => {
                            return Err(PlannerError::no_plan(
                                "no clause of the array conjunction is indexed",
                            ))
                        }
                        1 => built.pop().expect("one child"),
                        _ => SolutionNode::And(AndNode {
                            kind: IntersectKind::Hash,
                            children: built,
                        }),
                    }
                }
                ExprKind::ElemMatchObject { .. } => {
                    let children = root.children_mut();
                    if children.len() != 1 {
                        return Err(PlannerError::invariant(
                            "object $elemMatch must hold exactly one conjunction",
                        ));
                    }
                    self.build_access(&mut children[0], true)?
                }
                _ => {
                    return Err(PlannerError::invariant(
                        "array operator is neither $all nor object $elemMatch",
                    ))
                }
            };

            if in_array_operator {
                return Ok(solution);
            }

            // Index evidence is necessary but not sufficient under array
            // semantics; the fetch re-checks the whole operator.
            return Ok(fetch(Some(take_expr(root)), solution));
        }

        Err(PlannerError::no_plan(
            "tagged predicate cannot generate bounds or route an index to its children",
        ))
    }

    /// Collects the indexed leaves under a logical node.
    ///
    /// Walks the tagged children (the enumerator sorts tagged ahead of
    /// untagged), extending one in-flight scan with predicates that
    /// share its index and emitting it whenever the next child needs a
    /// different one. Children the scans prove are consumed; the rest
    /// are left on `root` for the caller's fetch filter.
    fn process_index_scans(
        &self,
        root: &mut Expr,
        in_array_operator: bool,
        out: &mut Vec<SolutionNode>,
    ) -> PlannerResult<()> {
        let merge_kind = match &root.kind {
            ExprKind::And(_) => MergeKind::And,
            ExprKind::Or(_) => MergeKind::Or,
            _ => return Err(PlannerError::invariant("scan collection over a non-AND/OR node")),
        };

        let mut state = ScanState::default();
        let mut residual = Vec::new();
        let mut children = root.take_children().into_iter();

        while let Some(mut child) = children.next() {
            let Some(tag) = child.effective_tag() else {
                // Tagged children come first; the rest stay residual.
                residual.push(child);
                residual.extend(children);
                break;
            };

            if !indexability::is_bounds_generating(&child) {
                // Indexed by virtue of its children.
                if merge_kind == MergeKind::And
                    && matches!(child.kind, ExprKind::ElemMatchObject { .. })
                {
                    // Compound with the tagged predicates inside the
                    // $elemMatch, but leave the operator itself on the
                    // root: the surrounding fetch must re-check it.
                    self.merge_elem_match_children(&child, tag.index, &mut state, out)?;
                    residual.push(child);
                    continue;
                }

                // A logical subtree fully evaluates itself; in an array
                // context it also stays behind for the enclosing fetch.
                let solution = self.build_access(&mut child, in_array_operator)?;
                out.push(solution);
                if in_array_operator {
                    residual.push(child);
                }
                continue;
            }

            let index = self.index(tag.index)?;
            let mergeable = state.index == Some(tag.index)
                && match &mut state.scan {
                    Some(scan) => {
                        Self::should_merge_with_leaf(index, tag.pos, scan, merge_kind)?
                    }
                    None => false,
                };

            if mergeable {
                let scan = state.scan.as_mut().expect("in-flight scan");
                let tightness =
                    Self::merge_with_leaf_node(&child, index, tag.pos, scan, merge_kind)?;
                trace!(
                    index = %index.name,
                    pos = tag.pos,
                    ?tightness,
                    "merged predicate into scan"
                );

                match tightness {
                    Tightness::Exact => {
                        // The bounds prove it; the branch is consumed.
                        drop(child);
                    }
                    Tightness::InexactCovered if index.is_text() || !index.multikey => {
                        // Early filter from the index key. Unsafe on
                        // multikey indexes, where the key under the
                        // cursor may come from a non-matching element.
                        attach_filter(scan, child)?;
                    }
                    _ if merge_kind == MergeKind::Or => {
                        // An OR branch's residual cannot float to the
                        // parent; fetch-wrap this branch now.
                        if let Some(mut finished) = state.scan.take() {
                            Self::finish_leaf_node(&mut finished, index)?;
                            out.push(fetch(Some(child), finished));
                        }
                        state.index = None;
                    }
                    _ => residual.push(child),
                }
            } else {
                self.flush_current(&mut state, out)?;
                state.index = Some(tag.index);

                let (leaf, tightness) = self.make_leaf_node(index, tag.pos, &child)?;
                state.scan = Some(leaf);
                trace!(
                    index = %index.name,
                    pos = tag.pos,
                    ?tightness,
                    "opened scan leaf"
                );

                match tightness {
                    Tightness::Exact if !in_array_operator => {
                        drop(child);
                    }
                    Tightness::InexactCovered if !index.multikey => {
                        let scan = state.scan.as_mut().expect("just opened");
                        attach_filter(scan, child)?;
                    }
                    _ if merge_kind == MergeKind::Or => {
                        if let Some(mut finished) = state.scan.take() {
                            Self::finish_leaf_node(&mut finished, index)?;
                            out.push(fetch(Some(child), finished));
                        }
                        state.index = None;
                    }
                    _ => residual.push(child),
                }
            }
        }

        self.flush_current(&mut state, out)?;
        root.set_children(residual);
        Ok(())
    }

    /// The inner walk for an object `$elemMatch` under an AND: compound
    /// its tagged inner predicates into the current scan. Differs from
    /// the outer walk in that nothing is consumed (the whole operator
    /// stays on the root) and the OR case cannot arise.
    fn merge_elem_match_children(
        &self,
        elem_match: &Expr,
        index_number: usize,
        state: &mut ScanState,
        out: &mut Vec<SolutionNode>,
    ) -> PlannerResult<()> {
        let mut inner = Vec::new();
        find_elem_match_children(elem_match, &mut inner);

        let index = self.index(index_number)?;
        for child in inner {
            let Some(tag) = child.effective_tag() else {
                return Err(PlannerError::invariant(
                    "inner $elemMatch predicate lost its tag",
                ));
            };

            let mergeable = state.index == Some(index_number)
                && match &mut state.scan {
                    Some(scan) => {
                        Self::should_merge_with_leaf(index, tag.pos, scan, MergeKind::And)?
                    }
                    None => false,
                };

            let tightness = if mergeable {
                let scan = state.scan.as_mut().expect("in-flight scan");
                Self::merge_with_leaf_node(child, index, tag.pos, scan, MergeKind::And)?
            } else {
                self.flush_current(state, out)?;
                state.index = Some(index_number);
                let (leaf, tightness) = self.make_leaf_node(index, tag.pos, child)?;
                state.scan = Some(leaf);
                tightness
            };

            if tightness == Tightness::InexactCovered && !index.multikey {
                // Optional early filter; the whole $elemMatch is
                // re-checked by the parent's fetch regardless.
                let scan = state.scan.as_mut().expect("in-flight scan");
                attach_filter(scan, child.clone())?;
            }
        }
        Ok(())
    }

    /// Assembles the leaves under an AND into an intersection, wrapped
    /// in a fetch when residual predicates remain.
    fn build_indexed_and(
        &self,
        root: &mut Expr,
        in_array_operator: bool,
    ) -> PlannerResult<SolutionNode> {
        let mut scans = Vec::new();
        self.process_index_scans(root, in_array_operator, &mut scans)?;

        if scans.is_empty() {
            return Err(PlannerError::no_plan(
                "conjunction produced no indexed leaves",
            ));
        }

        let and_result = if scans.len() == 1 {
            scans.pop().expect("one scan")
        } else if scans.iter().all(SolutionNode::sorted_by_doc_id) {
            SolutionNode::And(AndNode {
                kind: IntersectKind::Sorted,
                children: scans,
            })
        } else {
            // Hash intersection emits in its last child's order; if some
            // child provides the requested sort, rotate it to the end.
            let mut children = scans;
            if !self.query.sort.is_empty() {
                if let Some(i) = children
                    .iter()
                    .position(|c| c.provided_sorts().contains(&self.query.sort))
                {
                    let last = children.len() - 1;
                    children.swap(i, last);
                }
            }
            SolutionNode::And(AndNode {
                kind: IntersectKind::Hash,
                children,
            })
        };

        if in_array_operator {
            // The enclosing array operator adds its own fetch.
            return Ok(and_result);
        }

        if root.children().is_empty() {
            debug!(stage = and_result.stage_name(), "conjunction fully absorbed");
            return Ok(and_result);
        }

        // Whatever the scans could not answer is re-checked here.
        Ok(fetch(Some(take_unwrapped(root)), and_result))
    }

    /// Assembles the leaves under an OR into a union; every branch must
    /// be indexed.
    fn build_indexed_or(
        &self,
        root: &mut Expr,
        in_array_operator: bool,
    ) -> PlannerResult<SolutionNode> {
        let mut scans = Vec::new();
        self.process_index_scans(root, in_array_operator, &mut scans)?;

        if !in_array_operator && !root.children().is_empty() {
            warn!(
                residual = root.children().len(),
                "disjunction has a non-indexed child; no indexed plan"
            );
            return Err(PlannerError::no_plan("an OR branch cannot use an index"));
        }

        if scans.is_empty() {
            return Err(PlannerError::no_plan(
                "disjunction produced no indexed leaves",
            ));
        }

        if scans.len() == 1 {
            return Ok(scans.pop().expect("one scan"));
        }

        let should_merge_sort = !self.query.sort.is_empty() && {
            let mut shared = scans[0].provided_sorts();
            for child in &scans[1..] {
                if shared.is_empty() {
                    break;
                }
                let sorts = child.provided_sorts();
                shared = shared.intersection(&sorts).cloned().collect();
            }
            shared.contains(&self.query.sort)
        };

        // Text branches run first so scores exist before anything
        // consumes them; the partition is stable.
        let mut children = scans;
        children.sort_by_key(|c| !c.is_text());

        Ok(if should_merge_sort {
            SolutionNode::MergeSort(MergeSortNode {
                sort: self.query.sort.clone(),
                children,
            })
        } else {
            SolutionNode::Or(OrNode { children })
        })
    }

    /// Builds one solution leaf from one tagged predicate.
    ///
    /// Near predicates come first in a tagged child list precisely so
    /// this sees them before any ordinary predicate opens a plain index
    /// scan over the same compound index.
    fn make_leaf_node(
        &self,
        index: &IndexEntry,
        pos: usize,
        expr: &Expr,
    ) -> PlannerResult<(SolutionNode, Tightness)> {
        let first_is_2d = index
            .key_pattern
            .part(0)
            .is_some_and(|p| p.kind == KeyKind::Geo2d);

        if let ExprKind::GeoNear { near, .. } = &expr.kind {
            // Planar near needs a hard limit and is resolved upstream.
            if first_is_2d {
                return Err(PlannerError::invariant(
                    "planar near predicate reached the access planner",
                ));
            }
            let node = GeoNear2dSphereNode {
                index_name: index.name.clone(),
                key_pattern: index.key_pattern.clone(),
                near: near.clone(),
                base_bounds: IndexBounds::sized(index.key_pattern.len()),
                add_point_meta: self.query.projection.wants_geo_near_point,
                add_dist_meta: self.query.projection.wants_geo_near_distance,
                filter: None,
            };
            return Ok((SolutionNode::GeoNear2dSphere(node), Tightness::Exact));
        }

        if first_is_2d {
            let ExprKind::GeoWithin { region, .. } = &expr.kind else {
                return Err(PlannerError::invariant(
                    "planar index leaf requires a geo predicate",
                ));
            };
            let node = Geo2dNode {
                index_name: index.name.clone(),
                key_pattern: index.key_pattern.clone(),
                region: region.clone(),
                filter: None,
            };
            return Ok((SolutionNode::Geo2d(node), Tightness::Exact));
        }

        if let ExprKind::Text { query, language } = &expr.kind {
            let node = TextNode {
                index_name: index.name.clone(),
                key_pattern: index.key_pattern.clone(),
                query: query.clone(),
                language: language.clone(),
                index_prefix: Vec::new(),
                filter: None,
            };
            return Ok((SolutionNode::Text(node), Tightness::Exact));
        }

        let mut scan = IndexScanNode {
            index_name: index.name.clone(),
            key_pattern: index.key_pattern.clone(),
            multikey: index.multikey,
            bounds: IndexBounds::sized(index.key_pattern.len()),
            direction: 1,
            filter: None,
            add_key_metadata: self.query.return_key,
            max_scan: self.query.max_scan,
        };
        let part = index.key_pattern.part(pos).ok_or_else(|| {
            PlannerError::invariant(format!("key position {pos} outside {}", index.name))
        })?;
        let tightness =
            IndexBoundsBuilder::translate(expr, part, index, &mut scan.bounds.fields[pos])?;
        Ok((SolutionNode::IndexScan(scan), tightness))
    }

    /// Whether a predicate at `pos` may extend an existing leaf.
    fn should_merge_with_leaf(
        index: &IndexEntry,
        pos: usize,
        node: &SolutionNode,
        merge_kind: MergeKind,
    ) -> PlannerResult<bool> {
        match node {
            // These accumulate base bounds or prefix predicates freely.
            SolutionNode::Geo2d(_) | SolutionNode::Text(_) | SolutionNode::GeoNear2dSphere(_) => {
                Ok(true)
            }
            SolutionNode::IndexScan(scan) => {
                let Some(field) = scan.bounds.fields.get(pos) else {
                    return Err(PlannerError::invariant(
                        "merge position outside the scan's bounds",
                    ));
                };
                if field.is_unassigned() {
                    // Compounding a fresh position; the enumerator
                    // already decided this is sound.
                    return Ok(true);
                }
                Ok(match merge_kind {
                    // Intersecting bounds on one position is unsound when
                    // the values may come from different array elements.
                    MergeKind::And => !index.multikey,
                    // A union stays sound: any matching element still
                    // lands the document in the scanned range.
                    MergeKind::Or => true,
                })
            }
            _ => Err(PlannerError::invariant(
                "cannot merge a predicate into a non-leaf stage",
            )),
        }
    }

    /// Extends a leaf's bounds with one more predicate and reports the
    /// resulting tightness.
    fn merge_with_leaf_node(
        expr: &Expr,
        index: &IndexEntry,
        pos: usize,
        node: &mut SolutionNode,
        merge_kind: MergeKind,
    ) -> PlannerResult<Tightness> {
        let bounds = match node {
            SolutionNode::Geo2d(_) => return Ok(Tightness::InexactFetch),
            // Text covering is unlike any other covering; the prefix
            // equalities are resolved by the leaf finisher.
            SolutionNode::Text(_) => return Ok(Tightness::InexactCovered),
            SolutionNode::GeoNear2dSphere(n) => &mut n.base_bounds,
            SolutionNode::IndexScan(n) => &mut n.bounds,
            _ => {
                return Err(PlannerError::invariant(
                    "cannot merge a predicate into a non-leaf stage",
                ))
            }
        };

        let part = index.key_pattern.part(pos).ok_or_else(|| {
            PlannerError::invariant(format!("key position {pos} outside {}", index.name))
        })?;
        let Some(field) = bounds.fields.get_mut(pos) else {
            return Err(PlannerError::invariant(
                "merge position outside the leaf's bounds",
            ));
        };

        let tightness = if field.is_unassigned() {
            IndexBoundsBuilder::translate(expr, part, index, field)?
        } else {
            match merge_kind {
                MergeKind::And => {
                    IndexBoundsBuilder::translate_and_intersect(expr, part, index, field)?
                }
                MergeKind::Or => IndexBoundsBuilder::translate_and_union(expr, part, index, field)?,
            }
        };

        if matches!(node, SolutionNode::GeoNear2dSphere(_)) {
            // Spherical candidates still need the document re-checked.
            return Ok(Tightness::InexactFetch);
        }
        Ok(tightness)
    }

    /// Completes a leaf: binds every unassigned position to the
    /// all-values interval and aligns bounds to the key directions.
    fn finish_leaf_node(node: &mut SolutionNode, index: &IndexEntry) -> PlannerResult<()> {
        let bounds = match node {
            SolutionNode::Geo2d(_) => return Ok(()),
            SolutionNode::Text(_) => return Self::finish_text_node(node, index),
            SolutionNode::GeoNear2dSphere(n) => &mut n.base_bounds,
            SolutionNode::IndexScan(n) => &mut n.bounds,
            _ => {
                return Err(PlannerError::invariant(
                    "cannot finish a non-leaf stage",
                ))
            }
        };

        if bounds.simple_range.is_some() {
            return Ok(());
        }
        if bounds.fields.len() != index.key_pattern.len() {
            return Err(PlannerError::invariant(
                "bounds were not sized to the key pattern",
            ));
        }

        for (field, part) in bounds.fields.iter_mut().zip(index.key_pattern.parts()) {
            if field.is_unassigned() {
                if !field.intervals.is_empty() {
                    return Err(PlannerError::invariant(
                        "unassigned bounds position holds intervals",
                    ));
                }
                // A suffix key with no predicate scans all of its values,
                // e.g. {loc: "2dsphere", x: 1} with only a near on loc.
                IndexBoundsBuilder::all_values_for_field(part, field);
            }
        }

        IndexBoundsBuilder::align_bounds(bounds, &index.key_pattern);
        Ok(())
    }

    /// Extracts a text leaf's prefix equalities out of its filter into
    /// the index prefix, in key-pattern order.
    fn finish_text_node(node: &mut SolutionNode, index: &IndexEntry) -> PlannerResult<()> {
        let SolutionNode::Text(text) = node else {
            return Err(PlannerError::invariant("finishing a non-text stage as text"));
        };

        let prefix_end = index
            .key_pattern
            .parts()
            .iter()
            .take_while(|p| p.kind != KeyKind::Text)
            .count();
        if prefix_end == index.key_pattern.len() {
            return Err(PlannerError::invariant(
                "text index has no text key position",
            ));
        }
        if prefix_end == 0 {
            return Ok(());
        }

        // A text scan over a prefixed index is only possible when every
        // prefix position got an equality; those equalities were merged
        // into the leaf as covered filters.
        let Some(mut filter) = text.filter.take() else {
            return Err(PlannerError::invariant(
                "prefixed text leaf is missing its prefix equalities",
            ));
        };

        if matches!(filter.kind, ExprKind::Eq { .. }) {
            if prefix_end != 1 {
                return Err(PlannerError::invariant(
                    "single prefix equality for a multi-field prefix",
                ));
            }
            let ExprKind::Eq { path, value } = filter.kind else {
                unreachable!("checked above");
            };
            text.index_prefix = vec![(path, value)];
            return Ok(());
        }

        if !matches!(filter.kind, ExprKind::And(_)) {
            return Err(PlannerError::invariant(
                "text leaf filter is neither an equality nor a conjunction",
            ));
        }

        let mut slots: Vec<Option<Expr>> = (0..prefix_end).map(|_| None).collect();
        let mut rest = Vec::new();
        for child in filter.take_children() {
            match child.tag {
                Some(tag) if tag.pos < prefix_end => slots[tag.pos] = Some(child),
                Some(_) => rest.push(child),
                None => {
                    return Err(PlannerError::invariant(
                        "untagged predicate in a text leaf filter",
                    ))
                }
            }
        }
        for slot in slots {
            let Some(prefix_expr) = slot else {
                return Err(PlannerError::invariant(
                    "text prefix position has no equality",
                ));
            };
            let ExprKind::Eq { path, value } = prefix_expr.kind else {
                return Err(PlannerError::invariant(
                    "text prefix predicate is not an equality",
                ));
            };
            text.index_prefix.push((path, value));
        }
        match rest.len() {
            0 => {}
            1 => text.filter = rest.pop(),
            _ => {
                filter.set_children(rest);
                text.filter = Some(filter);
            }
        }
        Ok(())
    }

    /// Finishes and emits the in-flight scan, if any.
    fn flush_current(
        &self,
        state: &mut ScanState,
        out: &mut Vec<SolutionNode>,
    ) -> PlannerResult<()> {
        if let Some(mut scan) = state.scan.take() {
            let index_number = state
                .index
                .ok_or_else(|| PlannerError::invariant("in-flight scan without an index"))?;
            Self::finish_leaf_node(&mut scan, self.index(index_number)?)?;
            debug!(stage = scan.stage_name(), "emitting scan leaf");
            out.push(scan);
        }
        Ok(())
    }

    /// A scan over every key of `index`, fetch-wrapped unless the query
    /// predicate is empty. Used for sort-satisfying plans.
    pub fn scan_whole_index(&self, index: &IndexEntry, direction: i32) -> SolutionNode {
        let mut scan = IndexScanNode {
            index_name: index.name.clone(),
            key_pattern: index.key_pattern.clone(),
            multikey: index.multikey,
            bounds: IndexBoundsBuilder::all_values_bounds(&index.key_pattern),
            direction: 1,
            filter: None,
            add_key_metadata: self.query.return_key,
            max_scan: self.query.max_scan,
        };
        if direction == -1 {
            scan.reverse_scan();
        }
        self.wrap_with_root_filter(SolutionNode::IndexScan(scan))
    }

    /// A scan over the explicit key range `[start_key, end_key)`.
    pub fn make_index_scan(
        &self,
        index: &IndexEntry,
        start_key: serde_json::Value,
        end_key: serde_json::Value,
    ) -> SolutionNode {
        let scan = IndexScanNode {
            index_name: index.name.clone(),
            key_pattern: index.key_pattern.clone(),
            multikey: index.multikey,
            bounds: IndexBounds::simple(start_key, end_key, false),
            direction: 1,
            filter: None,
            add_key_metadata: self.query.return_key,
            max_scan: self.query.max_scan,
        };
        self.wrap_with_root_filter(SolutionNode::IndexScan(scan))
    }

    fn wrap_with_root_filter(&self, scan: SolutionNode) -> SolutionNode {
        let filter = self.query.root.clone();
        // find({}) needs no fetch filter at all.
        if matches!(&filter.kind, ExprKind::And(children) if children.is_empty()) {
            return scan;
        }
        // The whole predicate is re-checked; covered cases could skip
        // the fetch but this is always correct.
        fetch(Some(filter), scan)
    }

    /// The fallback plan: scan the collection and filter everything.
    pub fn make_collection_scan(&self, tailable: bool) -> SolutionNode {
        let mut direction = 1;
        // {$natural: -1} in the sort or hint reverses the walk.
        if let Some(d) = self.query.sort.field_direction("$natural") {
            direction = if d >= 0 { 1 } else { -1 };
        }
        if let Some(HintSpec::Natural(d)) = &self.query.hint {
            direction = if *d >= 0 { 1 } else { -1 };
        }
        SolutionNode::CollectionScan(CollectionScanNode {
            collection: self.query.collection.clone(),
            filter: Some(self.query.root.clone()),
            direction,
            tailable,
            max_scan: self.query.max_scan,
        })
    }

    fn index(&self, number: usize) -> PlannerResult<&IndexEntry> {
        self.indices
            .get(number)
            .ok_or_else(|| PlannerError::invariant(format!("index tag {number} out of range")))
    }
}

/// Collects the tagged bounds-generating predicates inside an object
/// `$elemMatch`, descending through nested ANDs and `$elemMatch`es.
fn find_elem_match_children<'e>(node: &'e Expr, out: &mut Vec<&'e Expr>) {
    for child in node.children() {
        if indexability::node_can_use_index_on_own_field(child) && child.tag.is_some() {
            out.push(child);
        } else if matches!(
            child.kind,
            ExprKind::And(_) | ExprKind::ElemMatchObject { .. }
        ) {
            find_elem_match_children(child, out);
        }
    }
}

/// Hangs a predicate on a stage's filter slot, preserving the slot's
/// logical shape: same-kind filters grow a branch, different kinds get
/// wrapped under a fresh connective of the incoming kind.
fn add_filter_to_solution(
    node: &mut SolutionNode,
    expr: Expr,
    kind: MergeKind,
) -> PlannerResult<()> {
    let Some(slot) = node.filter_slot_mut() else {
        return Err(PlannerError::invariant(
            "stage cannot carry a residual filter",
        ));
    };
    match slot {
        None => *slot = Some(expr),
        Some(existing) => {
            let same_shape = matches!(
                (&existing.kind, kind),
                (ExprKind::And(_), MergeKind::And) | (ExprKind::Or(_), MergeKind::Or)
            );
            if same_shape {
                match &mut existing.kind {
                    ExprKind::And(children) | ExprKind::Or(children) => children.push(expr),
                    _ => unreachable!("shape checked above"),
                }
            } else {
                let old = slot.take().expect("filter present");
                *slot = Some(match kind {
                    MergeKind::And => Expr::and(vec![old, expr]),
                    MergeKind::Or => Expr::or(vec![old, expr]),
                });
            }
        }
    }
    Ok(())
}

fn attach_filter(node: &mut SolutionNode, expr: Expr) -> PlannerResult<()> {
    add_filter_to_solution(node, expr, MergeKind::And)
}

fn fetch(filter: Option<Expr>, child: SolutionNode) -> SolutionNode {
    SolutionNode::Fetch(FetchNode {
        filter,
        child: Box::new(child),
    })
}

/// Moves the root out from behind the reference, leaving an empty AND
/// the caller discards.
fn take_expr(root: &mut Expr) -> Expr {
    std::mem::replace(root, Expr::and(Vec::new()))
}

/// Moves the root out as a fetch filter, unwrapping a single-child AND.
fn take_unwrapped(root: &mut Expr) -> Expr {
    let mut children = root.take_children();
    if children.len() == 1 {
        return children.pop().expect("one child");
    }
    root.set_children(children);
    take_expr(root)
}
