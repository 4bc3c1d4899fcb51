//! Planner inputs: the canonical query and planner parameters.

use crate::expr::Expr;
use crate::solution::SortPattern;

/// Which fields a query's projection wants computed by a near stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionFlags {
    pub wants_geo_near_point: bool,
    pub wants_geo_near_distance: bool,
}

/// An index or traversal-order hint supplied with the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintSpec {
    /// Force a named index.
    Index(String),
    /// `$natural` traversal, `1` forward or `-1` reverse.
    Natural(i32),
}

/// A canonicalized query as handed to the planner: the predicate tree
/// plus the parsed sort, hint, projection and scan limits.
#[derive(Debug, Clone)]
pub struct CanonicalQuery {
    pub collection: String,
    pub root: Expr,
    /// Requested sort; empty means none. May name `$natural`.
    pub sort: SortPattern,
    pub hint: Option<HintSpec>,
    pub projection: ProjectionFlags,
    pub max_scan: Option<u64>,
    /// Return index keys instead of documents.
    pub return_key: bool,
}

impl CanonicalQuery {
    pub fn new(collection: impl Into<String>, root: Expr) -> Self {
        Self {
            collection: collection.into(),
            root,
            sort: SortPattern::default(),
            hint: None,
            projection: ProjectionFlags::default(),
            max_scan: None,
            return_key: false,
        }
    }

    pub fn with_sort(mut self, sort: SortPattern) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_hint(mut self, hint: HintSpec) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn with_projection(mut self, projection: ProjectionFlags) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_max_scan(mut self, max_scan: u64) -> Self {
        self.max_scan = Some(max_scan);
        self
    }

    pub fn with_return_key(mut self, return_key: bool) -> Self {
        self.return_key = return_key;
        self
    }
}

/// Behavior flags for a planning session.
///
/// The access planner itself reads none of these yet; the struct rides
/// along so callers configure one object end to end.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlannerParams {
    /// Refuse collection scans (the caller will surface an error instead
    /// of falling back).
    pub no_table_scan: bool,
}
