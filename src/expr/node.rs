//! Canonical predicate tree.
//!
//! A query arrives here already canonicalized: logical connectives are
//! flattened, negations are pushed down, and every leaf names a single
//! dotted field path. The access planner consumes this tree, moving
//! branches into the solution tree as residual filters and dropping the
//! ones an index scan proves outright.

use serde_json::Value;

use super::tag::IndexTag;

/// The broad type of a document value, in canonical comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum ValueType {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl ValueType {
    /// The type of a concrete value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
        }
    }

    /// Position of this type in the canonical cross-type ordering.
    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// A circular region for `GeoWithin` predicates.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeoRegion {
    /// Center point, `[x, y]` (or `[lng, lat]` for spherical regions).
    pub center: [f64; 2],
    /// Radius in the same units as the coordinates.
    pub radius: f64,
    /// Whether distances are measured on the sphere.
    pub spherical: bool,
}

/// The parameters of a `GeoNear` predicate.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NearQuery {
    /// Query point, `[lng, lat]`.
    pub point: [f64; 2],
    /// Optional maximum distance from the query point.
    pub max_distance: Option<f64>,
    /// Whether distances are measured on the sphere.
    pub spherical: bool,
}

/// One node of the canonical predicate tree.
///
/// Leaves carry the dotted path of the field they constrain. Children of
/// array operators carry full dotted paths; the matcher strips the array
/// prefix when it applies them to individual elements.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// `{path: value}` / `{path: {$eq: value}}`
    Eq { path: String, value: Value },
    /// `{path: {$gt: value}}`
    Gt { path: String, value: Value },
    /// `{path: {$gte: value}}`
    Gte { path: String, value: Value },
    /// `{path: {$lt: value}}`
    Lt { path: String, value: Value },
    /// `{path: {$lte: value}}`
    Lte { path: String, value: Value },
    /// `{path: {$in: [values...]}}`
    In { path: String, values: Vec<Value> },
    /// `{path: /pattern/}`
    Regex { path: String, pattern: String },
    /// `{path: {$exists: bool}}`
    Exists { path: String, exists: bool },
    /// `{path: {$type: t}}`
    Type { path: String, expected: ValueType },
    /// `{path: {$mod: [divisor, remainder]}}`
    Mod {
        path: String,
        divisor: i64,
        remainder: i64,
    },
    /// `{path: {$geoWithin: region}}` / `{path: {$geoIntersects: region}}`
    GeoWithin { path: String, region: GeoRegion },
    /// `{path: {$near: point}}`
    GeoNear { path: String, near: NearQuery },
    /// `{$text: {$search: query, $language: language}}`
    Text { query: String, language: String },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Nor(Vec<Expr>),
    Not(Box<Expr>),
    /// `{path: {$elemMatch: {field predicates...}}}` — children apply to
    /// the same array element.
    ElemMatchObject { path: String, children: Vec<Expr> },
    /// `{path: {$elemMatch: {value predicates...}}}` — children apply to
    /// the element value itself.
    ElemMatchValue { path: String, children: Vec<Expr> },
    /// `{path: {$all: [clauses...]}}` in its expanded form, where each
    /// child is an equality or `$elemMatch` clause on the same path.
    All { path: String, children: Vec<Expr> },
}

/// A predicate node plus the index assignment the plan enumerator gave it.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub tag: Option<IndexTag>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self { kind, tag: None }
    }

    /// Attaches an enumerator tag, builder-style.
    pub fn tagged(mut self, index: usize, pos: usize) -> Self {
        self.tag = Some(IndexTag::new(index, pos));
        self
    }

    pub fn eq(path: impl Into<String>, value: Value) -> Self {
        Self::new(ExprKind::Eq {
            path: path.into(),
            value,
        })
    }

    pub fn gt(path: impl Into<String>, value: Value) -> Self {
        Self::new(ExprKind::Gt {
            path: path.into(),
            value,
        })
    }

    pub fn gte(path: impl Into<String>, value: Value) -> Self {
        Self::new(ExprKind::Gte {
            path: path.into(),
            value,
        })
    }

    pub fn lt(path: impl Into<String>, value: Value) -> Self {
        Self::new(ExprKind::Lt {
            path: path.into(),
            value,
        })
    }

    pub fn lte(path: impl Into<String>, value: Value) -> Self {
        Self::new(ExprKind::Lte {
            path: path.into(),
            value,
        })
    }

    pub fn is_in(path: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(ExprKind::In {
            path: path.into(),
            values,
        })
    }

    pub fn regex(path: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(ExprKind::Regex {
            path: path.into(),
            pattern: pattern.into(),
        })
    }

    pub fn exists(path: impl Into<String>, exists: bool) -> Self {
        Self::new(ExprKind::Exists {
            path: path.into(),
            exists,
        })
    }

    pub fn has_type(path: impl Into<String>, expected: ValueType) -> Self {
        Self::new(ExprKind::Type {
            path: path.into(),
            expected,
        })
    }

    pub fn modulo(path: impl Into<String>, divisor: i64, remainder: i64) -> Self {
        Self::new(ExprKind::Mod {
            path: path.into(),
            divisor,
            remainder,
        })
    }

    pub fn geo_within(path: impl Into<String>, region: GeoRegion) -> Self {
        Self::new(ExprKind::GeoWithin {
            path: path.into(),
            region,
        })
    }

    pub fn geo_near(path: impl Into<String>, near: NearQuery) -> Self {
        Self::new(ExprKind::GeoNear {
            path: path.into(),
            near,
        })
    }

    pub fn text(query: impl Into<String>, language: impl Into<String>) -> Self {
        Self::new(ExprKind::Text {
            query: query.into(),
            language: language.into(),
        })
    }

    pub fn and(children: Vec<Expr>) -> Self {
        Self::new(ExprKind::And(children))
    }

    pub fn or(children: Vec<Expr>) -> Self {
        Self::new(ExprKind::Or(children))
    }

    pub fn nor(children: Vec<Expr>) -> Self {
        Self::new(ExprKind::Nor(children))
    }

    pub fn not(child: Expr) -> Self {
        Self::new(ExprKind::Not(Box::new(child)))
    }

    pub fn elem_match_object(path: impl Into<String>, children: Vec<Expr>) -> Self {
        Self::new(ExprKind::ElemMatchObject {
            path: path.into(),
            children,
        })
    }

    pub fn elem_match_value(path: impl Into<String>, children: Vec<Expr>) -> Self {
        Self::new(ExprKind::ElemMatchValue {
            path: path.into(),
            children,
        })
    }

    pub fn all(path: impl Into<String>, children: Vec<Expr>) -> Self {
        Self::new(ExprKind::All {
            path: path.into(),
            children,
        })
    }

    /// The dotted field path this node constrains, if it constrains one.
    pub fn path(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Eq { path, .. }
            | ExprKind::Gt { path, .. }
            | ExprKind::Gte { path, .. }
            | ExprKind::Lt { path, .. }
            | ExprKind::Lte { path, .. }
            | ExprKind::In { path, .. }
            | ExprKind::Regex { path, .. }
            | ExprKind::Exists { path, .. }
            | ExprKind::Type { path, .. }
            | ExprKind::Mod { path, .. }
            | ExprKind::GeoWithin { path, .. }
            | ExprKind::GeoNear { path, .. }
            | ExprKind::ElemMatchObject { path, .. }
            | ExprKind::ElemMatchValue { path, .. }
            | ExprKind::All { path, .. } => Some(path),
            _ => None,
        }
    }

    /// True for AND, OR, NOR and NOT nodes.
    pub fn is_logical(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::And(_) | ExprKind::Or(_) | ExprKind::Nor(_) | ExprKind::Not(_)
        )
    }

    /// True for `$elemMatch` and `$all` nodes.
    pub fn is_array_operator(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::ElemMatchObject { .. } | ExprKind::ElemMatchValue { .. } | ExprKind::All { .. }
        )
    }

    pub fn children(&self) -> &[Expr] {
        match &self.kind {
            ExprKind::And(c) | ExprKind::Or(c) | ExprKind::Nor(c) => c,
            ExprKind::ElemMatchObject { children, .. }
            | ExprKind::ElemMatchValue { children, .. }
            | ExprKind::All { children, .. } => children,
            ExprKind::Not(c) => std::slice::from_ref(c.as_ref()),
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> &mut [Expr] {
        match &mut self.kind {
            ExprKind::And(c) | ExprKind::Or(c) | ExprKind::Nor(c) => c,
            ExprKind::ElemMatchObject { children, .. }
            | ExprKind::ElemMatchValue { children, .. }
            | ExprKind::All { children, .. } => children,
            ExprKind::Not(c) => std::slice::from_mut(c.as_mut()),
            _ => &mut [],
        }
    }

    /// Moves the child list out of an AND or OR node, leaving it empty.
    ///
    /// Callers put residual children back with [`Expr::set_children`].
    pub fn take_children(&mut self) -> Vec<Expr> {
        match &mut self.kind {
            ExprKind::And(c) | ExprKind::Or(c) | ExprKind::Nor(c) => std::mem::take(c),
            ExprKind::ElemMatchObject { children, .. }
            | ExprKind::ElemMatchValue { children, .. }
            | ExprKind::All { children, .. } => std::mem::take(children),
            _ => Vec::new(),
        }
    }

    pub fn set_children(&mut self, new_children: Vec<Expr>) {
        match &mut self.kind {
            ExprKind::And(c) | ExprKind::Or(c) | ExprKind::Nor(c) => *c = new_children,
            ExprKind::ElemMatchObject { children, .. }
            | ExprKind::ElemMatchValue { children, .. }
            | ExprKind::All { children, .. } => *children = new_children,
            _ => debug_assert!(new_children.is_empty(), "leaf node cannot hold children"),
        }
    }

    /// The tag that routes this node to an index. A NOT carries no tag of
    /// its own; it inherits its child's.
    pub fn effective_tag(&self) -> Option<IndexTag> {
        if let Some(tag) = self.tag {
            return Some(tag);
        }
        if let ExprKind::Not(child) = &self.kind {
            return child.tag;
        }
        None
    }

    /// A short name for diagnostics and explain output.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::Eq { .. } => "eq",
            ExprKind::Gt { .. } => "gt",
            ExprKind::Gte { .. } => "gte",
            ExprKind::Lt { .. } => "lt",
            ExprKind::Lte { .. } => "lte",
            ExprKind::In { .. } => "in",
            ExprKind::Regex { .. } => "regex",
            ExprKind::Exists { .. } => "exists",
            ExprKind::Type { .. } => "type",
            ExprKind::Mod { .. } => "mod",
            ExprKind::GeoWithin { .. } => "geoWithin",
            ExprKind::GeoNear { .. } => "geoNear",
            ExprKind::Text { .. } => "text",
            ExprKind::And(_) => "and",
            ExprKind::Or(_) => "or",
            ExprKind::Nor(_) => "nor",
            ExprKind::Not(_) => "not",
            ExprKind::ElemMatchObject { .. } => "elemMatchObject",
            ExprKind::ElemMatchValue { .. } => "elemMatchValue",
            ExprKind::All { .. } => "all",
        }
    }
}
