//! Query solution trees produced by the access planner.

mod node;
mod sorts;

pub use node::{
    AndNode, CollectionScanNode, FetchNode, Geo2dNode, GeoNear2dSphereNode, IndexScanNode,
    IntersectKind, MergeSortNode, OrNode, SolutionNode, TextNode,
};
pub use sorts::{SortField, SortPattern};
