//! Sort patterns provided or requested by plan stages.

use serde::{Deserialize, Serialize};

/// One field of a sort pattern; `direction` is `1` or `-1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SortField {
    pub path: String,
    pub direction: i32,
}

/// An ordered sort specification, e.g. `{a: 1, b: -1}`.
///
/// Totally ordered so stages can expose the set of sorts they provide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct SortPattern(pub Vec<SortField>);

impl SortPattern {
    pub fn of(fields: &[(&str, i32)]) -> Self {
        Self(
            fields
                .iter()
                .map(|(path, direction)| SortField {
                    path: (*path).to_string(),
                    direction: *direction,
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &[SortField] {
        &self.0
    }

    /// Whether the pattern mentions a field, e.g. `$natural`.
    pub fn field_direction(&self, path: &str) -> Option<i32> {
        self.0.iter().find(|f| f.path == path).map(|f| f.direction)
    }
}
