//! Index catalog entries.
//!
//! The planner sees the catalog as an ordered list of `IndexEntry`
//! values; enumerator tags address entries by position in that list.
//! Catalog discovery and maintenance live elsewhere.

use serde::{Deserialize, Serialize};

/// How one key-pattern position orders or transforms its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    Ascending,
    Descending,
    /// Planar geo key (`"2d"`).
    Geo2d,
    /// Spherical geo key (`"2dsphere"`).
    Geo2dSphere,
    /// Full-text key. A text index stores its term/score pair at this
    /// position; prefix fields precede it, suffix fields follow it.
    Text,
    Hashed,
}

impl KeyKind {
    /// Scan direction contribution: -1 for descending keys, +1 otherwise.
    pub fn direction(self) -> i32 {
        match self {
            KeyKind::Descending => -1,
            _ => 1,
        }
    }

    /// True for key kinds that do not order plain values.
    pub fn is_special(self) -> bool {
        !matches!(self, KeyKind::Ascending | KeyKind::Descending)
    }
}

/// One position of a key pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPart {
    pub path: String,
    pub kind: KeyKind,
}

/// An ordered key pattern, e.g. `{a: 1, b: -1}` or
/// `{category: 1, _fts: "text", topic: 1}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPattern(pub Vec<KeyPart>);

impl KeyPattern {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// Builds a pattern from `(path, kind)` pairs.
    pub fn of(parts: &[(&str, KeyKind)]) -> Self {
        Self(
            parts
                .iter()
                .map(|(path, kind)| KeyPart {
                    path: (*path).to_string(),
                    kind: *kind,
                })
                .collect(),
        )
    }

    /// An all-ascending pattern over the given paths.
    pub fn ascending(paths: &[&str]) -> Self {
        Self::of(&paths.iter().map(|p| (*p, KeyKind::Ascending)).collect::<Vec<_>>())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn part(&self, pos: usize) -> Option<&KeyPart> {
        self.0.get(pos)
    }
}

/// The access method an index supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    BTree,
    Geo2d,
    Geo2dSphere,
    Text,
    Hashed,
}

/// One catalog entry as the planner sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub key_pattern: KeyPattern,
    /// True when any indexed field may hold arrays, so one document can
    /// contribute several index keys.
    pub multikey: bool,
    pub index_type: IndexType,
}

impl IndexEntry {
    /// Creates an entry, deriving the index type from the first special
    /// key part (b-tree when there is none).
    pub fn new(name: impl Into<String>, key_pattern: KeyPattern) -> Self {
        let index_type = key_pattern
            .parts()
            .iter()
            .find_map(|part| match part.kind {
                KeyKind::Geo2d => Some(IndexType::Geo2d),
                KeyKind::Geo2dSphere => Some(IndexType::Geo2dSphere),
                KeyKind::Text => Some(IndexType::Text),
                KeyKind::Hashed => Some(IndexType::Hashed),
                _ => None,
            })
            .unwrap_or(IndexType::BTree);
        Self {
            name: name.into(),
            key_pattern,
            multikey: false,
            index_type,
        }
    }

    /// Builder-style multikey flag.
    pub fn multikey(mut self, multikey: bool) -> Self {
        self.multikey = multikey;
        self
    }

    pub fn is_text(&self) -> bool {
        self.index_type == IndexType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_type_derivation() {
        let plain = IndexEntry::new("a_1_b_1", KeyPattern::ascending(&["a", "b"]));
        assert_eq!(plain.index_type, IndexType::BTree);
        assert!(!plain.multikey);

        let geo = IndexEntry::new(
            "loc_2dsphere_x_1",
            KeyPattern::of(&[("loc", KeyKind::Geo2dSphere), ("x", KeyKind::Ascending)]),
        );
        assert_eq!(geo.index_type, IndexType::Geo2dSphere);

        let text = IndexEntry::new(
            "category_1_text",
            KeyPattern::of(&[("category", KeyKind::Ascending), ("_fts", KeyKind::Text)]),
        );
        assert!(text.is_text());
    }

    #[test]
    fn test_key_directions() {
        let pattern = KeyPattern::of(&[("a", KeyKind::Ascending), ("b", KeyKind::Descending)]);
        assert_eq!(pattern.part(0).unwrap().kind.direction(), 1);
        assert_eq!(pattern.part(1).unwrap().kind.direction(), -1);
        assert!(!pattern.part(0).unwrap().kind.is_special());
        assert!(KeyKind::Text.is_special());
    }
}
