//! Per-field interval lists and whole-index bounds.

use serde_json::Value;

use super::interval::Interval;

/// The intervals a scan visits at one key-pattern position.
///
/// An empty `path` means the position has not been assigned a predicate
/// yet; the leaf finisher fills such positions with all-values intervals.
/// Intervals are kept sorted, non-overlapping and non-touching.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderedIntervalList {
    pub path: String,
    pub intervals: Vec<Interval>,
}

impl OrderedIntervalList {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            intervals: Vec::new(),
        }
    }

    pub fn with_intervals(path: impl Into<String>, intervals: Vec<Interval>) -> Self {
        let mut list = Self {
            path: path.into(),
            intervals,
        };
        list.normalize();
        list
    }

    /// True until a predicate has been translated into this position.
    pub fn is_unassigned(&self) -> bool {
        self.path.is_empty()
    }

    pub fn is_single_point(&self) -> bool {
        self.intervals.len() == 1 && self.intervals[0].is_point()
    }

    pub fn is_all_values(&self) -> bool {
        self.intervals.len() == 1 && self.intervals[0].is_all_values()
    }

    pub fn contains_value(&self, value: &Value) -> bool {
        self.intervals.iter().any(|iv| iv.contains_value(value))
    }

    /// Sorts by start and coalesces connecting intervals.
    pub fn normalize(&mut self) {
        self.intervals.retain(Interval::is_nonempty);
        self.intervals.sort_by(|a, b| a.cmp_starts(b));
        let mut merged: Vec<Interval> = Vec::with_capacity(self.intervals.len());
        for interval in self.intervals.drain(..) {
            match merged.last_mut() {
                Some(last) if last.connects(&interval) => *last = last.merge(&interval),
                _ => merged.push(interval),
            }
        }
        self.intervals = merged;
    }

    /// Replaces this list with its union with `other`.
    pub fn union_with(&mut self, other: Vec<Interval>) {
        self.intervals.extend(other);
        self.normalize();
    }

    /// Replaces this list with its intersection with `other`.
    pub fn intersect_with(&mut self, other: &[Interval]) {
        let mut result = Vec::new();
        for a in &self.intervals {
            for b in other {
                if let Some(x) = a.intersect(b) {
                    result.push(x);
                }
            }
        }
        self.intervals = result;
        self.normalize();
    }

    /// Replaces this list with its complement over `[MinKey, MaxKey]`.
    pub fn complement(&mut self) {
        use super::interval::Endpoint;

        self.normalize();
        let mut gaps = Vec::with_capacity(self.intervals.len() + 1);
        let mut cursor = Endpoint::MinKey;
        let mut cursor_inclusive = true;
        for interval in &self.intervals {
            let gap = Interval::new(
                cursor,
                cursor_inclusive,
                interval.start.clone(),
                !interval.start_inclusive,
            );
            if gap.is_nonempty() {
                gaps.push(gap);
            }
            cursor = interval.end.clone();
            cursor_inclusive = !interval.end_inclusive;
        }
        let tail = Interval::new(cursor, cursor_inclusive, Endpoint::MaxKey, true);
        if tail.is_nonempty() {
            gaps.push(tail);
        }
        self.intervals = gaps;
    }

    /// Flips the list for a descending traversal.
    pub fn reverse(&mut self) {
        self.intervals.reverse();
        for interval in &mut self.intervals {
            *interval = interval.reversed();
        }
    }
}

/// An explicit `[start_key, end_key)` scan range, used instead of
/// per-field interval lists by the simple-range scan constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleRange {
    pub start_key: Value,
    pub end_key: Value,
    pub end_key_inclusive: bool,
}

/// The bounds of one index scan: one interval list per key-pattern
/// position, or an explicit simple range.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexBounds {
    pub fields: Vec<OrderedIntervalList>,
    pub simple_range: Option<SimpleRange>,
}

impl IndexBounds {
    /// Unassigned bounds sized to a key pattern.
    pub fn sized(len: usize) -> Self {
        Self {
            fields: (0..len).map(|_| OrderedIntervalList::default()).collect(),
            simple_range: None,
        }
    }

    pub fn simple(start_key: Value, end_key: Value, end_key_inclusive: bool) -> Self {
        Self {
            fields: Vec::new(),
            simple_range: Some(SimpleRange {
                start_key,
                end_key,
                end_key_inclusive,
            }),
        }
    }

    /// Flips every field for a reverse-direction scan.
    pub fn reverse_all(&mut self) {
        for field in &mut self.fields {
            field.reverse();
        }
    }
}
