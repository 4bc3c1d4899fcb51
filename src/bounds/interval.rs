//! Key-space intervals.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use super::ordering::value_cmp;

/// One end of an interval. `MinKey` and `MaxKey` sit below and above
/// every document value.
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    MinKey,
    Val(Value),
    MaxKey,
}

impl Endpoint {
    pub fn cmp_endpoint(&self, other: &Endpoint) -> Ordering {
        match (self, other) {
            (Endpoint::MinKey, Endpoint::MinKey) => Ordering::Equal,
            (Endpoint::MinKey, _) => Ordering::Less,
            (_, Endpoint::MinKey) => Ordering::Greater,
            (Endpoint::MaxKey, Endpoint::MaxKey) => Ordering::Equal,
            (Endpoint::MaxKey, _) => Ordering::Greater,
            (_, Endpoint::MaxKey) => Ordering::Less,
            (Endpoint::Val(a), Endpoint::Val(b)) => value_cmp(a, b),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::MinKey => write!(f, "MinKey"),
            Endpoint::MaxKey => write!(f, "MaxKey"),
            Endpoint::Val(v) => write!(f, "{}", v),
        }
    }
}

/// A contiguous range of key values.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub start: Endpoint,
    pub end: Endpoint,
    pub start_inclusive: bool,
    pub end_inclusive: bool,
}

impl Interval {
    pub fn new(start: Endpoint, start_inclusive: bool, end: Endpoint, end_inclusive: bool) -> Self {
        Self {
            start,
            end,
            start_inclusive,
            end_inclusive,
        }
    }

    /// The single-value interval `[v, v]`.
    pub fn point(value: Value) -> Self {
        Self::new(Endpoint::Val(value.clone()), true, Endpoint::Val(value), true)
    }

    /// `[MinKey, MaxKey]`.
    pub fn all_values() -> Self {
        Self::new(Endpoint::MinKey, true, Endpoint::MaxKey, true)
    }

    pub fn is_point(&self) -> bool {
        self.start_inclusive
            && self.end_inclusive
            && matches!(&self.start, Endpoint::Val(_))
            && self.start.cmp_endpoint(&self.end) == Ordering::Equal
    }

    pub fn is_all_values(&self) -> bool {
        self.start == Endpoint::MinKey
            && self.start_inclusive
            && self.end == Endpoint::MaxKey
            && self.end_inclusive
    }

    /// True when the interval denotes at least one key value.
    pub fn is_nonempty(&self) -> bool {
        match self.start.cmp_endpoint(&self.end) {
            Ordering::Less => true,
            Ordering::Equal => self.start_inclusive && self.end_inclusive,
            Ordering::Greater => false,
        }
    }

    pub fn contains_value(&self, value: &Value) -> bool {
        let v = Endpoint::Val(value.clone());
        let after_start = match self.start.cmp_endpoint(&v) {
            Ordering::Less => true,
            Ordering::Equal => self.start_inclusive,
            Ordering::Greater => false,
        };
        let before_end = match v.cmp_endpoint(&self.end) {
            Ordering::Less => true,
            Ordering::Equal => self.end_inclusive,
            Ordering::Greater => false,
        };
        after_start && before_end
    }

    /// Compares interval starts; at equal values an inclusive start comes
    /// first.
    pub fn cmp_starts(&self, other: &Interval) -> Ordering {
        self.start
            .cmp_endpoint(&other.start)
            .then_with(|| other.start_inclusive.cmp(&self.start_inclusive))
    }

    /// Compares interval ends; at equal values an inclusive end comes
    /// last.
    pub fn cmp_ends(&self, other: &Interval) -> Ordering {
        self.end
            .cmp_endpoint(&other.end)
            .then_with(|| self.end_inclusive.cmp(&other.end_inclusive))
    }

    /// The overlap of two intervals, if any.
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let (start, start_inclusive) = if self.cmp_starts(other) == Ordering::Less {
            (other.start.clone(), other.start_inclusive)
        } else {
            (self.start.clone(), self.start_inclusive)
        };
        let (end, end_inclusive) = if self.cmp_ends(other) == Ordering::Greater {
            (other.end.clone(), other.end_inclusive)
        } else {
            (self.end.clone(), self.end_inclusive)
        };
        let out = Interval::new(start, start_inclusive, end, end_inclusive);
        out.is_nonempty().then_some(out)
    }

    /// True when the two intervals overlap or touch, so their union is a
    /// single interval.
    pub fn connects(&self, other: &Interval) -> bool {
        let (first, second) = if self.cmp_starts(other) == Ordering::Greater {
            (other, self)
        } else {
            (self, other)
        };
        match first.end.cmp_endpoint(&second.start) {
            Ordering::Greater => true,
            Ordering::Equal => first.end_inclusive || second.start_inclusive,
            Ordering::Less => false,
        }
    }

    /// The convex hull of two connecting intervals.
    pub fn merge(&self, other: &Interval) -> Interval {
        let (start, start_inclusive) = if self.cmp_starts(other) == Ordering::Greater {
            (other.start.clone(), other.start_inclusive)
        } else {
            (self.start.clone(), self.start_inclusive)
        };
        let (end, end_inclusive) = if self.cmp_ends(other) == Ordering::Less {
            (other.end.clone(), other.end_inclusive)
        } else {
            (self.end.clone(), self.end_inclusive)
        };
        Interval::new(start, start_inclusive, end, end_inclusive)
    }

    /// The same key set described back-to-front, for descending scans.
    pub fn reversed(&self) -> Interval {
        Interval::new(
            self.end.clone(),
            self.end_inclusive,
            self.start.clone(),
            self.start_inclusive,
        )
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}, {}{}",
            if self.start_inclusive { '[' } else { '(' },
            self.start,
            self.end,
            if self.end_inclusive { ']' } else { ')' },
        )
    }
}
