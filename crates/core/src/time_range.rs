// crates/core/src/time_range.rs
//! Half-open time ranges `[start, end)` in Unix milliseconds.
//!
//! Ranges are immutable values. Every operation returns a new range, a
//! boolean, or `None` when the operation does not apply.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open interval `[start, end)`. `end == None` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start: i64,
    pub end: Option<i64>,
    pub accumulatable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl TimeRange {
    /// An accumulatable range with no comment.
    pub fn new(start: i64, end: Option<i64>) -> Self {
        Self {
            start,
            end,
            accumulatable: true,
            comment: None,
        }
    }

    pub fn bounded(start: i64, end: i64) -> Self {
        Self::new(start, Some(end))
    }

    pub fn open(start: i64) -> Self {
        Self::new(start, None)
    }

    pub fn with_accumulatable(mut self, accumulatable: bool) -> Self {
        self.accumulatable = accumulatable;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// True iff `self` fully covers `other`.
    ///
    /// A bounded range never includes an unbounded one.
    pub fn includes(&self, other: &TimeRange) -> bool {
        if self.start > other.start {
            return false;
        }
        match (self.end, other.end) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(mine), Some(theirs)) => mine >= theirs,
        }
    }

    /// True iff `other` fully covers `self`.
    pub fn is_included_by(&self, other: &TimeRange) -> bool {
        other.includes(self)
    }

    /// `start <= instant < end`.
    pub fn contains(&self, instant: i64) -> bool {
        self.start <= instant && self.end.map_or(true, |end| instant < end)
    }

    /// One range spanning both, only if they are exactly adjacent.
    pub fn combine(&self, other: &TimeRange) -> Option<TimeRange> {
        if self.end == Some(other.start) {
            return Some(TimeRange::new(self.start, other.end));
        }
        if other.end == Some(self.start) {
            return Some(TimeRange::new(other.start, self.end));
        }
        None
    }

    /// Intersection with `[start, end)`, or `None` when it is empty.
    pub fn clip(&self, start: i64, end: Option<i64>) -> Option<TimeRange> {
        let lo = self.start.max(start);
        let hi = match (self.end, end) {
            (None, None) => None,
            (Some(a), None) | (None, Some(a)) => Some(a),
            (Some(a), Some(b)) => Some(a.min(b)),
        };
        if hi.is_some_and(|hi| hi <= lo) {
            return None;
        }
        Some(TimeRange {
            start: lo,
            end: hi,
            accumulatable: self.accumulatable,
            comment: self.comment.clone(),
        })
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {})", self.start, end),
            None => write!(f, "[{}, null)", self.start),
        }
    }
}
