// crates/core/src/element.rs
//! Drop-matrix elements and the fold that merges partial statistics.
//!
//! An element says: across `times` clears of `stage_id` in `[start, end)`,
//! `item_id` dropped `quantity` units in total. Partial elements for the same
//! (stage, item) computed over disjoint windows fold into one by summing the
//! counts and spanning the windows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::time_range::TimeRange;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropMatrixElement {
    pub stage_id: String,
    pub item_id: String,
    pub quantity: i64,
    pub times: i64,
    pub start: i64,
    /// `None` when the window is still open.
    pub end: Option<i64>,
    pub update_time: i64,
}

impl DropMatrixElement {
    pub fn new(
        stage_id: impl Into<String>,
        item_id: impl Into<String>,
        quantity: i64,
        times: i64,
        range: &TimeRange,
        update_time: i64,
    ) -> Self {
        Self {
            stage_id: stage_id.into(),
            item_id: item_id.into(),
            quantity,
            times,
            start: range.start,
            end: range.end,
            update_time,
        }
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.stage_id, &self.item_id)
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }

    /// Sum counts with `other` and span both windows.
    ///
    /// Callers only combine elements of the same (stage, item).
    pub fn combine(&self, other: &DropMatrixElement, update_time: i64) -> DropMatrixElement {
        debug_assert_eq!(self.key(), other.key());
        DropMatrixElement {
            stage_id: self.stage_id.clone(),
            item_id: self.item_id.clone(),
            quantity: self.quantity + other.quantity,
            times: self.times + other.times,
            start: self.start.min(other.start),
            end: max_end(self.end, other.end),
            update_time,
        }
    }
}

/// Later of two window ends; an open end wins.
fn max_end(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    }
}

/// Fold a non-empty list of same-key elements into one.
pub fn combine_elements(elements: &[DropMatrixElement], update_time: i64) -> Option<DropMatrixElement> {
    let (first, rest) = elements.split_first()?;
    let mut acc = first.clone();
    acc.update_time = update_time;
    for el in rest {
        acc = acc.combine(el, update_time);
    }
    Some(acc)
}

/// Fold every (stage, item) group in `elements` into a single element.
///
/// Output is ordered by stage then item.
pub fn fold_by_key(elements: Vec<DropMatrixElement>, update_time: i64) -> Vec<DropMatrixElement> {
    let mut groups: BTreeMap<(String, String), Vec<DropMatrixElement>> = BTreeMap::new();
    for el in elements {
        groups
            .entry((el.stage_id.clone(), el.item_id.clone()))
            .or_default()
            .push(el);
    }
    groups
        .values()
        .filter_map(|els| combine_elements(els, update_time))
        .collect()
}

/// Merge an already-folded past matrix with an already-folded current one.
///
/// Both lists hold at most one element per (stage, item). A pair present on
/// both sides is summed; otherwise the existing element is taken as-is.
pub fn combine_element_lists(
    past: Vec<DropMatrixElement>,
    current: Vec<DropMatrixElement>,
) -> Vec<DropMatrixElement> {
    let mut merged: BTreeMap<(String, String), DropMatrixElement> = BTreeMap::new();
    for el in past.into_iter().chain(current) {
        let key = (el.stage_id.clone(), el.item_id.clone());
        match merged.remove(&key) {
            Some(existing) => {
                let update_time = existing.update_time.max(el.update_time);
                merged.insert(key, existing.combine(&el, update_time));
            }
            None => {
                merged.insert(key, el);
            }
        }
    }
    merged.into_values().collect()
}

/// Latest `update_time` across a matrix, for conditional-GET style freshness.
pub fn last_update_time(elements: &[DropMatrixElement]) -> Option<i64> {
    elements.iter().map(|el| el.update_time).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn el(quantity: i64, times: i64, start: i64, end: Option<i64>) -> DropMatrixElement {
        DropMatrixElement::new("main_01-07", "30012", quantity, times, &TimeRange::new(start, end), 0)
    }

    #[test]
    fn test_fold_two_past_windows() {
        let folded = combine_elements(&[el(2, 50, 0, Some(1000)), el(3, 60, 1000, Some(2000))], 42).unwrap();
        assert_eq!(folded.quantity, 5);
        assert_eq!(folded.times, 110);
        assert_eq!(folded.start, 0);
        assert_eq!(folded.end, Some(2000));
        assert_eq!(folded.update_time, 42);
    }

    #[test]
    fn test_fold_open_end_wins() {
        let folded = combine_elements(&[el(1, 1, 0, Some(1000)), el(1, 1, 1000, None)], 0).unwrap();
        assert_eq!(folded.end, None);
    }

    #[test]
    fn test_fold_empty_is_none() {
        assert!(combine_elements(&[], 0).is_none());
    }

    #[test]
    fn test_fold_by_key_groups_pairs() {
        let mut other = el(7, 9, 0, Some(10));
        other.item_id = "30013".into();
        let folded = fold_by_key(vec![el(1, 2, 0, Some(10)), other, el(3, 4, 10, Some(20))], 5);
        assert_eq!(folded.len(), 2);
        assert_eq!((folded[0].item_id.as_str(), folded[0].quantity, folded[0].times), ("30012", 4, 6));
        assert_eq!((folded[1].item_id.as_str(), folded[1].quantity, folded[1].times), ("30013", 7, 9));
    }

    #[test]
    fn test_combine_element_lists() {
        let past = vec![el(2, 50, 0, Some(1000))];
        let mut only_current = el(1, 10, 1000, None);
        only_current.item_id = "30013".into();
        let current = vec![el(3, 60, 1000, None), only_current.clone()];

        let merged = combine_element_lists(past, current);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].quantity, 5);
        assert_eq!(merged[0].times, 110);
        assert_eq!(merged[0].start, 0);
        assert_eq!(merged[0].end, None);
        assert_eq!(merged[1], only_current);
    }

    #[test]
    fn test_last_update_time() {
        let mut a = el(0, 0, 0, None);
        a.update_time = 7;
        let mut b = a.clone();
        b.update_time = 9;
        assert_eq!(last_update_time(&[a, b]), Some(9));
        assert_eq!(last_update_time(&[]), None);
    }

    proptest! {
        #[test]
        fn prop_fold_is_order_independent(
            parts in proptest::collection::vec((0i64..1000, 0i64..1000, 0i64..10_000, 1i64..10_000), 3)
        ) {
            let els: Vec<_> = parts
                .iter()
                .map(|&(q, t, s, len)| el(q, t, s, Some(s + len)))
                .collect();
            let forward = combine_elements(&els, 1).unwrap();
            let reversed: Vec<_> = els.iter().rev().cloned().collect();
            let backward = combine_elements(&reversed, 1).unwrap();
            prop_assert_eq!(&forward, &backward);

            // (a + b) + c == a + (b + c)
            let left = els[0].combine(&els[1], 1).combine(&els[2], 1);
            let right = els[0].combine(&els[1].combine(&els[2], 1), 1);
            prop_assert_eq!(&left, &right);
            prop_assert_eq!(forward.quantity, parts.iter().map(|p| p.0).sum::<i64>());
        }
    }
}
