// crates/core/src/planner.rs
//! Accumulation-window planning.
//!
//! Stored window records are merged per (stage, item) into the fewest
//! non-overlapping windows, then split into the ones still running at "now"
//! (current) and the ones already closed (past). Items of one stage that share
//! an identical window are grouped so the engine can query them together.

use std::collections::{BTreeMap, BTreeSet};

use crate::time_range::TimeRange;
use crate::types::StageItemRange;

/// One window of one stage, with the items whose statistics accumulate over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWindow {
    pub range: TimeRange,
    pub item_ids: BTreeSet<String>,
}

/// Planned windows per stage, each list ordered by window start.
pub type StageWindowPlan = BTreeMap<String, Vec<PlannedWindow>>;

/// Merged windows per stage, then per item.
pub type MergedRanges = BTreeMap<String, BTreeMap<String, Vec<TimeRange>>>;

/// Merge adjacent accumulatable ranges until no two adjacent ranges remain.
///
/// Non-accumulatable ranges are dropped. Input ranges are expected to be
/// non-overlapping; overlapping ones are kept side by side.
pub fn merge_adjacent(ranges: impl IntoIterator<Item = TimeRange>) -> Vec<TimeRange> {
    let mut sorted: Vec<TimeRange> = ranges.into_iter().filter(|r| r.accumulatable).collect();
    sorted.sort_by_key(|r| (r.start, r.end.is_none(), r.end));
    sorted.dedup_by(|a, b| a.start == b.start && a.end == b.end);

    let mut merged: Vec<TimeRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        if let Some(combined) = merged.last().and_then(|last| last.combine(&range)) {
            if let Some(last) = merged.last_mut() {
                *last = combined;
            }
        } else {
            merged.push(range);
        }
    }
    merged
}

/// Latest maximal accumulatable windows for every (stage, item) pair.
pub fn latest_max_accumulatable_ranges(records: &[StageItemRange]) -> MergedRanges {
    let mut raw: BTreeMap<String, BTreeMap<String, Vec<TimeRange>>> = BTreeMap::new();
    for record in records {
        raw.entry(record.stage_id.clone())
            .or_default()
            .entry(record.item_id.clone())
            .or_default()
            .push(record.range.clone());
    }

    raw.into_iter()
        .map(|(stage_id, items)| {
            let items = items
                .into_iter()
                .map(|(item_id, ranges)| (item_id, merge_adjacent(ranges)))
                .filter(|(_, ranges)| !ranges.is_empty())
                .collect::<BTreeMap<_, _>>();
            (stage_id, items)
        })
        .filter(|(_, items)| !items.is_empty())
        .collect()
}

/// Keep the past (`is_past`) or current (`!is_past`) windows at `now`,
/// grouping items that share a window.
pub fn plan_windows(merged: &MergedRanges, now: i64, is_past: bool) -> StageWindowPlan {
    let mut plan = StageWindowPlan::new();
    for (stage_id, items) in merged {
        let mut by_range: BTreeMap<(i64, bool, Option<i64>), PlannedWindow> = BTreeMap::new();
        for (item_id, ranges) in items {
            for range in ranges {
                if range.contains(now) == is_past {
                    continue;
                }
                by_range
                    .entry((range.start, range.end.is_none(), range.end))
                    .or_insert_with(|| PlannedWindow {
                        range: range.clone(),
                        item_ids: BTreeSet::new(),
                    })
                    .item_ids
                    .insert(item_id.clone());
            }
        }
        if !by_range.is_empty() {
            plan.insert(stage_id.clone(), by_range.into_values().collect());
        }
    }
    plan
}

/// Longest per-stage window list; the number of engine passes.
pub fn pass_count(plan: &StageWindowPlan) -> usize {
    plan.values().map(Vec::len).max().unwrap_or(0)
}

/// Cut `[start, end)` at every stored window boundary of `stage_id` that
/// falls strictly inside it.
///
/// Each piece then has a single drop set, so zero-filling stays correct when
/// a custom query spans a drop-set change. With no inner boundary the whole
/// span comes back as one range.
pub fn split_time_ranges(records: &[StageItemRange], stage_id: &str, start: i64, end: Option<i64>) -> Vec<TimeRange> {
    let cuts: BTreeSet<i64> = records
        .iter()
        .filter(|r| r.stage_id == stage_id)
        .filter_map(|r| r.range.clip(start, end))
        .flat_map(|r| std::iter::once(r.start).chain(r.end))
        .filter(|&t| t > start && end.map_or(true, |e| t < e))
        .collect();

    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut lo = start;
    for cut in cuts {
        pieces.push(TimeRange::bounded(lo, cut));
        lo = cut;
    }
    pieces.push(TimeRange::new(lo, end));
    pieces
}
