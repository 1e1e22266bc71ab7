// crates/core/src/segmented.rs
//! Trend aggregation: one span cut into fixed-width sections, one element per
//! section per (stage, item). Sections are never folded together.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::conditions::QueryConditions;
use crate::element::DropMatrixElement;
use crate::engine::MatrixEngine;
use crate::error::{MatrixError, MatrixResult};
use crate::freshness::UpdateKey;
use crate::provider::ConfigKey;
use crate::time_range::TimeRange;
use crate::types::Server;

/// Parameters of a segmented aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRequest {
    pub server: Server,
    pub stage_id: Option<String>,
    pub item_ids: Vec<String>,
    pub start: i64,
    /// Defaults to "now" when unset.
    pub end: Option<i64>,
    pub user_ids: Vec<String>,
    pub interval: i64,
}

/// Number of `interval`-wide sections needed to cover `[start, end)`.
///
/// `None` for a non-positive interval, or when the span or the end of the
/// last section does not fit in an `i64`.
pub fn section_count(start: i64, end: i64, interval: i64) -> Option<i64> {
    if interval <= 0 {
        return None;
    }
    let span = end.checked_sub(start)?;
    let sections = span / interval + i64::from(span % interval != 0);
    sections.checked_mul(interval).and_then(|width| start.checked_add(width))?;
    Some(sections)
}

/// Absolute window of section `index`. Callers keep `index` below the
/// [`section_count`] of the span.
pub fn section_range(start: i64, interval: i64, index: i64) -> TimeRange {
    let lo = start + index * interval;
    TimeRange::bounded(lo, lo + interval)
}

impl MatrixEngine {
    /// Fails with `SectionLimitExceeded` when `requested` is above the
    /// configured maximum. A missing key means no limit.
    pub async fn check_section_limit(&self, requested: i64) -> MatrixResult<()> {
        match self.config.get_i64(ConfigKey::MaxSectionNum).await {
            Some(max) if requested > max => Err(MatrixError::SectionLimitExceeded { requested, max }),
            Some(_) => Ok(()),
            None => {
                debug!(key = ConfigKey::MaxSectionNum.as_str(), "Config key missing, section count unbounded");
                Ok(())
            }
        }
    }

    /// Segmented elements sorted by window start.
    ///
    /// Degenerate spans and spans needing more sections than allowed yield an
    /// empty result and a log line rather than an error.
    pub async fn compute_segments(&self, request: &SegmentRequest, now: i64) -> MatrixResult<Vec<DropMatrixElement>> {
        let start = request.start;
        let end = request.end.unwrap_or(now);
        let interval = request.interval;
        if interval <= 0 || start >= end {
            warn!(start, end, interval, "Empty or inverted segment span, nothing to aggregate");
            return Ok(Vec::new());
        }
        let Some(sections) = section_count(start, end, interval) else {
            warn!(start, end, interval, "Segment span overflows, nothing to aggregate");
            return Ok(Vec::new());
        };
        if let Err(err) = self.check_section_limit(sections).await {
            error!(error = %err, "Exceeded max section num");
            return Ok(Vec::new());
        }

        let conditions = QueryConditions::new()
            .server(request.server)
            .user_ids(request.user_ids.iter().cloned())
            .item_ids(request.item_ids.iter().cloned())
            .stage(request.stage_id.as_deref(), start, Some(end))
            .interval(interval);
        let rows = self.aggregator.aggregate(&conditions).await?;

        // stage -> item -> section -> (quantity, times)
        let mut observed: BTreeMap<String, BTreeMap<String, HashMap<i64, (i64, i64)>>> = BTreeMap::new();
        // stage -> section -> clears
        let mut times_by_section: HashMap<String, HashMap<i64, i64>> = HashMap::new();
        for row in rows {
            let Some(section) = row.section.filter(|s| (0..sections).contains(s)) else {
                warn!(stage_id = %row.stage_id, section = ?row.section, "Row outside the requested sections");
                continue;
            };
            times_by_section
                .entry(row.stage_id.clone())
                .or_default()
                .insert(section, row.times);
            if let Some(item_id) = row.item_id {
                observed
                    .entry(row.stage_id)
                    .or_default()
                    .entry(item_id)
                    .or_default()
                    .insert(section, (row.quantity, row.times));
            }
        }

        let mut elements = Vec::new();
        for (stage_id, items) in &observed {
            let stage_times = times_by_section.get(stage_id);
            for (item_id, by_section) in items {
                for section in 0..sections {
                    let (quantity, times) = by_section.get(&section).copied().unwrap_or_else(|| {
                        let times = stage_times.and_then(|t| t.get(&section)).copied().unwrap_or(0);
                        (0, times)
                    });
                    elements.push(DropMatrixElement::new(
                        stage_id.as_str(),
                        item_id.as_str(),
                        quantity,
                        times,
                        &section_range(start, interval, section),
                        now,
                    ));
                }
            }
        }
        elements.sort_by(|a, b| (a.start, &a.stage_id, &a.item_id).cmp(&(b.start, &b.stage_id, &b.item_id)));
        Ok(elements)
    }

    /// Trend over the trailing `range` milliseconds for every stage.
    pub async fn compute_global_trend(
        &self,
        server: Server,
        interval: i64,
        range: i64,
        now: i64,
    ) -> MatrixResult<Vec<DropMatrixElement>> {
        let started = Instant::now();
        let start = now
            .checked_sub(range)
            .ok_or_else(|| MatrixError::InvalidQuery(format!("trend range {range} overflows from {now}")))?;
        let request = SegmentRequest {
            server,
            stage_id: None,
            item_ids: Vec::new(),
            start,
            end: Some(now),
            user_ids: Vec::new(),
            interval,
        };
        let result = self.compute_segments(&request, now).await?;
        self.last_updates
            .record(UpdateKey::Trend { server, interval, range }, now);
        info!(
            server = %server,
            interval,
            range,
            elements = result.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Global trend computed"
        );
        Ok(result)
    }
}
