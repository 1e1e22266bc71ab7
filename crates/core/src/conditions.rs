// crates/core/src/conditions.rs
//! Filter and grouping description handed to the raw aggregation executor.

use crate::time_range::TimeRange;
use crate::types::Server;

/// One stage restriction. `stage_id == None` matches every stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageWindow {
    pub stage_id: Option<String>,
    pub start: i64,
    pub end: Option<i64>,
}

/// What to aggregate and how to group it.
///
/// An empty `stages` list means all stages over all time. Setting `interval`
/// switches the executor into bucketed mode: rows carry a `section` index
/// counted from the stage window's start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryConditions {
    pub server: Option<Server>,
    pub user_ids: Vec<String>,
    pub item_ids: Vec<String>,
    pub stages: Vec<StageWindow>,
    pub interval: Option<i64>,
    /// Trailing lookback in milliseconds from the executor's "now".
    pub range: Option<i64>,
}

impl QueryConditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(mut self, server: Server) -> Self {
        self.server = Some(server);
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_ids.push(user_id.into());
        self
    }

    pub fn user_ids<I, S>(mut self, user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_ids.extend(user_ids.into_iter().map(Into::into));
        self
    }

    pub fn item_ids<I, S>(mut self, item_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.item_ids.extend(item_ids.into_iter().map(Into::into));
        self
    }

    pub fn stage(mut self, stage_id: Option<&str>, start: i64, end: Option<i64>) -> Self {
        self.stages.push(StageWindow {
            stage_id: stage_id.map(str::to_string),
            start,
            end,
        });
        self
    }

    pub fn stage_range(self, stage_id: &str, range: &TimeRange) -> Self {
        self.stage(Some(stage_id), range.start, range.end)
    }

    pub fn interval(mut self, interval: i64) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn range(mut self, range: i64) -> Self {
        self.range = Some(range);
        self
    }

    pub fn is_bucketed(&self) -> bool {
        self.interval.is_some()
    }

    pub fn is_personal(&self) -> bool {
        !self.user_ids.is_empty()
    }
}
