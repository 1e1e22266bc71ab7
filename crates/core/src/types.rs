// crates/core/src/types.rs
//! Shared value types: servers, cache kinds, typed aggregation rows and
//! stored accumulation-window records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::time_range::TimeRange;

/// Game server region. Each server has an independent drop matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Server {
    Cn,
    Us,
    Jp,
    Kr,
}

impl Server {
    pub const ALL: [Server; 4] = [Server::Cn, Server::Us, Server::Jp, Server::Kr];

    pub fn as_str(&self) -> &'static str {
        match self {
            Server::Cn => "CN",
            Server::Us => "US",
            Server::Jp => "JP",
            Server::Kr => "KR",
        }
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Server {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CN" => Ok(Server::Cn),
            "US" => Ok(Server::Us),
            "JP" => Ok(Server::Jp),
            "KR" => Ok(Server::Kr),
            other => Err(format!("unknown server: {other}")),
        }
    }
}

/// Row type of a cached matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatrixKind {
    /// Folded per-(stage, item) statistics.
    Regular,
    /// Per-bucket trend statistics.
    Segmented,
}

impl MatrixKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatrixKind::Regular => "REGULAR",
            MatrixKind::Segmented => "SEGMENTED",
        }
    }
}

impl FromStr for MatrixKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REGULAR" => Ok(MatrixKind::Regular),
            "SEGMENTED" => Ok(MatrixKind::Segmented),
            other => Err(format!("unknown matrix kind: {other}")),
        }
    }
}

/// One row returned by the raw aggregation executor.
///
/// `times` is the clear count of the whole stage (or stage + section) group,
/// repeated on every item row of that group. `item_id` is `None` for a group
/// that had clears but no drops. `section` is only set in bucketed mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRow {
    pub stage_id: String,
    pub item_id: Option<String>,
    pub quantity: i64,
    pub times: i64,
    pub section: Option<i64>,
}

impl AggregateRow {
    pub fn item(stage_id: &str, item_id: &str, quantity: i64, times: i64) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            item_id: Some(item_id.to_string()),
            quantity,
            times,
            section: None,
        }
    }

    /// A stage group with clears but nothing dropped.
    pub fn empty_stage(stage_id: &str, times: i64) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            item_id: None,
            quantity: 0,
            times,
            section: None,
        }
    }

    pub fn in_section(mut self, section: i64) -> Self {
        self.section = Some(section);
        self
    }
}

/// A stored accumulation window for one (stage, item) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageItemRange {
    pub stage_id: String,
    pub item_id: String,
    pub range: TimeRange,
}

impl StageItemRange {
    pub fn new(stage_id: impl Into<String>, item_id: impl Into<String>, range: TimeRange) -> Self {
        Self {
            stage_id: stage_id.into(),
            item_id: item_id.into(),
            range,
        }
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
