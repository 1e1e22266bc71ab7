// crates/core/src/testing.rs
//! Scripted collaborators for unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::conditions::QueryConditions;
use crate::engine::MatrixEngine;
use crate::error::MatrixResult;
use crate::freshness::LastUpdateTimes;
use crate::provider::{DropInfoProvider, RawAggregator, StaticConfig};
use crate::types::{AggregateRow, Server, StageItemRange};

type Script = Box<dyn Fn(&QueryConditions) -> MatrixResult<Vec<AggregateRow>> + Send + Sync>;

pub(crate) struct FakeAggregator {
    script: Script,
    delay: Option<Duration>,
    pub(crate) calls: Mutex<Vec<QueryConditions>>,
}

impl FakeAggregator {
    pub(crate) fn new(
        script: impl Fn(&QueryConditions) -> MatrixResult<Vec<AggregateRow>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn returning(rows: Vec<AggregateRow>) -> Self {
        Self::new(move |_| Ok(rows.clone()))
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RawAggregator for FakeAggregator {
    async fn aggregate(&self, conditions: &QueryConditions) -> MatrixResult<Vec<AggregateRow>> {
        self.calls.lock().unwrap().push(conditions.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.script)(conditions)
    }
}

#[derive(Default)]
pub(crate) struct FakeDropInfo {
    /// stage -> list of (from, items); the latest `from <= at` wins.
    drop_sets: HashMap<String, Vec<(i64, HashSet<String>)>>,
    ranges: Vec<StageItemRange>,
}

impl FakeDropInfo {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn drop_set_from(mut self, stage_id: &str, from: i64, items: &[&str]) -> Self {
        let entry = self.drop_sets.entry(stage_id.to_string()).or_default();
        entry.push((from, items.iter().map(|s| s.to_string()).collect()));
        entry.sort_by_key(|(from, _)| *from);
        self
    }

    pub(crate) fn drop_set(self, stage_id: &str, items: &[&str]) -> Self {
        self.drop_set_from(stage_id, i64::MIN, items)
    }

    pub(crate) fn range(mut self, record: StageItemRange) -> Self {
        self.ranges.push(record);
        self
    }
}

#[async_trait]
impl DropInfoProvider for FakeDropInfo {
    async fn drop_set(&self, _server: Server, stage_id: &str, at: i64) -> MatrixResult<HashSet<String>> {
        Ok(self
            .drop_sets
            .get(stage_id)
            .and_then(|sets| sets.iter().rev().find(|(from, _)| *from <= at))
            .map(|(_, items)| items.clone())
            .unwrap_or_default())
    }

    async fn opening_stages(&self, _server: Server, _at: i64) -> MatrixResult<HashSet<String>> {
        Ok(self.drop_sets.keys().cloned().collect())
    }

    async fn time_ranges(&self, _server: Server) -> MatrixResult<Vec<StageItemRange>> {
        Ok(self.ranges.clone())
    }
}

pub(crate) fn engine(aggregator: FakeAggregator, drop_info: FakeDropInfo, config: StaticConfig) -> (MatrixEngine, Arc<FakeAggregator>) {
    let aggregator = Arc::new(aggregator);
    let engine = MatrixEngine::new(
        aggregator.clone(),
        Arc::new(drop_info),
        Arc::new(config),
        Arc::new(LastUpdateTimes::new()),
    );
    (engine, aggregator)
}
