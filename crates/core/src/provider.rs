// crates/core/src/provider.rs
//! Collaborator interfaces consumed by the engine.
//!
//! Implementations include:
//! - `dropstats_db::Database`: SQLite-backed executor, drop info, config and cache
//! - `MemoryMatrixStore`: in-process cache for tests and embedding

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::conditions::QueryConditions;
use crate::element::DropMatrixElement;
use crate::error::{MatrixError, MatrixResult};
use crate::types::{AggregateRow, MatrixKind, Server, StageItemRange};

/// Executes grouped sums over stored observations.
#[async_trait]
pub trait RawAggregator: Send + Sync {
    /// Group by stage + item (+ section when `conditions.interval` is set).
    ///
    /// Every row of one stage/section group must carry the same `times`.
    async fn aggregate(&self, conditions: &QueryConditions) -> MatrixResult<Vec<AggregateRow>>;
}

/// Knows which items can drop where, and when.
#[async_trait]
pub trait DropInfoProvider: Send + Sync {
    /// Items eligible to drop in `stage_id` at instant `at`.
    async fn drop_set(&self, server: Server, stage_id: &str, at: i64) -> MatrixResult<HashSet<String>>;

    /// Stages open at instant `at`.
    async fn opening_stages(&self, server: Server, at: i64) -> MatrixResult<HashSet<String>>;

    /// Every stored accumulation window of the server.
    async fn time_ranges(&self, server: Server) -> MatrixResult<Vec<StageItemRange>>;
}

/// Integer-valued runtime settings, read at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    MaxSectionNum,
    PastGlobalMatrixQueryTimeout,
    CurrentGlobalMatrixQueryTimeout,
    AdvancedQueryTimeout,
    AdvancedQueryRequestNumMax,
    MatrixRefreshInterval,
    TrendInterval,
    TrendRange,
}

impl ConfigKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::MaxSectionNum => "maxSectionNum",
            ConfigKey::PastGlobalMatrixQueryTimeout => "pastGlobalMatrixQueryTimeout",
            ConfigKey::CurrentGlobalMatrixQueryTimeout => "currentGlobalMatrixQueryTimeout",
            ConfigKey::AdvancedQueryTimeout => "advancedQueryTimeout",
            ConfigKey::AdvancedQueryRequestNumMax => "advancedQueryRequestNumMax",
            ConfigKey::MatrixRefreshInterval => "matrixRefreshInterval",
            ConfigKey::TrendInterval => "trendInterval",
            ConfigKey::TrendRange => "trendRange",
        }
    }
}

#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// `None` when the key is absent or not an integer.
    async fn get_i64(&self, key: ConfigKey) -> Option<i64>;
}

/// Cached matrices, keyed by (kind, server, is_past).
#[async_trait]
pub trait MatrixStore: Send + Sync {
    async fn load(&self, kind: MatrixKind, server: Server, is_past: bool) -> MatrixResult<Vec<DropMatrixElement>>;

    /// Delete-then-insert the rows for one key.
    async fn replace(
        &self,
        kind: MatrixKind,
        server: Server,
        is_past: bool,
        elements: Vec<DropMatrixElement>,
    ) -> MatrixResult<()>;
}

type StoreKey = (MatrixKind, Server, bool);

/// In-process matrix cache. Empty at construction.
#[derive(Debug, Default)]
pub struct MemoryMatrixStore {
    rows: RwLock<HashMap<StoreKey, Vec<DropMatrixElement>>>,
}

impl MemoryMatrixStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatrixStore for MemoryMatrixStore {
    async fn load(&self, kind: MatrixKind, server: Server, is_past: bool) -> MatrixResult<Vec<DropMatrixElement>> {
        let rows = self
            .rows
            .read()
            .map_err(|e| MatrixError::collaborator(format!("RwLock poisoned reading matrix store: {e}")))?;
        Ok(rows.get(&(kind, server, is_past)).cloned().unwrap_or_default())
    }

    async fn replace(
        &self,
        kind: MatrixKind,
        server: Server,
        is_past: bool,
        elements: Vec<DropMatrixElement>,
    ) -> MatrixResult<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| MatrixError::collaborator(format!("RwLock poisoned writing matrix store: {e}")))?;
        rows.insert((kind, server, is_past), elements);
        Ok(())
    }
}

/// Fixed config values, mostly for tests.
#[derive(Debug, Default, Clone)]
pub struct StaticConfig {
    values: HashMap<ConfigKey, i64>,
}

impl StaticConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: ConfigKey, value: i64) -> Self {
        self.values.insert(key, value);
        self
    }
}

#[async_trait]
impl ConfigProvider for StaticConfig {
    async fn get_i64(&self, key: ConfigKey) -> Option<i64> {
        self.values.get(&key).copied()
    }
}
