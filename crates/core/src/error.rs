// crates/core/src/error.rs
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the matrix engine and its query paths.
///
/// Data-integrity anomalies (an observed item outside the drop set, an empty
/// global cache after retry) are logged, not returned.
#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("Aggregation failed: {0}")]
    AggregationFailure(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Requested {requested} sections, max is {max}")]
    SectionLimitExceeded { requested: i64, max: i64 },

    #[error("Too many queries: {requested} requested, max is {max}")]
    TooManyQueries { requested: usize, max: usize },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),
}

impl MatrixError {
    pub fn aggregation(err: impl std::fmt::Display) -> Self {
        Self::AggregationFailure(err.to_string())
    }

    pub fn collaborator(err: impl std::fmt::Display) -> Self {
        Self::Collaborator(err.to_string())
    }

    /// Whether the failure came from the wall-clock budget rather than the data.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

pub type MatrixResult<T> = Result<T, MatrixError>;
