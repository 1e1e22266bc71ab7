// crates/core/src/lib.rs
pub mod conditions;
pub mod element;
pub mod engine;
pub mod error;
pub mod filter;
pub mod freshness;
pub mod planner;
pub mod provider;
pub mod query;
pub mod segmented;
pub mod time_range;
pub mod types;

#[cfg(test)]
mod testing;

pub use conditions::*;
pub use element::*;
pub use engine::*;
pub use error::*;
pub use freshness::*;
pub use provider::*;
pub use query::*;
pub use segmented::*;
pub use time_range::*;
pub use types::*;
