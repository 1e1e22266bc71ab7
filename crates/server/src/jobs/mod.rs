// crates/server/src/jobs/mod.rs
//! Background matrix refresh.
//!
//! Provides:
//! - `RefreshTask`: one unit of recomputation for one server
//! - `RefreshWorker`: single consumer that computes and stores results
//! - `RefreshHandle`: producer side used by schedulers and triggers
//! - `RefreshState`: atomic progress counters
//! - `spawn_loop` / `spawn_all`: interval schedulers

pub mod scheduler;
pub mod state;
pub mod types;
pub mod worker;

pub use scheduler::{seed_past_matrices, spawn_all, spawn_loop};
pub use state::RefreshState;
pub use types::{RefreshProgress, RefreshStatus, RefreshTask};
pub use worker::{RefreshHandle, RefreshWorker};
