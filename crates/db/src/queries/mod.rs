// crates/db/src/queries/mod.rs
// Query modules for the drop statistics database, one per collaborator role.

mod aggregate;
mod drop_info;
pub mod drops;
mod matrix_store;
mod properties;
