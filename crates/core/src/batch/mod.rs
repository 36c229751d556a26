//! Batches group jobs submitted together and track their rollup.
//!
//! Counters only move forward through [`BatchStore::record_outcome`], called
//! once per member job when it reaches a terminal state.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteBatchStore;
pub use store::{BatchError, BatchStore};
pub use types::{Batch, BatchOutcome};
