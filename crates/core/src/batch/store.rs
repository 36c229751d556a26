use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{Batch, BatchOutcome};
use crate::auth::Identity;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),
}

/// Trait for batch storage backends.
pub trait BatchStore: Send + Sync {
    fn create(&self, owner: &Identity, total_jobs: u32) -> Result<Batch, BatchError>;

    fn get(&self, id: &str) -> Result<Option<Batch>, BatchError>;

    /// Count one finished member job. Never pushes the counters past
    /// `total_jobs`; sets `completed_at` when the last member finishes.
    fn record_outcome(
        &self,
        id: &str,
        outcome: BatchOutcome,
        now: DateTime<Utc>,
    ) -> Result<Batch, BatchError>;

    /// Delete completed batches finished before `cutoff`. Returns their ids so
    /// member jobs can be removed with them.
    fn purge_completed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, BatchError>;
}
