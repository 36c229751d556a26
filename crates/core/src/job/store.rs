//! Job storage trait and types.

use std::fmt;

use chrono::{DateTime, Utc};

use super::types::{ConversionJob, JobTransition};
use crate::auth::Identity;
use crate::backend::{Backend, OutputFormat};

/// Error type for job operations.
#[derive(Debug)]
pub enum JobError {
    /// Job not found.
    NotFound(String),
    /// The requested transition is not allowed from the current state.
    InvalidTransition {
        job_id: String,
        current_state: String,
        transition: String,
    },
    /// Database error.
    Database(String),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::NotFound(id) => write!(f, "Job not found: {}", id),
            JobError::InvalidTransition {
                job_id,
                current_state,
                transition,
            } => write!(
                f,
                "Cannot {} job {}: current state is {}",
                transition, job_id, current_state
            ),
            JobError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for JobError {}

/// Request to create a new job. Jobs always start in `Created`.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub identity: Identity,
    pub backend: Backend,
    pub output_format: OutputFormat,
    pub filename: String,
    pub file_size_bytes: u64,
    pub file_extension: String,
    pub batch_id: Option<String>,
    pub input_ref: Option<String>,
}

/// Filter for querying jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Filter by state type.
    pub states: Vec<String>,
    /// Filter by owner scope (see [`Identity::scope`]).
    pub owner_scope: Option<String>,
    pub batch_id: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl JobFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            owner_scope: None,
            batch_id: None,
            limit: 100,
            offset: 0,
        }
    }

    /// Filter by state type. Repeated calls match any of the given states.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.states.push(state.into());
        self
    }

    pub fn with_owner(mut self, owner: &Identity) -> Self {
        self.owner_scope = Some(owner.scope());
        self
    }

    pub fn with_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    /// Set limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for job storage backends.
pub trait JobStore: Send + Sync {
    fn create(&self, request: CreateJobRequest) -> Result<ConversionJob, JobError>;

    fn get(&self, id: &str) -> Result<Option<ConversionJob>, JobError>;

    /// List jobs matching the filter, oldest first.
    fn list(&self, filter: &JobFilter) -> Result<Vec<ConversionJob>, JobError>;

    fn count(&self, filter: &JobFilter) -> Result<i64, JobError>;

    /// Apply a state transition atomically. Fails with `InvalidTransition`
    /// when the job's current state does not allow it.
    fn transition(&self, id: &str, transition: JobTransition) -> Result<ConversionJob, JobError>;

    /// Clear the staged-input reference once the file is gone.
    fn clear_input_ref(&self, id: &str) -> Result<(), JobError>;

    /// Delete terminal jobs outside any batch last updated before `cutoff`.
    /// Returns the number removed.
    fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<usize, JobError>;

    /// Delete every job belonging to one of `batch_ids`.
    fn purge_batch_members(&self, batch_ids: &[String]) -> Result<usize, JobError>;
}
