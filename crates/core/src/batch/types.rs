use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Identity;
use crate::job::JobState;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Batch {
    pub id: String,
    pub owner: Identity,
    pub total_jobs: u32,
    pub succeeded_count: u32,
    pub failed_count: u32,
    pub created_at: DateTime<Utc>,
    /// Set once every member job has finished.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Batch {
    pub fn finished_count(&self) -> u32 {
        self.succeeded_count + self.failed_count
    }

    pub fn is_complete(&self) -> bool {
        self.finished_count() >= self.total_jobs
    }

    /// `round(100 * finished / total)`.
    pub fn progress_percent(&self) -> u8 {
        if self.total_jobs == 0 {
            return 100;
        }
        let total = u64::from(self.total_jobs);
        let finished = u64::from(self.finished_count().min(self.total_jobs));
        ((200 * finished + total) / (2 * total)) as u8
    }
}

/// How a member job ended, as far as the rollup is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Succeeded,
    /// Failed or expired.
    Failed,
}

impl BatchOutcome {
    /// Outcome for a terminal job state, `None` while the job is in flight.
    pub fn from_state(state: &JobState) -> Option<Self> {
        match state {
            JobState::Succeeded { .. } => Some(BatchOutcome::Succeeded),
            JobState::Failed { .. } | JobState::Expired { .. } => Some(BatchOutcome::Failed),
            _ => None,
        }
    }
}
