//! Core job data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::Identity;
use crate::backend::{Backend, OutputFormat};

/// Classification of a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    BackendError,
    EmptyResult,
    InternalError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::BackendError => "backend_error",
            FailureKind::EmptyResult => "empty_result",
            FailureKind::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job. Each variant carries the data that only exists
/// in that state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobState {
    /// Row exists and quota is reserved; not yet handed to the pool.
    Created,

    /// Waiting for a worker slot.
    Queued {
        queued_at: DateTime<Utc>,
        /// Still queued after this instant means the job expires.
        expires_at: DateTime<Utc>,
    },

    /// A worker is executing the backend.
    Running {
        started_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    },

    Succeeded {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        /// Handle into the artifact store.
        result_ref: String,
    },

    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        started_at: Option<DateTime<Utc>>,
        completed_at: DateTime<Utc>,
        kind: FailureKind,
        message: String,
    },

    /// Never started: waited too long for a worker, or abandoned by a restart.
    Expired { completed_at: DateTime<Utc> },
}

impl JobState {
    pub fn state_type(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Queued { .. } => "queued",
            JobState::Running { .. } => "running",
            JobState::Succeeded { .. } => "succeeded",
            JobState::Failed { .. } => "failed",
            JobState::Expired { .. } => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded { .. } | JobState::Failed { .. } | JobState::Expired { .. }
        )
    }

    /// Coarse progress for status polling.
    pub fn progress(&self) -> u8 {
        match self {
            JobState::Created => 0,
            JobState::Queued { .. } => 10,
            JobState::Running { .. } => 50,
            _ => 100,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            JobState::Running { started_at, .. } | JobState::Succeeded { started_at, .. } => {
                Some(*started_at)
            }
            JobState::Failed { started_at, .. } => *started_at,
            _ => None,
        }
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            JobState::Succeeded { completed_at, .. }
            | JobState::Failed { completed_at, .. }
            | JobState::Expired { completed_at } => Some(*completed_at),
            _ => None,
        }
    }

    pub fn result_ref(&self) -> Option<&str> {
        match self {
            JobState::Succeeded { result_ref, .. } => Some(result_ref),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<(FailureKind, &str)> {
        match self {
            JobState::Failed { kind, message, .. } => Some((*kind, message)),
            _ => None,
        }
    }

    /// State after applying `transition`, or `None` if the move is not allowed.
    pub fn apply(&self, transition: &JobTransition) -> Option<JobState> {
        let next = match (self, transition) {
            (
                JobState::Created,
                JobTransition::Enqueue {
                    queued_at,
                    expires_at,
                },
            ) => JobState::Queued {
                queued_at: *queued_at,
                expires_at: *expires_at,
            },
            (
                JobState::Queued { .. },
                JobTransition::Start {
                    started_at,
                    deadline,
                },
            ) => JobState::Running {
                started_at: *started_at,
                deadline: *deadline,
            },
            (
                JobState::Running { started_at, .. },
                JobTransition::Succeed {
                    completed_at,
                    result_ref,
                },
            ) => JobState::Succeeded {
                started_at: *started_at,
                completed_at: *completed_at,
                result_ref: result_ref.clone(),
            },
            (
                JobState::Running { started_at, .. },
                JobTransition::Fail {
                    completed_at,
                    kind,
                    message,
                },
            ) => JobState::Failed {
                started_at: Some(*started_at),
                completed_at: *completed_at,
                kind: *kind,
                message: message.clone(),
            },
            (JobState::Created | JobState::Queued { .. }, JobTransition::Expire { completed_at }) => {
                JobState::Expired {
                    completed_at: *completed_at,
                }
            }
            _ => return None,
        };
        Some(next)
    }
}

/// A requested state change.
#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    Enqueue {
        queued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    Start {
        started_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    },
    Succeed {
        completed_at: DateTime<Utc>,
        result_ref: String,
    },
    Fail {
        completed_at: DateTime<Utc>,
        kind: FailureKind,
        message: String,
    },
    Expire {
        completed_at: DateTime<Utc>,
    },
}

impl JobTransition {
    pub fn name(&self) -> &'static str {
        match self {
            JobTransition::Enqueue { .. } => "enqueue",
            JobTransition::Start { .. } => "start",
            JobTransition::Succeed { .. } => "succeed",
            JobTransition::Fail { .. } => "fail",
            JobTransition::Expire { .. } => "expire",
        }
    }

    pub fn fail(kind: FailureKind, message: impl Into<String>) -> Self {
        JobTransition::Fail {
            completed_at: Utc::now(),
            kind,
            message: message.into(),
        }
    }

    pub fn expire() -> Self {
        JobTransition::Expire {
            completed_at: Utc::now(),
        }
    }
}

/// One document conversion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversionJob {
    pub id: String,
    pub identity: Identity,
    pub backend: Backend,
    pub output_format: OutputFormat,
    pub filename: String,
    pub file_size_bytes: u64,
    pub file_extension: String,
    pub state: JobState,
    pub batch_id: Option<String>,
    /// Location of the staged upload while the job is in flight.
    pub input_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversionJob {
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.state.started_at()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.state.completed_at()
    }

    pub fn result_ref(&self) -> Option<&str> {
        self.state.result_ref()
    }
}
