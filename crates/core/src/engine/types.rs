//! Types for the conversion engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::accounts::{AccountError, Tier};
use crate::auth::{Identity, IdentityKind};
use crate::backend::{Backend, OutputFormat};
use crate::batch::{Batch, BatchError};
use crate::intake::ValidationError;
use crate::job::{ConversionJob, JobError};
use crate::quota::{QuotaError, UsageSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    Job,
    Batch,
    Artifact,
}

impl NotFoundKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotFoundKind::Job => "job",
            NotFoundKind::Batch => "batch",
            NotFoundKind::Artifact => "artifact",
        }
    }
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned to callers of the engine.
///
/// Everything here is raised synchronously, before or instead of a job.
/// Backend failures never surface as an `EngineError`; they live in the job
/// record.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("daily conversion limit reached ({current}/{limit})")]
    QuotaExceeded { limit: u32, current: u32 },

    #[error("the pro backend requires a paid plan or an active trial")]
    ProAccessRequired,

    #[error("the {0} backend is not configured")]
    BackendUnavailable(Backend),

    #[error("too many jobs waiting, try again later")]
    Busy,

    #[error("{kind} not found: {id}")]
    NotFound { kind: NotFoundKind, id: String },

    #[error("job {job_id} is {state}, result not ready")]
    NotReady { job_id: String, state: String },

    #[error("batch has {count} files, the limit is {limit}")]
    TooManyFiles { count: usize, limit: usize },

    #[error("batch contains no valid files")]
    EmptyBatch { rejected: Vec<RejectedFile> },

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(kind: NotFoundKind, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable kebab-case code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(e) => e.code(),
            EngineError::QuotaExceeded { .. } => "quota-exceeded",
            EngineError::ProAccessRequired => "pro-access-required",
            EngineError::BackendUnavailable(_) => "backend-unavailable",
            EngineError::Busy => "busy",
            EngineError::NotFound { .. } => "not-found",
            EngineError::NotReady { .. } => "job-not-ready",
            EngineError::TooManyFiles { .. } => "too-many-files",
            EngineError::EmptyBatch { .. } => "empty-batch",
            EngineError::Internal(_) => "internal",
        }
    }
}

impl From<QuotaError> for EngineError {
    fn from(e: QuotaError) -> Self {
        match e {
            QuotaError::Exceeded { limit, current } => {
                EngineError::QuotaExceeded { limit, current }
            }
            QuotaError::Database(msg) => EngineError::Internal(msg),
        }
    }
}

impl From<JobError> for EngineError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::NotFound(id) => EngineError::not_found(NotFoundKind::Job, id),
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl From<BatchError> for EngineError {
    fn from(e: BatchError) -> Self {
        match e {
            BatchError::NotFound(id) => EngineError::not_found(NotFoundKind::Batch, id),
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl From<AccountError> for EngineError {
    fn from(e: AccountError) -> Self {
        EngineError::Internal(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Internal(e.to_string())
    }
}

/// A single-file conversion request.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub identity: Identity,
    pub filename: String,
    pub content: Vec<u8>,
    pub backend: Backend,
    pub output_format: OutputFormat,
}

/// One uploaded file of a batch.
#[derive(Debug, Clone)]
pub struct BatchFile {
    pub filename: String,
    pub content: Vec<u8>,
}

impl BatchFile {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub identity: Identity,
    pub files: Vec<BatchFile>,
    pub backend: Backend,
    pub output_format: OutputFormat,
}

/// A batch file that did not become a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedFile {
    pub filename: String,
    pub code: String,
    pub message: String,
}

impl RejectedFile {
    pub fn from_validation(filename: &str, error: &ValidationError) -> Self {
        Self {
            filename: filename.to_string(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchReceipt {
    pub batch: Batch,
    pub accepted: Vec<ConversionJob>,
    pub rejected: Vec<RejectedFile>,
}

#[derive(Debug, Clone)]
pub struct BatchStatus {
    pub batch: Batch,
    pub jobs: Vec<ConversionJob>,
}

/// A retrieved conversion result.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: String,
    pub content: String,
    pub media_type: String,
    /// Download name: the upload's stem with the output extension.
    pub filename: String,
}

/// Name for a converted file: `report.pdf` becomes `report.md`.
pub fn output_filename(source: &str, format: OutputFormat) -> String {
    let stem = match source.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => source,
    };
    format!("{}.{}", stem, format.file_extension())
}

/// Entitlement and today's usage for one identity.
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub identity_kind: IdentityKind,
    pub tier: Tier,
    pub pro_access: bool,
    pub on_trial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_ends_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub usage: UsageSnapshot,
}

/// Current status of the engine.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub pool_size: usize,
    pub busy_workers: usize,
    /// Jobs admitted and waiting for a worker.
    pub waiting_jobs: usize,
    pub queued_count: usize,
    pub running_count: usize,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub expired_count: usize,
}

/// What one maintenance pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub trials_expired: usize,
    pub jobs_expired: usize,
    pub artifacts_removed: usize,
    pub jobs_purged: usize,
    pub batches_purged: usize,
}
