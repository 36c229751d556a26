//! Batch upload and status handlers.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use mdraft_core::engine::{BatchFile, BatchRequest, RejectedFile};
use serde::Serialize;
use tracing::info;

use super::error::ApiError;
use super::jobs::{status_url, JobResponse};
use super::middleware::CallerIdentity;
use super::upload::UploadForm;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AcceptedFile {
    pub job_id: String,
    pub filename: String,
    pub status_url: String,
}

#[derive(Debug, Serialize)]
pub struct CreateBatchResponse {
    pub batch_id: String,
    pub status_url: String,
    pub total_jobs: u32,
    pub accepted: Vec<AcceptedFile>,
    pub rejected: Vec<RejectedFile>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub batch_id: String,
    pub total_jobs: u32,
    pub succeeded_count: u32,
    pub failed_count: u32,
    pub progress: u8,
    pub complete: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub jobs: Vec<JobResponse>,
}

fn batch_url(batch_id: &str) -> String {
    format!("/api/v1/batches/{}", batch_id)
}

/// POST /api/v1/batches
///
/// Multipart form with one `files` part per document. Invalid files are
/// reported in `rejected`; the rest become jobs of one batch.
pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    CallerIdentity(identity): CallerIdentity,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<CreateBatchResponse>), ApiError> {
    let form = UploadForm::read(&mut multipart, "files").await?;
    if form.files.is_empty() {
        return Err(ApiError::bad_request("missing 'files' field"));
    }

    let receipt = state
        .engine()
        .create_batch(BatchRequest {
            identity,
            files: form
                .files
                .into_iter()
                .map(|f| BatchFile::new(f.filename, f.content))
                .collect(),
            backend: form.backend,
            output_format: form.format,
        })
        .await?;

    info!(
        batch_id = %receipt.batch.id,
        accepted = receipt.accepted.len(),
        rejected = receipt.rejected.len(),
        "Batch accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateBatchResponse {
            status_url: batch_url(&receipt.batch.id),
            total_jobs: receipt.batch.total_jobs,
            accepted: receipt
                .accepted
                .into_iter()
                .map(|job| AcceptedFile {
                    status_url: status_url(&job.id),
                    job_id: job.id,
                    filename: job.filename,
                })
                .collect(),
            rejected: receipt.rejected,
            batch_id: receipt.batch.id,
        }),
    ))
}

/// GET /api/v1/batches/{batch_id}
pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    CallerIdentity(identity): CallerIdentity,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchResponse>, ApiError> {
    let status = state.engine().batch_status(&identity, &batch_id)?;
    let batch = status.batch;

    Ok(Json(BatchResponse {
        progress: batch.progress_percent(),
        complete: batch.completed_at.is_some(),
        batch_id: batch.id,
        total_jobs: batch.total_jobs,
        succeeded_count: batch.succeeded_count,
        failed_count: batch.failed_count,
        created_at: batch.created_at,
        completed_at: batch.completed_at,
        jobs: status.jobs.into_iter().map(JobResponse::from).collect(),
    }))
}
