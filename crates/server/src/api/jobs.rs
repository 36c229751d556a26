//! Single-file conversion and job status handlers.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use mdraft_core::engine::SubmitRequest;
use mdraft_core::job::FailureKind;
use mdraft_core::{Backend, ConversionJob, OutputFormat};
use serde::Serialize;
use tracing::info;

use super::error::ApiError;
use super::middleware::CallerIdentity;
use super::upload::UploadForm;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub job_id: String,
    pub state: &'static str,
    pub status_url: String,
}

#[derive(Debug, Serialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Public view of a job. Internal fields such as the staged input path and
/// the owner key are left out.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job_id: String,
    pub state: &'static str,
    pub progress: u8,
    pub backend: Backend,
    pub output_format: OutputFormat,
    pub filename: String,
    pub file_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
}

impl From<ConversionJob> for JobResponse {
    fn from(job: ConversionJob) -> Self {
        let error = job.state.failure().map(|(kind, message)| JobFailure {
            kind,
            message: message.to_string(),
        });
        let result_ref = job.result_ref().map(str::to_string);
        let result_url = result_ref.as_ref().map(|_| result_url(&job.id));

        Self {
            state: job.state.state_type(),
            progress: job.state.progress(),
            started_at: job.started_at(),
            completed_at: job.completed_at(),
            backend: job.backend,
            output_format: job.output_format,
            filename: job.filename,
            file_size_bytes: job.file_size_bytes,
            batch_id: job.batch_id,
            created_at: job.created_at,
            error,
            result_ref,
            result_url,
            job_id: job.id,
        }
    }
}

pub fn status_url(job_id: &str) -> String {
    format!("/api/v1/jobs/{}", job_id)
}

fn result_url(job_id: &str) -> String {
    format!("/api/v1/jobs/{}/result", job_id)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/convert
///
/// Multipart form with a `file` part and optional `backend` and `format`
/// fields.
pub async fn convert(
    State(state): State<Arc<AppState>>,
    CallerIdentity(identity): CallerIdentity,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ConvertResponse>), ApiError> {
    let form = UploadForm::read(&mut multipart, "file").await?;
    let mut files = form.files.into_iter();
    let file = match (files.next(), files.next()) {
        (Some(file), None) => file,
        (None, _) => return Err(ApiError::bad_request("missing 'file' field")),
        (Some(_), Some(_)) => {
            return Err(ApiError::bad_request(
                "expected a single 'file' part, use /batches for several files",
            ))
        }
    };

    let job = state
        .engine()
        .submit(SubmitRequest {
            identity,
            filename: file.filename,
            content: file.content,
            backend: form.backend,
            output_format: form.format,
        })
        .await?;

    info!(job_id = %job.id, backend = %job.backend, "Conversion accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(ConvertResponse {
            status_url: status_url(&job.id),
            state: job.state.state_type(),
            job_id: job.id,
        }),
    ))
}

/// GET /api/v1/jobs/{job_id}
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    CallerIdentity(identity): CallerIdentity,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state.engine().job_status(&identity, &job_id)?;
    Ok(Json(JobResponse::from(job)))
}

/// GET /api/v1/jobs/{job_id}/result
///
/// Returns the converted document once. Later calls get 404.
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    CallerIdentity(identity): CallerIdentity,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.engine().take_result(&identity, &job_id).await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        header_safe_filename(&result.filename)
    );

    Ok((
        [
            (header::CONTENT_TYPE, result.media_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        result.content,
    ))
}

/// Client filenames end up in a quoted header value.
fn header_safe_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdraft_core::{Identity, JobState};

    fn job(state: JobState) -> ConversionJob {
        let now = Utc::now();
        ConversionJob {
            id: "job-1".to_string(),
            identity: Identity::anonymous("abc"),
            backend: Backend::Standard,
            output_format: OutputFormat::Markdown,
            filename: "report.pdf".to_string(),
            file_size_bytes: 42,
            file_extension: "pdf".to_string(),
            state,
            batch_id: None,
            input_ref: Some("/tmp/staged".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_failed_job_exposes_error() {
        let now = Utc::now();
        let response = JobResponse::from(job(JobState::Failed {
            started_at: Some(now),
            completed_at: now,
            kind: FailureKind::Timeout,
            message: "deadline exceeded".to_string(),
        }));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["progress"], 100);
        assert_eq!(json["error"]["kind"], "timeout");
        assert!(json.get("result_url").is_none());
        assert!(json.get("input_ref").is_none());
        assert!(json.get("identity").is_none());
    }

    #[test]
    fn test_succeeded_job_links_result() {
        let now = Utc::now();
        let response = JobResponse::from(job(JobState::Succeeded {
            started_at: now,
            completed_at: now,
            result_ref: "art-1".to_string(),
        }));
        assert_eq!(response.result_ref.as_deref(), Some("art-1"));
        assert_eq!(
            response.result_url.as_deref(),
            Some("/api/v1/jobs/job-1/result")
        );
        assert!(response.error.is_none());
    }

    #[test]
    fn test_header_safe_filename() {
        assert_eq!(header_safe_filename("report.md"), "report.md");
        assert_eq!(header_safe_filename("my \"file\".md"), "my _file_.md");
        assert_eq!(header_safe_filename("résumé.md"), "r_sum_.md");
    }
}
