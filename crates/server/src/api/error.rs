//! Mapping from engine and auth errors to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mdraft_core::engine::RejectedFile;
use mdraft_core::{AuthError, EngineError, ValidationError};
use serde::Serialize;
use tracing::error;

/// Error body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected: Option<Vec<RejectedFile>>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            limit: None,
            current: None,
            rejected: None,
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    Auth(AuthError),
    /// Malformed request: missing field, unknown backend or format.
    BadRequest(String),
    /// The multipart body could not be read.
    Upload { status: StatusCode, message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Auth(e)
    }
}

/// HTTP status for an engine error.
pub fn engine_status(e: &EngineError) -> StatusCode {
    match e {
        EngineError::Validation(ValidationError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
        EngineError::Validation(ValidationError::UnsupportedType { .. }) => {
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        }
        EngineError::Validation(_)
        | EngineError::TooManyFiles { .. }
        | EngineError::EmptyBatch { .. } => StatusCode::BAD_REQUEST,
        EngineError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        EngineError::ProAccessRequired => StatusCode::FORBIDDEN,
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::NotReady { .. } => StatusCode::CONFLICT,
        EngineError::Busy | EngineError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Engine(e) => {
                let status = engine_status(&e);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(error = %e, "Request failed");
                }
                let mut body = ErrorResponse::new(e.code(), e.to_string());
                match e {
                    EngineError::QuotaExceeded { limit, current } => {
                        body.limit = Some(limit);
                        body.current = Some(current);
                    }
                    EngineError::EmptyBatch { rejected } => body.rejected = Some(rejected),
                    _ => {}
                }
                (status, body)
            }
            ApiError::Auth(e) => match e {
                AuthError::NotAuthenticated | AuthError::InvalidCredentials(_) => (
                    StatusCode::UNAUTHORIZED,
                    ErrorResponse::new("unauthorized", e.to_string()),
                ),
                AuthError::ServiceUnavailable(_) | AuthError::ConfigurationError(_) => {
                    error!(error = %e, "Identity resolution failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorResponse::new("internal", e.to_string()),
                    )
                }
            },
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("bad-request", message),
            ),
            ApiError::Upload { status, message } => {
                let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "too-large"
                } else {
                    "bad-request"
                };
                (status, ErrorResponse::new(code, message))
            }
        };

        (status, Json(body)).into_response()
    }
}
