//! Error types for the conversion backends.

use thiserror::Error;

use crate::job::FailureKind;

/// Errors a backend can report for a single conversion.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend did not finish before the job deadline.
    #[error("Conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The backend finished but produced no text.
    #[error("Conversion produced no text")]
    EmptyResult,

    /// The converter process or remote service reported a failure.
    #[error("Conversion failed: {reason}")]
    Upstream {
        reason: String,
        detail: Option<String>,
    },

    /// Misconfiguration or a local fault unrelated to the document.
    #[error("Internal error: {reason}")]
    Internal { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn upstream(reason: impl Into<String>, detail: Option<String>) -> Self {
        Self::Upstream {
            reason: reason.into(),
            detail,
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Stable code used in job records and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::EmptyResult => "empty-result",
            Self::Upstream { .. } => "upstream-failure",
            Self::Internal { .. } | Self::Io(_) => "internal",
        }
    }

    /// How a job that hit this error is classified.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::EmptyResult => FailureKind::EmptyResult,
            Self::Upstream { .. } => FailureKind::BackendError,
            Self::Internal { .. } | Self::Io(_) => FailureKind::InternalError,
        }
    }

    /// Message stored on the failed job. Includes a short tail of the
    /// converter's diagnostics when there are any.
    pub fn job_message(&self) -> String {
        match self {
            Self::Upstream {
                reason,
                detail: Some(detail),
            } if !detail.trim().is_empty() => {
                format!("{}: {}", reason, tail(detail.trim(), 500))
            }
            other => other.to_string(),
        }
    }
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    let start = text
        .char_indices()
        .nth(skip)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_kinds() {
        let cases = [
            (BackendError::Timeout { timeout_secs: 5 }, "timeout", FailureKind::Timeout),
            (BackendError::EmptyResult, "empty-result", FailureKind::EmptyResult),
            (
                BackendError::upstream("exit 1", None),
                "upstream-failure",
                FailureKind::BackendError,
            ),
            (BackendError::internal("missing"), "internal", FailureKind::InternalError),
        ];
        for (err, code, kind) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.failure_kind(), kind);
        }
    }

    #[test]
    fn test_job_message_includes_detail_tail() {
        let err = BackendError::upstream("converter exited with 2", Some("x".repeat(600) + "END"));
        let msg = err.job_message();
        assert!(msg.starts_with("converter exited with 2: "));
        assert!(msg.ends_with("END"));
        assert!(msg.len() < 600);
    }

    #[test]
    fn test_job_message_without_detail() {
        let err = BackendError::upstream("service returned 500", Some("  ".to_string()));
        assert_eq!(err.job_message(), "Conversion failed: service returned 500");
    }
}
