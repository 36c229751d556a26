use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::backend::Backend;

/// Why a text upload's content was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentIssue {
    Empty,
    BinaryContent,
    MalformedJson,
    Unreadable,
}

impl ContentIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentIssue::Empty => "empty",
            ContentIssue::BinaryContent => "binary-content",
            ContentIssue::MalformedJson => "malformed-json",
            ContentIssue::Unreadable => "unreadable",
        }
    }
}

impl fmt::Display for ContentIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("file type {} is not supported by the {backend} backend", display_extension(.extension))]
    UnsupportedType {
        extension: Option<String>,
        backend: Backend,
    },

    #[error("file is {size} bytes, larger than the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("file content does not match the .{extension} format")]
    SignatureMismatch { extension: String },

    #[error("invalid file content ({issue})")]
    ContentInvalid { issue: ContentIssue },
}

fn display_extension(extension: &Option<String>) -> String {
    match extension {
        Some(ext) => format!(".{}", ext),
        None => "(none)".to_string(),
    }
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::UnsupportedType { .. } => "unsupported-type",
            ValidationError::TooLarge { .. } => "too-large",
            ValidationError::SignatureMismatch { .. } => "signature-mismatch",
            ValidationError::ContentInvalid { .. } => "content-invalid",
        }
    }

    pub(crate) fn content(issue: ContentIssue) -> Self {
        ValidationError::ContentInvalid { issue }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = ValidationError::UnsupportedType {
            extension: Some("exe".to_string()),
            backend: Backend::Standard,
        };
        assert_eq!(
            err.to_string(),
            "file type .exe is not supported by the standard backend"
        );
        assert_eq!(err.code(), "unsupported-type");

        let err = ValidationError::UnsupportedType {
            extension: None,
            backend: Backend::Pro,
        };
        assert!(err.to_string().contains("(none)"));

        let err = ValidationError::content(ContentIssue::MalformedJson);
        assert_eq!(err.to_string(), "invalid file content (malformed-json)");
        assert_eq!(err.code(), "content-invalid");
    }
}
