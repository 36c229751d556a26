//! Multipart parsing for the upload endpoints.

use axum::extract::multipart::{Multipart, MultipartError};
use mdraft_core::{Backend, OutputFormat};

use super::error::ApiError;

/// A file part of an upload form.
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Parsed upload form: file parts plus the `backend` and `format` fields.
#[derive(Debug)]
pub struct UploadForm {
    pub files: Vec<UploadedFile>,
    pub backend: Backend,
    pub format: OutputFormat,
}

impl UploadForm {
    /// Read every part of `multipart`. File parts are collected from the
    /// field named `file_field`; unknown fields are ignored.
    pub async fn read(multipart: &mut Multipart, file_field: &str) -> Result<Self, ApiError> {
        let mut files = Vec::new();
        let mut backend = Backend::default();
        let mut format = OutputFormat::default();

        while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "backend" => {
                    let text = field.text().await.map_err(upload_error)?;
                    if !text.trim().is_empty() {
                        backend = text.trim().parse().map_err(ApiError::bad_request)?;
                    }
                }
                "format" => {
                    let text = field.text().await.map_err(upload_error)?;
                    if !text.trim().is_empty() {
                        format = text.trim().parse().map_err(ApiError::bad_request)?;
                    }
                }
                _ if name == file_field => {
                    let filename = field.file_name().unwrap_or("").to_string();
                    let content = field.bytes().await.map_err(upload_error)?.to_vec();
                    files.push(UploadedFile { filename, content });
                }
                _ => {}
            }
        }

        Ok(Self {
            files,
            backend,
            format,
        })
    }
}

fn upload_error(e: MultipartError) -> ApiError {
    ApiError::Upload {
        status: e.status(),
        message: e.body_text(),
    }
}
