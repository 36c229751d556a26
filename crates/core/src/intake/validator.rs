use serde::{Deserialize, Serialize};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::error::{ContentIssue, ValidationError};
use super::signature::{family_for_extension, FileFamily, SIGNATURE_PROBE_LEN};
use crate::backend::Backend;

/// Allow-sets and size ceilings per backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntakeConfig {
    #[serde(default = "default_standard_extensions")]
    pub standard_extensions: Vec<String>,
    #[serde(default = "default_pro_extensions")]
    pub pro_extensions: Vec<String>,
    #[serde(default = "default_max_bytes")]
    pub standard_max_bytes: u64,
    #[serde(default = "default_max_bytes")]
    pub pro_max_bytes: u64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            standard_extensions: default_standard_extensions(),
            pro_extensions: default_pro_extensions(),
            standard_max_bytes: default_max_bytes(),
            pro_max_bytes: default_max_bytes(),
        }
    }
}

fn default_standard_extensions() -> Vec<String> {
    [
        "pdf", "docx", "doc", "xlsx", "xls", "pptx", "html", "htm", "csv", "json", "xml", "epub",
        "txt", "rtf",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_pro_extensions() -> Vec<String> {
    [
        "pdf", "gif", "tiff", "tif", "jpg", "jpeg", "png", "bmp", "webp", "html",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_bytes() -> u64 {
    50 * 1024 * 1024
}

/// Checks uploads against the allow-set, size ceiling and signature table.
///
/// Pure: never touches storage or quota.
#[derive(Debug, Clone)]
pub struct IntakeValidator {
    config: IntakeConfig,
}

impl IntakeValidator {
    pub fn new(mut config: IntakeConfig) -> Self {
        for list in [&mut config.standard_extensions, &mut config.pro_extensions] {
            for ext in list.iter_mut() {
                *ext = ext.trim_start_matches('.').to_ascii_lowercase();
            }
        }
        Self { config }
    }

    pub fn allowed_extensions(&self, backend: Backend) -> &[String] {
        match backend {
            Backend::Standard => &self.config.standard_extensions,
            Backend::Pro => &self.config.pro_extensions,
        }
    }

    pub fn max_bytes(&self, backend: Backend) -> u64 {
        match backend {
            Backend::Standard => self.config.standard_max_bytes,
            Backend::Pro => self.config.pro_max_bytes,
        }
    }

    /// Validate an in-memory upload. Returns the normalized extension.
    pub fn validate(
        &self,
        content: &[u8],
        filename: &str,
        backend: Backend,
    ) -> Result<String, ValidationError> {
        let (extension, family) = self.check_type(filename, backend)?;
        self.check_size(content.len() as u64, backend)?;

        let probe = &content[..content.len().min(SIGNATURE_PROBE_LEN)];
        if !family.matches(probe) {
            return Err(ValidationError::SignatureMismatch { extension });
        }
        if family.is_text() {
            check_text(content, family)?;
        }

        Ok(extension)
    }

    /// Validate a seekable upload without consuming it: the reader is left
    /// positioned at the start.
    pub fn validate_stream<R: Read + Seek>(
        &self,
        reader: &mut R,
        filename: &str,
        backend: Backend,
    ) -> Result<String, ValidationError> {
        let (extension, family) = self.check_type(filename, backend)?;

        let unreadable = |_| ValidationError::content(ContentIssue::Unreadable);
        let size = reader.seek(SeekFrom::End(0)).map_err(unreadable)?;
        reader.seek(SeekFrom::Start(0)).map_err(unreadable)?;
        self.check_size(size, backend)?;

        let result = if family.is_text() {
            let mut content = Vec::with_capacity(size as usize);
            reader.read_to_end(&mut content).map_err(unreadable)?;
            check_text(&content, family)
        } else {
            let mut probe = Vec::with_capacity(SIGNATURE_PROBE_LEN);
            reader
                .by_ref()
                .take(SIGNATURE_PROBE_LEN as u64)
                .read_to_end(&mut probe)
                .map_err(unreadable)?;
            if family.matches(&probe) {
                Ok(())
            } else {
                Err(ValidationError::SignatureMismatch {
                    extension: extension.clone(),
                })
            }
        };

        reader.seek(SeekFrom::Start(0)).map_err(unreadable)?;
        result.map(|()| extension)
    }

    fn check_type(
        &self,
        filename: &str,
        backend: Backend,
    ) -> Result<(String, FileFamily), ValidationError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|e| !e.is_empty());

        let unsupported = |extension: Option<String>| ValidationError::UnsupportedType {
            extension,
            backend,
        };

        let Some(extension) = extension else {
            return Err(unsupported(None));
        };
        if !self.allowed_extensions(backend).contains(&extension) {
            return Err(unsupported(Some(extension)));
        }
        match family_for_extension(&extension) {
            Some(family) => Ok((extension, family)),
            None => Err(unsupported(Some(extension))),
        }
    }

    fn check_size(&self, size: u64, backend: Backend) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::content(ContentIssue::Empty));
        }
        let limit = self.max_bytes(backend);
        if size > limit {
            return Err(ValidationError::TooLarge { size, limit });
        }
        Ok(())
    }
}

fn check_text(content: &[u8], family: FileFamily) -> Result<(), ValidationError> {
    let body = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
    if body.contains(&0) {
        return Err(ValidationError::content(ContentIssue::BinaryContent));
    }
    let text = std::str::from_utf8(body)
        .map_err(|_| ValidationError::content(ContentIssue::BinaryContent))?;

    if family == FileFamily::Json && serde_json::from_str::<serde::de::IgnoredAny>(text).is_err() {
        return Err(ValidationError::content(ContentIssue::MalformedJson));
    }
    Ok(())
}
