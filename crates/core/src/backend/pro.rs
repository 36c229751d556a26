//! Remote document-processing backend (OCR and layout analysis).

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use super::config::ProBackendConfig;
use super::error::BackendError;
use super::traits::ConversionBackend;
use super::types::{Backend, BackendInput};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest<'a> {
    raw_document: RawDocument<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument<'a> {
    content: String,
    mime_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    document: Option<ProcessedDocument>,
}

#[derive(Debug, Deserialize)]
struct ProcessedDocument {
    #[serde(default)]
    text: Option<String>,
}

/// MIME type sent to the service for an extension.
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        "pdf" => "application/pdf",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}

/// Sends the document inline (base64) to the configured endpoint and returns
/// the extracted text.
pub struct ProBackend {
    client: Client,
    config: ProBackendConfig,
}

impl ProBackend {
    pub fn new(config: ProBackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .user_agent(concat!("mdraft/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ConversionBackend for ProBackend {
    fn name(&self) -> &str {
        "document_ai"
    }

    fn kind(&self) -> Backend {
        Backend::Pro
    }

    async fn execute(
        &self,
        input: &BackendInput,
        deadline: Instant,
    ) -> Result<String, BackendError> {
        let budget = deadline.saturating_duration_since(Instant::now());
        if budget.is_zero() {
            return Err(BackendError::Timeout { timeout_secs: 0 });
        }

        let bytes = tokio::fs::read(&input.path).await?;
        let body = ProcessRequest {
            raw_document: RawDocument {
                content: base64::engine::general_purpose::STANDARD.encode(&bytes),
                mime_type: mime_for_extension(&input.extension),
            },
        };

        debug!(job_id = %input.job_id, bytes = bytes.len(), "Sending document to Pro service");

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .timeout(budget)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout {
                        timeout_secs: budget.as_secs(),
                    }
                } else {
                    BackendError::upstream("request to document service failed", Some(e.to_string()))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::upstream(
                format!("document service returned {}", status.as_u16()),
                Some(body),
            ));
        }

        let parsed: ProcessResponse = response.json().await.map_err(|e| {
            BackendError::upstream("malformed response from document service", Some(e.to_string()))
        })?;

        let document = parsed.document.ok_or_else(|| {
            BackendError::upstream("document service response has no document", None)
        })?;

        match document.text {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(BackendError::EmptyResult),
        }
    }

    async fn validate(&self) -> Result<(), BackendError> {
        if self.config.endpoint.trim().is_empty() || self.config.api_key.trim().is_empty() {
            return Err(BackendError::internal(
                "pro backend requires endpoint and api_key",
            ));
        }
        Ok(())
    }
}
