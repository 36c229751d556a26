use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stored conversion result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub job_id: String,
    #[serde(skip)]
    pub content: String,
    pub media_type: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Artifact {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact metadata error: {0}")]
    Metadata(String),
}

/// TTL storage for results.
///
/// A retrieval before expiry succeeds; once an artifact is gone every
/// retrieval fails with `NotFound`.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `content` for `job_id` and return the new artifact id.
    async fn put(
        &self,
        job_id: &str,
        content: String,
        media_type: &str,
    ) -> Result<String, ArtifactError>;

    /// Read an artifact. A successful read deletes it.
    async fn get(&self, artifact_id: &str) -> Result<Artifact, ArtifactError>;

    /// Delete every artifact expired at `now`. Returns the number removed.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, ArtifactError>;
}
