//! Filesystem artifact store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

use super::store::{Artifact, ArtifactError, ArtifactStore};

const CONTENT_SUFFIX: &str = ".out";
const META_SUFFIX: &str = ".meta.json";

/// Stores each artifact as `<id>.out` plus `<id>.meta.json`.
///
/// Both files are written to a temporary name and renamed into place, content
/// first, so a visible metadata file always has complete content behind it.
pub struct FsArtifactStore {
    dir: PathBuf,
    ttl: chrono::Duration,
}

impl FsArtifactStore {
    /// Creates the store, creating `dir` if needed.
    pub async fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self, ArtifactError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| ArtifactError::Metadata(format!("invalid ttl: {}", e)))?;
        Ok(Self { dir, ttl })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn content_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", id, CONTENT_SUFFIX))
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", id, META_SUFFIX))
    }

    /// Ids are generated here; anything else is never a valid artifact.
    fn is_valid_id(id: &str) -> bool {
        !id.is_empty()
            && id.len() <= 64
            && id.bytes().all(|b| b.is_ascii_hexdigit() || b == b'-')
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, bytes).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    async fn read_meta(&self, id: &str) -> Result<Artifact, ArtifactError> {
        let raw = match fs::read(self.meta_path(id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw).map_err(|e| ArtifactError::Metadata(e.to_string()))
    }

    async fn remove(&self, id: &str) {
        for path in [self.meta_path(id), self.content_path(id)] {
            if let Err(e) = fs::remove_file(&path).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove artifact file");
                }
            }
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(
        &self,
        job_id: &str,
        content: String,
        media_type: &str,
    ) -> Result<String, ArtifactError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let artifact = Artifact {
            id: id.clone(),
            job_id: job_id.to_string(),
            content: String::new(),
            media_type: media_type.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        let meta =
            serde_json::to_vec(&artifact).map_err(|e| ArtifactError::Metadata(e.to_string()))?;

        Self::write_atomic(&self.content_path(&id), content.as_bytes()).await?;
        if let Err(e) = Self::write_atomic(&self.meta_path(&id), &meta).await {
            self.remove(&id).await;
            return Err(e.into());
        }

        debug!(artifact_id = %id, job_id = %job_id, bytes = content.len(), "Stored artifact");
        Ok(id)
    }

    async fn get(&self, artifact_id: &str) -> Result<Artifact, ArtifactError> {
        if !Self::is_valid_id(artifact_id) {
            return Err(ArtifactError::NotFound(artifact_id.to_string()));
        }

        let mut artifact = self.read_meta(artifact_id).await?;
        if artifact.is_expired(Utc::now()) {
            self.remove(artifact_id).await;
            return Err(ArtifactError::NotFound(artifact_id.to_string()));
        }

        artifact.content = match fs::read_to_string(self.content_path(artifact_id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound(artifact_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        self.remove(artifact_id).await;
        Ok(artifact)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, ArtifactError> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|n| n.strip_suffix(META_SUFFIX)) else {
                continue;
            };

            match self.read_meta(id).await {
                Ok(artifact) if artifact.is_expired(now) => {
                    self.remove(id).await;
                    removed += 1;
                }
                Ok(_) | Err(ArtifactError::NotFound(_)) => {}
                Err(e) => {
                    warn!(artifact_id = %id, error = %e, "Removing unreadable artifact");
                    self.remove(id).await;
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(ttl_secs: u64) -> (tempfile::TempDir, FsArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("artifacts"), Duration::from_secs(ttl_secs))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_then_get_once() {
        let (_dir, store) = store(3600).await;
        let id = store
            .put("job-1", "# Title\n".to_string(), "text/markdown")
            .await
            .unwrap();

        let artifact = store.get(&id).await.unwrap();
        assert_eq!(artifact.job_id, "job-1");
        assert_eq!(artifact.content, "# Title\n");
        assert_eq!(artifact.media_type, "text/markdown");
        assert!(artifact.expires_at > artifact.created_at);

        // deleted after the first successful read
        assert!(matches!(
            store.get(&id).await,
            Err(ArtifactError::NotFound(_))
        ));
        assert!(!store.content_path(&id).exists());
    }

    #[tokio::test]
    async fn test_get_after_expiry() {
        let (_dir, store) = store(0).await;
        let id = store.put("job-1", "text".to_string(), "text/plain").await.unwrap();

        assert!(matches!(
            store.get(&id).await,
            Err(ArtifactError::NotFound(_))
        ));
        assert!(!store.meta_path(&id).exists());
    }

    #[tokio::test]
    async fn test_get_rejects_path_like_ids() {
        let (_dir, store) = store(3600).await;
        assert!(matches!(
            store.get("../../etc/passwd").await,
            Err(ArtifactError::NotFound(_))
        ));
        assert!(matches!(store.get("").await, Err(ArtifactError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_unknown_id() {
        let (_dir, store) = store(3600).await;
        let id = uuid::Uuid::new_v4().to_string();
        assert!(matches!(store.get(&id).await, Err(ArtifactError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let (_dir, store) = store(60).await;
        let old = store.put("job-1", "a".to_string(), "text/plain").await.unwrap();
        let fresh = store.put("job-2", "b".to_string(), "text/plain").await.unwrap();

        // nothing is stale yet
        assert_eq!(store.sweep_expired(Utc::now()).await.unwrap(), 0);

        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(store.sweep_expired(later).await.unwrap(), 2);
        assert!(!store.meta_path(&old).exists());
        assert!(!store.content_path(&fresh).exists());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let (_dir, store) = store(3600).await;
        store.put("job-1", "x".to_string(), "text/plain").await.unwrap();

        let mut entries = fs::read_dir(store.dir()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().to_string();
            assert!(!name.ends_with(".tmp"), "leftover temp file {}", name);
        }
    }
}
