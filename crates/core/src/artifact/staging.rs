//! Temporary storage for uploads waiting to be converted.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// Directory holding staged uploads. Every staged file is removed once its
/// job reaches a terminal state.
#[derive(Debug, Clone)]
pub struct InputStaging {
    dir: PathBuf,
}

impl InputStaging {
    /// Creates the staging area, creating `dir` if needed.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write an upload under a fresh name that keeps its extension.
    pub async fn stage(&self, bytes: &[u8], extension: &str) -> Result<PathBuf, std::io::Error> {
        let path = self
            .dir
            .join(format!("{}.{}", uuid::Uuid::new_v4(), extension));
        fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Remove a staged file. Missing files are not an error.
    pub async fn remove(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove staged input");
            }
        }
    }
}
