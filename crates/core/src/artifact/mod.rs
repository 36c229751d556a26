//! Short-lived storage for conversion results and staged uploads.

mod fs_store;
mod staging;
mod store;

pub use fs_store::FsArtifactStore;
pub use staging::InputStaging;
pub use store::{Artifact, ArtifactError, ArtifactStore};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Artifact and staging locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_artifact_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Seconds a result stays retrievable.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: default_artifact_dir(),
            staging_dir: default_staging_dir(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("data/artifacts")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("data/staging")
}

fn default_ttl_secs() -> u64 {
    3600
}
