//! Configuration for the conversion backends.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// All backend configuration. Pro is optional; without it Pro requests are
/// rejected at submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub standard: StandardBackendConfig,
    #[serde(default)]
    pub pro: Option<ProBackendConfig>,
}

/// Deadline policy: `min(max, base + per_mib * size_in_mib)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutTier {
    pub base_secs: u64,
    pub per_mib_secs: u64,
    pub max_secs: u64,
}

impl TimeoutTier {
    pub fn standard() -> Self {
        Self {
            base_secs: 30,
            per_mib_secs: 10,
            max_secs: 300,
        }
    }

    pub fn pro() -> Self {
        Self {
            base_secs: 120,
            per_mib_secs: 30,
            max_secs: 900,
        }
    }

    /// Execution budget for an input of `size_bytes`. Partial MiBs round up.
    pub fn deadline_for(&self, size_bytes: u64) -> Duration {
        let mib = size_bytes.div_ceil(1024 * 1024);
        let secs = self
            .base_secs
            .saturating_add(self.per_mib_secs.saturating_mul(mib))
            .min(self.max_secs);
        Duration::from_secs(secs)
    }
}

/// Configuration for the local converter process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardBackendConfig {
    /// Converter binary. Receives the input path as its last argument and
    /// writes Markdown to stdout.
    #[serde(default = "default_command")]
    pub command: PathBuf,

    /// Arguments placed before the input path.
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "TimeoutTier::standard")]
    pub timeout: TimeoutTier,
}

impl Default for StandardBackendConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            timeout: TimeoutTier::standard(),
        }
    }
}

fn default_command() -> PathBuf {
    PathBuf::from("markitdown")
}

/// Configuration for the remote document-processing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProBackendConfig {
    /// Full URL of the process endpoint.
    pub endpoint: String,

    /// Bearer token sent with every request.
    pub api_key: String,

    #[serde(default = "TimeoutTier::pro")]
    pub timeout: TimeoutTier,
}
