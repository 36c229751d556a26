//! Optional malware scan of staged inputs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

use super::error::BackendError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_scanner_command")]
    pub command: PathBuf,
    #[serde(default = "default_scanner_timeout")]
    pub timeout_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: default_scanner_command(),
            timeout_secs: default_scanner_timeout(),
        }
    }
}

fn default_scanner_command() -> PathBuf {
    PathBuf::from("clamscan")
}

fn default_scanner_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Clean,
    /// The scanner binary is not installed.
    Skipped,
    /// Scanner report for the infected file.
    Infected(String),
}

/// Runs `clamscan --no-summary --infected` on a file.
pub struct MalwareScanner {
    config: ScannerConfig,
}

impl MalwareScanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    pub async fn scan(&self, path: &Path) -> Result<ScanOutcome, BackendError> {
        let run = Command::new(&self.config.command)
            .args(["--no-summary", "--infected"])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match timeout(Duration::from_secs(self.config.timeout_secs), run).await {
            Err(_) => {
                return Err(BackendError::upstream(
                    format!("malware scan timed out after {}s", self.config.timeout_secs),
                    None,
                ))
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    command = %self.config.command.display(),
                    "Malware scanner not installed, skipping scan"
                );
                return Ok(ScanOutcome::Skipped);
            }
            Ok(result) => result?,
        };

        // clamscan: 0 clean, 1 virus found, anything else is an error
        match output.status.code() {
            Some(0) => Ok(ScanOutcome::Clean),
            Some(1) => Ok(ScanOutcome::Infected(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            )),
            _ => Err(BackendError::upstream(
                "malware scan failed",
                Some(String::from_utf8_lossy(&output.stderr).into_owned()),
            )),
        }
    }
}
