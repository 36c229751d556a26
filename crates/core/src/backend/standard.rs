//! Local converter subprocess backend.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use super::config::StandardBackendConfig;
use super::error::BackendError;
use super::traits::ConversionBackend;
use super::types::{Backend, BackendInput};

/// Runs the configured converter (`markitdown` by default) and reads
/// Markdown from its stdout.
pub struct StandardBackend {
    config: StandardBackendConfig,
}

impl StandardBackend {
    pub fn new(config: StandardBackendConfig) -> Self {
        Self { config }
    }

    fn not_found(&self) -> BackendError {
        BackendError::internal(format!(
            "converter not found at path: {}",
            self.config.command.display()
        ))
    }
}

#[async_trait]
impl ConversionBackend for StandardBackend {
    fn name(&self) -> &str {
        "markitdown"
    }

    fn kind(&self) -> Backend {
        Backend::Standard
    }

    async fn execute(
        &self,
        input: &BackendInput,
        deadline: Instant,
    ) -> Result<String, BackendError> {
        let budget = deadline.saturating_duration_since(Instant::now());
        debug!(
            job_id = %input.job_id,
            command = %self.config.command.display(),
            "Starting converter process"
        );

        let child = Command::new(&self.config.command)
            .args(&self.config.args)
            .arg(&input.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    self.not_found()
                } else {
                    BackendError::Io(e)
                }
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match timeout_at(deadline, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(BackendError::Timeout {
                    timeout_secs: budget.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            let reason = match output.status.code() {
                Some(code) => format!("converter exited with status {}", code),
                None => "converter terminated by signal".to_string(),
            };
            return Err(BackendError::upstream(reason, Some(stderr)));
        }

        let markdown = String::from_utf8_lossy(&output.stdout).into_owned();
        if markdown.trim().is_empty() {
            return Err(BackendError::EmptyResult);
        }
        Ok(markdown)
    }

    async fn validate(&self) -> Result<(), BackendError> {
        let result = Command::new(&self.config.command)
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(self.not_found()),
            Err(e) => Err(BackendError::Io(e)),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn input(path: PathBuf) -> BackendInput {
        BackendInput {
            job_id: "job-1".to_string(),
            filename: "doc.txt".to_string(),
            extension: "txt".to_string(),
            path,
            size_bytes: 0,
        }
    }

    fn backend(command: &str, args: &[&str]) -> StandardBackend {
        StandardBackend::new(StandardBackendConfig {
            command: PathBuf::from(command),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..StandardBackendConfig::default()
        })
    }

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    #[tokio::test]
    async fn test_stdout_is_the_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "# Hello\n\nWorld\n").unwrap();

        let markdown = backend("cat", &[]).execute(&input(path), soon()).await.unwrap();
        assert_eq!(markdown, "# Hello\n\nWorld\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_keeps_stderr() {
        let err = backend("sh", &["-c", "echo broken pipe >&2; exit 3", "sh"])
            .execute(&input(PathBuf::from("/dev/null")), soon())
            .await
            .unwrap_err();

        match err {
            BackendError::Upstream { reason, detail } => {
                assert!(reason.contains("status 3"));
                assert!(detail.unwrap().contains("broken pipe"));
            }
            other => panic!("expected Upstream, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_output() {
        let err = backend("sh", &["-c", "echo '   '", "sh"])
            .execute(&input(PathBuf::from("/dev/null")), soon())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::EmptyResult));
    }

    #[tokio::test]
    async fn test_missing_binary_is_internal() {
        let backend = backend("/nonexistent/markitdown", &[]);
        let err = backend
            .execute(&input(PathBuf::from("/dev/null")), soon())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "internal");
        assert!(backend.validate().await.is_err());
    }

    #[tokio::test]
    async fn test_deadline_kills_process() {
        let deadline = Instant::now() + Duration::from_millis(200);
        let started = std::time::Instant::now();
        let err = backend("sh", &["-c", "sleep 5", "sh"])
            .execute(&input(PathBuf::from("/dev/null")), deadline)
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
