//! Mock conversion backend for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::backend::{Backend, BackendError, BackendInput, ConversionBackend};

/// A recorded backend call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub job_id: String,
    pub filename: String,
    pub extension: String,
    pub size_bytes: u64,
}

/// Mock implementation of the ConversionBackend trait.
///
/// Provides controllable behavior for testing:
/// - Track calls for assertions
/// - Fixed Markdown output
/// - One-shot errors or failures for specific filenames
/// - Simulated latency
///
/// # Example
///
/// ```rust,ignore
/// use mdraft_core::testing::MockBackend;
///
/// let backend = MockBackend::standard();
/// backend.set_output("# Converted").await;
/// backend.fail_for_filename("broken.pdf").await;
///
/// // ... run jobs ...
///
/// assert_eq!(backend.call_count().await, 2);
/// ```
#[derive(Debug)]
pub struct MockBackend {
    kind: Backend,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    output: Arc<RwLock<String>>,
    /// If set, the next call fails with this error.
    next_error: Arc<RwLock<Option<BackendError>>>,
    /// Calls for these filenames always fail.
    failing_files: Arc<RwLock<HashSet<String>>>,
    delay: Arc<RwLock<Duration>>,
}

impl MockBackend {
    pub fn new(kind: Backend) -> Self {
        Self {
            kind,
            calls: Arc::new(RwLock::new(Vec::new())),
            output: Arc::new(RwLock::new("# Converted\n\nMock output".to_string())),
            next_error: Arc::new(RwLock::new(None)),
            failing_files: Arc::new(RwLock::new(HashSet::new())),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
        }
    }

    pub fn standard() -> Self {
        Self::new(Backend::Standard)
    }

    pub fn pro() -> Self {
        Self::new(Backend::Pro)
    }

    /// Get all recorded calls.
    pub async fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Set the Markdown returned by successful calls.
    pub async fn set_output(&self, output: impl Into<String>) {
        *self.output.write().await = output.into();
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: BackendError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make every call for `filename` fail with an upstream error.
    pub async fn fail_for_filename(&self, filename: impl Into<String>) {
        self.failing_files.write().await.insert(filename.into());
    }

    /// Set the simulated conversion duration.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }
}

#[async_trait]
impl ConversionBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn kind(&self) -> Backend {
        self.kind
    }

    async fn execute(
        &self,
        input: &BackendInput,
        _deadline: tokio::time::Instant,
    ) -> Result<String, BackendError> {
        self.calls.write().await.push(RecordedCall {
            job_id: input.job_id.clone(),
            filename: input.filename.clone(),
            extension: input.extension.clone(),
            size_bytes: input.size_bytes,
        });

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        if self.failing_files.read().await.contains(&input.filename) {
            return Err(BackendError::upstream("mock conversion failed", None));
        }

        let output = self.output.read().await.clone();
        if output.trim().is_empty() {
            return Err(BackendError::EmptyResult);
        }
        Ok(output)
    }
}
