//! Testing utilities and mock implementations.
//!
//! [`EngineHarness`] wires a [`ConversionEngine`] to in-memory stores, a
//! scratch directory and [`MockBackend`]s, so engine and HTTP tests run
//! without a converter binary or a remote service.
//!
//! # Example
//!
//! ```rust,ignore
//! use mdraft_core::testing::{fixtures, EngineHarness};
//!
//! let harness = EngineHarness::new().await;
//! harness.standard.set_output("# Hello").await;
//!
//! let job = harness.engine.submit(request).await?;
//! let done = harness.wait_for_terminal(&identity, &job.id).await;
//! ```

mod mock_backend;

pub use mock_backend::{MockBackend, RecordedCall};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::accounts::SqliteAccountStore;
use crate::artifact::{FsArtifactStore, InputStaging};
use crate::auth::Identity;
use crate::backend::{
    Backend, BackendSet, ConversionBackend, MalwareScanner, OutputFormat, ScannerConfig,
    TimeoutTier,
};
use crate::batch::SqliteBatchStore;
use crate::engine::{BatchStatus, ConversionEngine, EngineDeps, LimitsConfig, WorkerConfig};
use crate::intake::{IntakeConfig, IntakeValidator};
use crate::job::{ConversionJob, CreateJobRequest, JobFilter, JobStore, JobTransition, SqliteJobStore};
use crate::quota::{QuotaConfig, SqliteQuotaLedger};

/// How long the `wait_for_*` helpers poll before giving up.
const WAIT_LIMIT: Duration = Duration::from_secs(15);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Test fixtures and helper functions.
pub mod fixtures {
    /// A minimal PDF.
    pub fn pdf_bytes() -> Vec<u8> {
        b"%PDF-1.7\n1 0 obj\n<< /Type /Catalog >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n%%EOF\n"
            .to_vec()
    }

    /// A PDF padded to `size` bytes.
    pub fn pdf_of_size(size: usize) -> Vec<u8> {
        let mut bytes = pdf_bytes();
        bytes.resize(size.max(bytes.len()), b' ');
        bytes
    }

    /// PNG signature followed by an IHDR chunk header.
    pub fn png_bytes() -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&[0, 0, 0, 13]);
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&[0; 17]);
        bytes
    }

    /// A ZIP local file header, as found at the start of docx/xlsx/pptx/epub.
    pub fn zip_bytes() -> Vec<u8> {
        let mut bytes = b"PK\x03\x04".to_vec();
        bytes.extend_from_slice(&[20, 0, 0, 0, 8, 0]);
        bytes.extend_from_slice(b"[Content_Types].xml");
        bytes
    }

    pub fn jpeg_bytes() -> Vec<u8> {
        vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00]
    }
}

/// Builder for [`EngineHarness`].
#[derive(Debug, Clone, Default)]
pub struct EngineHarnessBuilder {
    workers: WorkerConfig,
    limits: LimitsConfig,
    quota: QuotaConfig,
    intake: IntakeConfig,
    standard_timeout: Option<TimeoutTier>,
    with_pro: bool,
    artifact_ttl: Option<Duration>,
    scanner: Option<ScannerConfig>,
}

impl EngineHarnessBuilder {
    pub fn workers(mut self, workers: WorkerConfig) -> Self {
        self.workers = workers;
        self
    }

    pub fn limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn quota(mut self, quota: QuotaConfig) -> Self {
        self.quota = quota;
        self
    }

    pub fn intake(mut self, intake: IntakeConfig) -> Self {
        self.intake = intake;
        self
    }

    pub fn standard_timeout(mut self, timeout: TimeoutTier) -> Self {
        self.standard_timeout = Some(timeout);
        self
    }

    pub fn artifact_ttl(mut self, ttl: Duration) -> Self {
        self.artifact_ttl = Some(ttl);
        self
    }

    /// Scan staged inputs with `config.command` before conversion.
    pub fn scanner(mut self, config: ScannerConfig) -> Self {
        self.scanner = Some(config);
        self
    }

    /// Configure a mock Pro backend.
    pub fn with_pro(mut self) -> Self {
        self.with_pro = true;
        self
    }

    pub async fn build(self) -> EngineHarness {
        let root = std::env::temp_dir().join(format!("mdraft-test-{}", uuid::Uuid::new_v4()));

        let accounts =
            Arc::new(SqliteAccountStore::in_memory().expect("in-memory account store"));
        let jobs = Arc::new(SqliteJobStore::in_memory().expect("in-memory job store"));
        let batches = Arc::new(SqliteBatchStore::in_memory().expect("in-memory batch store"));
        let quota =
            Arc::new(SqliteQuotaLedger::in_memory(self.quota).expect("in-memory quota ledger"));
        let artifacts = Arc::new(
            FsArtifactStore::new(
                root.join("artifacts"),
                self.artifact_ttl.unwrap_or(Duration::from_secs(3600)),
            )
            .await
            .expect("artifact dir"),
        );
        let staging = Arc::new(
            InputStaging::new(root.join("staging"))
                .await
                .expect("staging dir"),
        );

        let standard = Arc::new(MockBackend::standard());
        let pro = Arc::new(MockBackend::pro());
        let backends = BackendSet::new(
            standard.clone() as Arc<dyn ConversionBackend>,
            self.with_pro
                .then(|| pro.clone() as Arc<dyn ConversionBackend>),
        )
        .with_timeouts(
            self.standard_timeout.unwrap_or_else(TimeoutTier::standard),
            TimeoutTier::pro(),
        );

        let engine = ConversionEngine::new(
            EngineDeps {
                accounts: accounts.clone(),
                quota: quota.clone(),
                jobs: jobs.clone(),
                batches,
                artifacts,
                staging: staging.clone(),
                backends,
                validator: Arc::new(IntakeValidator::new(self.intake)),
                scanner: self.scanner.map(MalwareScanner::new),
            },
            self.workers,
            self.limits,
        );

        EngineHarness {
            engine,
            standard,
            pro,
            accounts,
            quota,
            jobs,
            staging,
            root,
        }
    }
}

/// An engine over in-memory stores and mock backends.
///
/// The scratch directory is removed when the harness is dropped.
pub struct EngineHarness {
    pub engine: ConversionEngine,
    pub standard: Arc<MockBackend>,
    /// Only reachable through the engine when built `with_pro`.
    pub pro: Arc<MockBackend>,
    pub accounts: Arc<SqliteAccountStore>,
    pub quota: Arc<SqliteQuotaLedger>,
    pub jobs: Arc<SqliteJobStore>,
    pub staging: Arc<InputStaging>,
    pub root: PathBuf,
}

impl EngineHarness {
    pub fn builder() -> EngineHarnessBuilder {
        EngineHarnessBuilder::default()
    }

    pub async fn new() -> Self {
        Self::builder().build().await
    }

    pub async fn with_pro() -> Self {
        Self::builder().with_pro().build().await
    }

    pub fn job_count(&self) -> i64 {
        self.jobs.count(&JobFilter::new()).unwrap_or(0)
    }

    /// Files currently in the staging directory.
    pub async fn staged_files(&self) -> usize {
        let mut count = 0;
        if let Ok(mut entries) = tokio::fs::read_dir(self.staging.dir()).await {
            while let Ok(Some(_)) = entries.next_entry().await {
                count += 1;
            }
        }
        count
    }

    /// Poll until the job reaches a terminal state.
    pub async fn wait_for_terminal(&self, identity: &Identity, job_id: &str) -> ConversionJob {
        self.wait_for(identity, job_id, |job| job.state.is_terminal())
            .await
    }

    /// Poll until the job is in `state`.
    pub async fn wait_for_state(
        &self,
        identity: &Identity,
        job_id: &str,
        state: &str,
    ) -> ConversionJob {
        self.wait_for(identity, job_id, |job| job.state.state_type() == state)
            .await
    }

    async fn wait_for(
        &self,
        identity: &Identity,
        job_id: &str,
        done: impl Fn(&ConversionJob) -> bool,
    ) -> ConversionJob {
        let started = tokio::time::Instant::now();
        loop {
            let job = self
                .engine
                .job_status(identity, job_id)
                .unwrap_or_else(|e| panic!("job {job_id} not visible: {e}"));
            if done(&job) {
                return job;
            }
            if started.elapsed() > WAIT_LIMIT {
                panic!("job {job_id} stuck in {}", job.state.state_type());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Poll until every job of the batch has finished.
    pub async fn wait_for_batch(&self, identity: &Identity, batch_id: &str) -> BatchStatus {
        let started = tokio::time::Instant::now();
        loop {
            let status = self
                .engine
                .batch_status(identity, batch_id)
                .unwrap_or_else(|e| panic!("batch {batch_id} not visible: {e}"));
            if status.batch.completed_at.is_some() {
                return status;
            }
            if started.elapsed() > WAIT_LIMIT {
                panic!(
                    "batch {batch_id} stuck at {}/{}",
                    status.batch.finished_count(),
                    status.batch.total_jobs
                );
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Insert a job directly into the store, bypassing the engine, and move
    /// it to `state` (`created`, `queued` or `running`). Simulates work left
    /// behind by a previous process.
    pub async fn insert_job(&self, identity: &Identity, state: &str) -> String {
        let now = Utc::now();
        let id = if state == "created" {
            self.insert_created(identity).await
        } else {
            self.insert_queued_job(identity, now + chrono::Duration::minutes(10))
                .await
        };
        if state == "running" {
            self.jobs
                .transition(
                    &id,
                    JobTransition::Start {
                        started_at: now,
                        deadline: now + chrono::Duration::minutes(5),
                    },
                )
                .expect("start");
        }
        id
    }

    /// Insert a queued job whose wait for a worker ends at `expires_at`.
    pub async fn insert_queued_job(&self, identity: &Identity, expires_at: DateTime<Utc>) -> String {
        let id = self.insert_created(identity).await;
        self.jobs
            .transition(
                &id,
                JobTransition::Enqueue {
                    queued_at: Utc::now(),
                    expires_at,
                },
            )
            .expect("enqueue");
        id
    }

    async fn insert_created(&self, identity: &Identity) -> String {
        let staged = self
            .staging
            .stage(&fixtures::pdf_bytes(), "pdf")
            .await
            .expect("stage input");
        let job = self
            .jobs
            .create(CreateJobRequest {
                identity: identity.clone(),
                backend: Backend::Standard,
                output_format: OutputFormat::Markdown,
                filename: "leftover.pdf".to_string(),
                file_size_bytes: fixtures::pdf_bytes().len() as u64,
                file_extension: "pdf".to_string(),
                batch_id: None,
                input_ref: Some(staged.display().to_string()),
            })
            .expect("create job");
        job.id
    }
}

impl Drop for EngineHarness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}
