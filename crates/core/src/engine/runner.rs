//! Conversion engine implementation.
//!
//! Drives jobs through their lifecycle:
//! - Submission: validate, gate on entitlement and quota, create, enqueue
//! - Execution: bounded worker pool, one backend call per job under a deadline
//! - Maintenance: periodic sweeps for trials, stale jobs and artifacts

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Semaphore};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::accounts::{AccountStore, Entitlement};
use crate::artifact::{ArtifactStore, InputStaging};
use crate::auth::Identity;
use crate::backend::{
    render, Backend, BackendError, BackendInput, BackendSet, ConversionBackend, MalwareScanner,
    OutputFormat, ScanOutcome,
};
use crate::batch::{BatchOutcome, BatchStore};
use crate::intake::IntakeValidator;
use crate::job::{
    ConversionJob, CreateJobRequest, FailureKind, JobError, JobFilter, JobState, JobStore,
    JobTransition,
};
use crate::metrics;
use crate::quota::{QuotaError, QuotaLedger, Reservation};

use super::config::{LimitsConfig, WorkerConfig};
use super::types::{
    output_filename, BatchReceipt, BatchRequest, BatchStatus, EngineError, EngineStatus,
    JobResult, MaintenanceReport, NotFoundKind, RejectedFile, SubmitRequest, UsageReport,
};

/// Page size used when walking job lists during recovery and sweeps.
const SCAN_PAGE: i64 = 100;

/// Everything the engine talks to.
pub struct EngineDeps {
    pub accounts: Arc<dyn AccountStore>,
    pub quota: Arc<dyn QuotaLedger>,
    pub jobs: Arc<dyn JobStore>,
    pub batches: Arc<dyn BatchStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub staging: Arc<InputStaging>,
    pub backends: BackendSet,
    pub validator: Arc<IntakeValidator>,
    pub scanner: Option<MalwareScanner>,
}

/// The conversion engine. Cheap to clone; clones share one worker pool.
#[derive(Clone)]
pub struct ConversionEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    deps: EngineDeps,
    workers: WorkerConfig,
    limits: LimitsConfig,

    // Runtime state
    permits: Arc<Semaphore>,
    waiting: AtomicUsize,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl ConversionEngine {
    pub fn new(deps: EngineDeps, workers: WorkerConfig, limits: LimitsConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            inner: Arc::new(EngineInner {
                permits: Arc::new(Semaphore::new(workers.pool_size.max(1))),
                deps,
                workers,
                limits,
                waiting: AtomicUsize::new(0),
                running: AtomicBool::new(false),
                shutdown_tx,
            }),
        }
    }

    /// Recover jobs left behind by a previous process and start the
    /// maintenance loop. Call before accepting submissions.
    pub async fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("Conversion engine already running");
            return;
        }

        info!(
            pool_size = self.inner.workers.pool_size,
            max_queued = self.inner.workers.max_queued,
            "Starting conversion engine"
        );

        self.inner.recover().await;
        self.spawn_maintenance_loop();

        info!("Conversion engine started");
    }

    /// Stop the maintenance loop. Jobs already executing run to completion.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            warn!("Conversion engine not running");
            return;
        }

        info!("Stopping conversion engine");
        let _ = self.inner.shutdown_tx.send(());
        info!("Conversion engine stopped");
    }

    fn spawn_maintenance_loop(&self) {
        let inner = Arc::clone(&self.inner);
        let interval = Duration::from_secs(inner.workers.sweep_interval_secs.max(1));
        let mut shutdown_rx = inner.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Maintenance loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Maintenance loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !inner.running.load(Ordering::Relaxed) {
                            break;
                        }
                        inner.run_maintenance().await;
                    }
                }
            }
            info!("Maintenance loop stopped");
        });
    }

    /// Entitlement of `identity` as stored in the account directory.
    pub fn entitlement_for(&self, identity: &Identity) -> Result<Entitlement, EngineError> {
        self.inner.entitlement_for(identity)
    }

    /// Accept one file for conversion.
    ///
    /// Returns the job in `Queued` state, or already terminal when it ran
    /// inline. Nothing is created when an error is returned.
    pub async fn submit(&self, request: SubmitRequest) -> Result<ConversionJob, EngineError> {
        let inner = &self.inner;
        let now = Utc::now();

        let extension = inner
            .deps
            .validator
            .validate(&request.content, &request.filename, request.backend)
            .inspect_err(|e| {
                metrics::VALIDATION_REJECTIONS
                    .with_label_values(&[e.code()])
                    .inc();
            })?;
        let entitlement = inner.check_backend_access(&request.identity, request.backend)?;

        inner.admit(1)?;
        let reservation =
            match inner
                .deps
                .quota
                .check_and_reserve(&request.identity, &entitlement, now)
            {
                Ok(reservation) => reservation,
                Err(e) => {
                    inner.leave_queue(1);
                    return Err(inner.quota_rejected(e));
                }
            };

        let job = match inner
            .create_job(
                &request.identity,
                request.backend,
                request.output_format,
                &request.filename,
                &extension,
                &request.content,
                None,
            )
            .await
        {
            Ok(job) => job,
            Err(e) => {
                inner.leave_queue(1);
                inner.release(reservation);
                return Err(e);
            }
        };
        inner.commit(reservation);

        metrics::JOBS_SUBMITTED
            .with_label_values(&[request.backend.as_str()])
            .inc();
        info!(
            job_id = %job.id,
            identity = %job.identity,
            backend = %job.backend,
            filename = %job.filename,
            size = job.file_size_bytes,
            "Job accepted"
        );

        let inline = request.backend == Backend::Standard
            && inner.workers.inline_max_bytes > 0
            && job.file_size_bytes <= inner.workers.inline_max_bytes;

        let queued = Arc::clone(inner).enqueue(job).await?;
        if inline {
            let job_id = queued.id.clone();
            Arc::clone(inner).run_job(queued).await;
            return inner
                .deps
                .jobs
                .get(&job_id)?
                .ok_or_else(|| EngineError::not_found(NotFoundKind::Job, job_id));
        }

        tokio::spawn(Arc::clone(inner).run_job(queued.clone()));
        Ok(queued)
    }

    /// Accept a list of files as one batch.
    ///
    /// Files failing validation are reported back and do not count towards
    /// the batch total. Quota for every accepted file is reserved at once.
    pub async fn create_batch(&self, request: BatchRequest) -> Result<BatchReceipt, EngineError> {
        let inner = &self.inner;
        let now = Utc::now();

        if request.files.len() > inner.limits.max_batch_files {
            return Err(EngineError::TooManyFiles {
                count: request.files.len(),
                limit: inner.limits.max_batch_files,
            });
        }

        let mut valid = Vec::new();
        let mut rejected = Vec::new();
        for file in &request.files {
            match inner
                .deps
                .validator
                .validate(&file.content, &file.filename, request.backend)
            {
                Ok(extension) => valid.push((file, extension)),
                Err(e) => {
                    metrics::VALIDATION_REJECTIONS
                        .with_label_values(&[e.code()])
                        .inc();
                    rejected.push(RejectedFile::from_validation(&file.filename, &e));
                }
            }
        }
        if valid.is_empty() {
            return Err(EngineError::EmptyBatch { rejected });
        }

        let entitlement = inner.check_backend_access(&request.identity, request.backend)?;

        let slots = valid.len();
        inner.admit(slots)?;
        let reservations = match inner.deps.quota.check_and_reserve_many(
            &request.identity,
            &entitlement,
            slots as u32,
            now,
        ) {
            Ok(reservations) => reservations,
            Err(e) => {
                inner.leave_queue(slots);
                return Err(inner.quota_rejected(e));
            }
        };

        let batch = match inner.deps.batches.create(&request.identity, slots as u32) {
            Ok(batch) => batch,
            Err(e) => {
                inner.leave_queue(slots);
                reservations.into_iter().for_each(|r| inner.release(r));
                return Err(e.into());
            }
        };
        metrics::BATCHES_CREATED.inc();

        let mut accepted = Vec::with_capacity(slots);
        for ((file, extension), reservation) in valid.into_iter().zip(reservations) {
            let created = inner
                .create_job(
                    &request.identity,
                    request.backend,
                    request.output_format,
                    &file.filename,
                    &extension,
                    &file.content,
                    Some(batch.id.as_str()),
                )
                .await;

            match created {
                Ok(job) => {
                    inner.commit(reservation);
                    metrics::JOBS_SUBMITTED
                        .with_label_values(&[request.backend.as_str()])
                        .inc();
                    accepted.push(job);
                }
                Err(e) => {
                    // Keep the rollup reachable: the slot counts as failed.
                    error!(batch_id = %batch.id, filename = %file.filename, error = %e, "Failed to create batch job");
                    inner.leave_queue(1);
                    inner.release(reservation);
                    inner.record_batch_outcome(&batch.id, BatchOutcome::Failed);
                    rejected.push(RejectedFile {
                        filename: file.filename.clone(),
                        code: e.code().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let mut queued_jobs = Vec::with_capacity(accepted.len());
        for job in accepted {
            match Arc::clone(inner).enqueue(job).await {
                Ok(job) => {
                    tokio::spawn(Arc::clone(inner).run_job(job.clone()));
                    queued_jobs.push(job);
                }
                Err(e) => warn!(batch_id = %batch.id, error = %e, "Batch job not enqueued"),
            }
        }

        info!(
            batch_id = %batch.id,
            identity = %request.identity,
            accepted = queued_jobs.len(),
            rejected = rejected.len(),
            "Batch accepted"
        );

        let batch = inner.deps.batches.get(&batch.id)?.unwrap_or(batch);
        Ok(BatchReceipt {
            batch,
            accepted: queued_jobs,
            rejected,
        })
    }

    /// A job owned by `identity`. Jobs of other identities are not found.
    pub fn job_status(
        &self,
        identity: &Identity,
        job_id: &str,
    ) -> Result<ConversionJob, EngineError> {
        self.inner.owned_job(identity, job_id)
    }

    /// Retrieve and consume the result of a succeeded job.
    pub async fn take_result(
        &self,
        identity: &Identity,
        job_id: &str,
    ) -> Result<JobResult, EngineError> {
        let job = self.inner.owned_job(identity, job_id)?;

        let result_ref = match &job.state {
            JobState::Succeeded { result_ref, .. } => result_ref,
            JobState::Created | JobState::Queued { .. } | JobState::Running { .. } => {
                return Err(EngineError::NotReady {
                    job_id: job.id.clone(),
                    state: job.state.state_type().to_string(),
                })
            }
            JobState::Failed { .. } | JobState::Expired { .. } => {
                return Err(EngineError::not_found(NotFoundKind::Artifact, job_id))
            }
        };

        let artifact = self
            .inner
            .deps
            .artifacts
            .get(result_ref)
            .await
            .map_err(|e| {
                debug!(job_id = %job.id, error = %e, "Result not retrievable");
                EngineError::not_found(NotFoundKind::Artifact, job_id)
            })?;

        Ok(JobResult {
            job_id: job.id.clone(),
            content: artifact.content,
            media_type: artifact.media_type,
            filename: output_filename(&job.filename, job.output_format),
        })
    }

    /// Rollup and member jobs of a batch owned by `identity`.
    pub fn batch_status(
        &self,
        identity: &Identity,
        batch_id: &str,
    ) -> Result<BatchStatus, EngineError> {
        let batch = self
            .inner
            .deps
            .batches
            .get(batch_id)?
            .filter(|b| identity.owns(&b.owner))
            .ok_or_else(|| EngineError::not_found(NotFoundKind::Batch, batch_id))?;

        let filter = JobFilter::new()
            .with_batch(&batch.id)
            .with_limit(i64::from(batch.total_jobs.max(1)));
        let jobs = self.inner.deps.jobs.list(&filter)?;

        Ok(BatchStatus { batch, jobs })
    }

    /// Entitlement and today's usage for `identity`.
    pub fn usage(&self, identity: &Identity) -> Result<UsageReport, EngineError> {
        let now = Utc::now();
        let entitlement = self.inner.entitlement_for(identity)?;
        let usage = self.inner.deps.quota.usage(identity, &entitlement, now)?;
        let trial_active = entitlement.trial_active(now);

        Ok(UsageReport {
            identity_kind: identity.kind,
            tier: entitlement.effective_tier(now),
            pro_access: entitlement.has_pro_access(now),
            on_trial: trial_active,
            trial_ends_at: entitlement
                .trial_window
                .filter(|_| trial_active)
                .map(|w| w.end),
            usage,
        })
    }

    /// Get current engine status.
    pub fn status(&self) -> EngineStatus {
        let inner = &self.inner;
        let count = |state: &str| {
            inner
                .deps
                .jobs
                .count(&JobFilter::new().with_state(state))
                .unwrap_or(0) as usize
        };
        let pool_size = inner.workers.pool_size.max(1);

        EngineStatus {
            running: inner.running.load(Ordering::Relaxed),
            pool_size,
            busy_workers: pool_size.saturating_sub(inner.permits.available_permits()),
            waiting_jobs: inner.waiting.load(Ordering::SeqCst),
            queued_count: count("queued"),
            running_count: count("running"),
            succeeded_count: count("succeeded"),
            failed_count: count("failed"),
            expired_count: count("expired"),
        }
    }

    /// Run one maintenance pass now.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        self.inner.run_maintenance().await
    }

    /// Whether `backend` is configured.
    pub fn backend_available(&self, backend: Backend) -> bool {
        self.inner.deps.backends.is_available(backend)
    }
}

impl EngineInner {
    fn entitlement_for(&self, identity: &Identity) -> Result<Entitlement, EngineError> {
        if !identity.is_registered() {
            return Ok(Entitlement::free());
        }
        Ok(self
            .deps
            .accounts
            .get(&identity.key)?
            .map(|account| account.entitlement())
            .unwrap_or_default())
    }

    fn check_backend_access(
        &self,
        identity: &Identity,
        backend: Backend,
    ) -> Result<Entitlement, EngineError> {
        if !self.deps.backends.is_available(backend) {
            return Err(EngineError::BackendUnavailable(backend));
        }
        let entitlement = self.entitlement_for(identity)?;
        if backend == Backend::Pro && !entitlement.has_pro_access(Utc::now()) {
            return Err(EngineError::ProAccessRequired);
        }
        Ok(entitlement)
    }

    /// Reserve `slots` places in the wait queue.
    fn admit(&self, slots: usize) -> Result<(), EngineError> {
        let max = self.workers.max_queued;
        self.waiting
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |waiting| {
                (waiting + slots <= max).then_some(waiting + slots)
            })
            .map(|_| ())
            .map_err(|_| {
                metrics::ADMISSION_REJECTIONS.inc();
                warn!(slots, max_queued = max, "Rejecting submission, queue full");
                EngineError::Busy
            })
    }

    fn leave_queue(&self, slots: usize) {
        let _ = self
            .waiting
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |waiting| {
                Some(waiting.saturating_sub(slots))
            });
    }

    fn quota_rejected(&self, error: QuotaError) -> EngineError {
        if matches!(error, QuotaError::Exceeded { .. }) {
            metrics::QUOTA_REJECTIONS.inc();
        }
        error.into()
    }

    fn commit(&self, reservation: Reservation) {
        let scope = reservation.scope.clone();
        if let Err(e) = self.deps.quota.commit(reservation) {
            error!(scope = %scope, error = %e, "Failed to commit quota reservation");
        }
    }

    fn release(&self, reservation: Reservation) {
        let scope = reservation.scope.clone();
        if let Err(e) = self.deps.quota.release(reservation) {
            error!(scope = %scope, error = %e, "Failed to release quota reservation");
        }
    }

    fn owned_job(&self, identity: &Identity, job_id: &str) -> Result<ConversionJob, EngineError> {
        self.deps
            .jobs
            .get(job_id)?
            .filter(|job| identity.owns(&job.identity))
            .ok_or_else(|| EngineError::not_found(NotFoundKind::Job, job_id))
    }

    /// Stage the upload and create the job row.
    #[allow(clippy::too_many_arguments)]
    async fn create_job(
        &self,
        identity: &Identity,
        backend: Backend,
        output_format: OutputFormat,
        filename: &str,
        extension: &str,
        content: &[u8],
        batch_id: Option<&str>,
    ) -> Result<ConversionJob, EngineError> {
        let staged = self.deps.staging.stage(content, extension).await?;

        let request = CreateJobRequest {
            identity: identity.clone(),
            backend,
            output_format,
            filename: filename.to_string(),
            file_size_bytes: content.len() as u64,
            file_extension: extension.to_string(),
            batch_id: batch_id.map(str::to_string),
            input_ref: Some(staged.display().to_string()),
        };

        match self.deps.jobs.create(request) {
            Ok(job) => Ok(job),
            Err(e) => {
                self.deps.staging.remove(&staged).await;
                Err(e.into())
            }
        }
    }

    /// Hand a created job to the pool.
    async fn enqueue(self: Arc<Self>, job: ConversionJob) -> Result<ConversionJob, EngineError> {
        let queued_at = Utc::now();
        let transition = JobTransition::Enqueue {
            queued_at,
            expires_at: queued_at + seconds(self.workers.queue_timeout_secs),
        };

        match self.deps.jobs.transition(&job.id, transition) {
            Ok(queued) => Ok(queued),
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to enqueue job");
                self.leave_queue(1);
                self.finish(&job, JobTransition::expire()).await;
                Err(e.into())
            }
        }
    }

    /// Wait for a worker slot, execute, and record the outcome.
    async fn run_job(self: Arc<Self>, job: ConversionJob) {
        let JobState::Queued { expires_at, .. } = job.state else {
            warn!(job_id = %job.id, state = job.state.state_type(), "Refusing to run job that is not queued");
            return;
        };

        let wait = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let permit = match timeout(wait, Arc::clone(&self.permits).acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => {
                self.leave_queue(1);
                info!(job_id = %job.id, "Job expired waiting for a worker");
                self.finish(&job, JobTransition::expire()).await;
                return;
            }
        };
        self.leave_queue(1);

        let budget = self.deps.backends.deadline_for(job.backend, job.file_size_bytes);
        // Scan and conversion both run against this one deadline.
        let deadline = Instant::now() + budget;
        let started_at = Utc::now();
        let start = JobTransition::Start {
            started_at,
            deadline: started_at
                + chrono::Duration::from_std(budget).unwrap_or_else(|_| seconds(budget.as_secs())),
        };
        let running = match self.deps.jobs.transition(&job.id, start) {
            Ok(running) => running,
            Err(e) => {
                // Expired by a sweep while waiting; the sweep did the cleanup.
                debug!(job_id = %job.id, error = %e, "Job not started");
                return;
            }
        };

        debug!(job_id = %running.id, backend = %running.backend, budget_secs = budget.as_secs(), "Job started");
        let outcome = match self.deps.backends.get(running.backend) {
            Some(backend) => self.execute(&running, backend, deadline, budget).await,
            None => JobTransition::fail(
                FailureKind::InternalError,
                format!("{} backend is not configured", running.backend),
            ),
        };
        self.finish(&running, outcome).await;
        drop(permit);
    }

    /// Scan, convert, render and store. Returns the terminal transition.
    async fn execute(
        &self,
        job: &ConversionJob,
        backend: Arc<dyn ConversionBackend>,
        deadline: Instant,
        budget: Duration,
    ) -> JobTransition {
        let Some(input_ref) = job.input_ref.as_deref() else {
            return JobTransition::fail(FailureKind::InternalError, "staged input is missing");
        };
        let path = PathBuf::from(input_ref);

        if let Some(scanner) = &self.deps.scanner {
            let Ok(scanned) = timeout_at(deadline, scanner.scan(&path)).await else {
                warn!(job_id = %job.id, "Deadline passed during malware scan");
                let e = BackendError::Timeout {
                    timeout_secs: budget.as_secs(),
                };
                return JobTransition::fail(e.failure_kind(), e.job_message());
            };
            match scanned {
                Ok(ScanOutcome::Clean) | Ok(ScanOutcome::Skipped) => {}
                Ok(ScanOutcome::Infected(report)) => {
                    warn!(job_id = %job.id, report = %report, "Malware detected in upload");
                    return JobTransition::fail(
                        FailureKind::BackendError,
                        format!("malware detected: {}", report),
                    );
                }
                Err(e) => return JobTransition::fail(e.failure_kind(), e.job_message()),
            }
        }

        let input = BackendInput {
            job_id: job.id.clone(),
            filename: job.filename.clone(),
            extension: job.file_extension.clone(),
            path,
            size_bytes: job.file_size_bytes,
        };

        let timer = std::time::Instant::now();
        let result = match timeout_at(deadline, backend.execute(&input, deadline)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                timeout_secs: budget.as_secs(),
            }),
        };
        let result_label = match &result {
            Ok(_) => "success",
            Err(e) => e.code(),
        };
        metrics::BACKEND_DURATION
            .with_label_values(&[job.backend.as_str(), result_label])
            .observe(timer.elapsed().as_secs_f64());

        let markdown = match result {
            Ok(markdown) => markdown,
            Err(e) => {
                warn!(job_id = %job.id, backend = backend.name(), error = %e, "Backend failed");
                return JobTransition::fail(e.failure_kind(), e.job_message());
            }
        };

        let rendered = match render(&markdown, job.output_format, &job.filename) {
            Ok(rendered) => rendered,
            Err(e) => return JobTransition::fail(e.failure_kind(), e.job_message()),
        };

        match self
            .deps
            .artifacts
            .put(&job.id, rendered.content, rendered.media_type)
            .await
        {
            Ok(result_ref) => JobTransition::Succeed {
                completed_at: Utc::now(),
                result_ref,
            },
            Err(e) => JobTransition::fail(
                FailureKind::InternalError,
                format!("failed to store result: {}", e),
            ),
        }
    }

    /// Apply a terminal transition and its side effects: staged input
    /// removal, batch rollup and metrics. Only the caller whose transition
    /// wins performs them.
    async fn finish(&self, job: &ConversionJob, transition: JobTransition) -> Option<ConversionJob> {
        let finished = match self.deps.jobs.transition(&job.id, transition) {
            Ok(finished) => finished,
            Err(JobError::InvalidTransition { current_state, .. }) => {
                debug!(job_id = %job.id, state = %current_state, "Job already settled");
                return None;
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to settle job");
                return None;
            }
        };

        if let Some(input_ref) = finished.input_ref.as_deref() {
            self.deps.staging.remove(Path::new(input_ref)).await;
            if let Err(e) = self.deps.jobs.clear_input_ref(&finished.id) {
                warn!(job_id = %finished.id, error = %e, "Failed to clear input reference");
            }
        }

        let outcome = finished.state.state_type();
        metrics::JOBS_FINISHED
            .with_label_values(&[finished.backend.as_str(), outcome])
            .inc();
        match finished.state.failure() {
            Some((kind, message)) => {
                metrics::JOB_FAILURES.with_label_values(&[kind.as_str()]).inc();
                info!(job_id = %finished.id, kind = %kind, message = %message, "Job failed");
            }
            None => info!(job_id = %finished.id, state = outcome, "Job finished"),
        }

        if let (Some(batch_id), Some(outcome)) = (
            finished.batch_id.as_deref(),
            BatchOutcome::from_state(&finished.state),
        ) {
            self.record_batch_outcome(batch_id, outcome);
        }

        Some(finished)
    }

    fn record_batch_outcome(&self, batch_id: &str, outcome: BatchOutcome) {
        match self.deps.batches.record_outcome(batch_id, outcome, Utc::now()) {
            Ok(batch) if batch.is_complete() => info!(
                batch_id = %batch.id,
                succeeded = batch.succeeded_count,
                failed = batch.failed_count,
                "Batch complete"
            ),
            Ok(_) => {}
            Err(e) => error!(batch_id = %batch_id, error = %e, "Failed to update batch rollup"),
        }
    }

    /// Settle jobs a previous process left in flight.
    async fn recover(&self) {
        let expired = self
            .settle_all("created", JobTransition::expire)
            .await
            + self.settle_all("queued", JobTransition::expire).await;
        let interrupted = self
            .settle_all("running", || {
                JobTransition::fail(FailureKind::InternalError, "interrupted by restart")
            })
            .await;

        if expired + interrupted > 0 {
            info!(expired, interrupted, "Recovered jobs from previous run");
        }

        match self.deps.quota.clear_reservations() {
            Ok(0) => {}
            Ok(n) => info!(counters = n, "Released reservations held by previous run"),
            Err(e) => warn!(error = %e, "Failed to release stale reservations"),
        }
    }

    /// Apply `transition` to every job in `state`. Returns how many settled.
    async fn settle_all(&self, state: &str, transition: impl Fn() -> JobTransition) -> usize {
        let filter = JobFilter::new().with_state(state).with_limit(SCAN_PAGE);
        let mut settled = 0;

        loop {
            let jobs = match self.deps.jobs.list(&filter) {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!(state, error = %e, "Failed to list jobs for recovery");
                    break;
                }
            };
            if jobs.is_empty() {
                break;
            }

            let mut progressed = false;
            for job in jobs {
                if self.finish(&job, transition()).await.is_some() {
                    settled += 1;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        settled
    }

    /// Expire jobs that waited past their queue deadline.
    async fn expire_stale(&self) -> usize {
        let now = Utc::now();
        let queue_timeout = seconds(self.workers.queue_timeout_secs);
        let filter = JobFilter::new()
            .with_state("created")
            .with_state("queued")
            .with_limit(i64::MAX);

        let jobs = match self.deps.jobs.list(&filter) {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "Failed to list waiting jobs");
                return 0;
            }
        };

        let mut expired = 0;
        for job in jobs {
            let stale = match job.state {
                JobState::Queued { expires_at, .. } => expires_at <= now,
                JobState::Created => job.created_at + queue_timeout <= now,
                _ => false,
            };
            if stale && self.finish(&job, JobTransition::expire()).await.is_some() {
                expired += 1;
            }
        }
        expired
    }

    async fn run_maintenance(&self) -> MaintenanceReport {
        let now = Utc::now();
        let retention_cutoff = now - seconds(self.workers.job_retention_secs);
        let mut report = MaintenanceReport::default();

        match self.deps.accounts.expire_trials(now) {
            Ok(n) => report.trials_expired = n,
            Err(e) => warn!(error = %e, "Trial sweep failed"),
        }

        report.jobs_expired = self.expire_stale().await;

        match self.deps.artifacts.sweep_expired(now).await {
            Ok(n) => report.artifacts_removed = n,
            Err(e) => warn!(error = %e, "Artifact sweep failed"),
        }

        match self.deps.jobs.purge_terminal_before(retention_cutoff) {
            Ok(n) => report.jobs_purged = n,
            Err(e) => warn!(error = %e, "Job retention sweep failed"),
        }

        // Batch members go with their batch, never before it.
        match self.deps.batches.purge_completed_before(retention_cutoff) {
            Ok(batch_ids) => {
                report.batches_purged = batch_ids.len();
                match self.deps.jobs.purge_batch_members(&batch_ids) {
                    Ok(n) => report.jobs_purged += n,
                    Err(e) => warn!(error = %e, "Batch member sweep failed"),
                }
            }
            Err(e) => warn!(error = %e, "Batch retention sweep failed"),
        }

        for (kind, n) in [
            ("trials", report.trials_expired),
            ("queued_jobs", report.jobs_expired),
            ("artifacts", report.artifacts_removed),
            ("job_rows", report.jobs_purged),
            ("batches", report.batches_purged),
        ] {
            metrics::SWEEP_REMOVED
                .with_label_values(&[kind])
                .inc_by(n as u64);
        }

        if report != MaintenanceReport::default() {
            info!(?report, "Maintenance pass complete");
        }
        report
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
}
