//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Submission (intake rejections, quota rejections, batches)
//! - Job execution (outcomes, failure kinds, backend latency)
//! - Maintenance sweeps

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Submission Metrics
// =============================================================================

/// Jobs accepted, by backend.
pub static JOBS_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mdraft_jobs_submitted_total", "Total conversion jobs accepted"),
        &["backend"], // "standard", "pro"
    )
    .unwrap()
});

/// Uploads rejected by the intake validator, by error code.
pub static VALIDATION_REJECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mdraft_validation_rejections_total",
            "Uploads rejected before a job was created",
        ),
        &["code"],
    )
    .unwrap()
});

/// Submissions refused because the daily limit was reached.
pub static QUOTA_REJECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mdraft_quota_rejections_total",
        "Submissions refused by the daily quota",
    )
    .unwrap()
});

/// Submissions refused because the queue was full.
pub static ADMISSION_REJECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mdraft_admission_rejections_total",
        "Submissions refused because the worker queue was full",
    )
    .unwrap()
});

pub static BATCHES_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("mdraft_batches_created_total", "Total batches created").unwrap()
});

// =============================================================================
// Execution Metrics
// =============================================================================

/// Jobs reaching a terminal state, by backend and outcome.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mdraft_jobs_finished_total", "Jobs reaching a terminal state"),
        &["backend", "outcome"], // outcome: "succeeded", "failed", "expired"
    )
    .unwrap()
});

/// Failed jobs by failure kind.
pub static JOB_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mdraft_job_failures_total", "Failed jobs by failure kind"),
        &["kind"],
    )
    .unwrap()
});

/// Backend execution time in seconds.
pub static BACKEND_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mdraft_backend_duration_seconds",
            "Duration of backend execution",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 900.0]),
        &["backend", "result"],
    )
    .unwrap()
});

// =============================================================================
// Maintenance Metrics
// =============================================================================

/// Rows or files removed by the maintenance loop, by kind.
pub static SWEEP_REMOVED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mdraft_sweep_removed_total",
            "Items removed or expired by the maintenance loop",
        ),
        &["kind"], // "trials", "queued_jobs", "artifacts", "job_rows", "batches"
    )
    .unwrap()
});

/// Every core metric, for registration by the server.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_SUBMITTED.clone()),
        Box::new(VALIDATION_REJECTIONS.clone()),
        Box::new(QUOTA_REJECTIONS.clone()),
        Box::new(ADMISSION_REJECTIONS.clone()),
        Box::new(BATCHES_CREATED.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(JOB_FAILURES.clone()),
        Box::new(BACKEND_DURATION.clone()),
        Box::new(SWEEP_REMOVED.clone()),
    ]
}
