//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the mdraft server:
//! - HTTP request metrics (latency, counts, auth failures)
//! - Engine gauges (jobs by state, worker pool), collected on scrape
//! - Core submission and execution metrics, registered alongside

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use regex_lite::Regex;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mdraft_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mdraft_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mdraft_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Identity resolution failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mdraft_auth_failures_total",
            "Total identity resolution failures",
        ),
        &["reason"],
    )
    .unwrap()
});

/// Anonymous session keys handed out.
pub static SESSIONS_MINTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "mdraft_sessions_minted_total",
        "Anonymous session keys minted since startup",
    )
    .unwrap()
});

// =============================================================================
// Engine Metrics (collected dynamically)
// =============================================================================

/// Jobs by current state.
pub static JOBS_BY_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("mdraft_jobs_by_state", "Current job count by state"),
        &["state"],
    )
    .unwrap()
});

/// Engine running state (1 = running, 0 = stopped).
pub static ENGINE_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mdraft_engine_running",
        "Whether the conversion engine is running (1) or stopped (0)",
    )
    .unwrap()
});

pub static WORKER_POOL_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("mdraft_worker_pool_size", "Configured worker slots").unwrap()
});

pub static WORKER_POOL_BUSY: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mdraft_worker_pool_busy",
        "Worker slots currently executing a job",
    )
    .unwrap()
});

/// Admitted jobs waiting for a worker slot.
pub static WORKER_POOL_WAITING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mdraft_worker_pool_waiting",
        "Jobs admitted and waiting for a worker slot",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(SESSIONS_MINTED_TOTAL.clone()))
        .unwrap();

    // Engine
    registry.register(Box::new(JOBS_BY_STATE.clone())).unwrap();
    registry.register(Box::new(ENGINE_RUNNING.clone())).unwrap();
    registry
        .register(Box::new(WORKER_POOL_SIZE.clone()))
        .unwrap();
    registry
        .register(Box::new(WORKER_POOL_BUSY.clone()))
        .unwrap();
    registry
        .register(Box::new(WORKER_POOL_WAITING.clone()))
        .unwrap();

    // Core metrics (submission, execution, maintenance)
    for metric in mdraft_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| format!("metrics are not valid UTF-8: {}", e))
}

/// Refresh the engine gauges from current application state.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.engine().status();

    ENGINE_RUNNING.set(i64::from(status.running));
    WORKER_POOL_SIZE.set(status.pool_size as i64);
    WORKER_POOL_BUSY.set(status.busy_workers as i64);
    WORKER_POOL_WAITING.set(status.waiting_jobs as i64);

    for (state_type, count) in [
        ("queued", status.queued_count),
        ("running", status.running_count),
        ("succeeded", status.succeeded_count),
        ("failed", status.failed_count),
        ("expired", status.expired_count),
    ] {
        JOBS_BY_STATE
            .with_label_values(&[state_type])
            .set(count as i64);
    }
}

static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_SEGMENT.replace_all(path, "{id}");
    let result = NUMERIC_SEGMENT.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/jobs/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/jobs/{id}");
    }

    #[test]
    fn test_normalize_path_uuid_middle() {
        let path = "/api/v1/jobs/550e8400-e29b-41d4-a716-446655440000/result";
        assert_eq!(normalize_path(path), "/api/v1/jobs/{id}/result");
    }

    #[test]
    fn test_normalize_path_numeric() {
        let path = "/api/v1/batches/12345";
        assert_eq!(normalize_path(path), "/api/v1/batches/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/health";
        assert_eq!(normalize_path(path), "/api/v1/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("mdraft_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        mdraft_core::metrics::QUOTA_REJECTIONS.inc_by(0);
        mdraft_core::metrics::JOBS_SUBMITTED
            .with_label_values(&["standard"])
            .inc_by(0);
        JOBS_BY_STATE.with_label_values(&["queued"]).set(0);
        ENGINE_RUNNING.set(0);

        let output = encode_metrics().unwrap();
        assert!(output.contains("mdraft_quota_rejections_total"));
        assert!(output.contains("mdraft_jobs_submitted_total"));
        assert!(output.contains("mdraft_jobs_by_state"));
        assert!(output.contains("mdraft_engine_running"));
    }
}
