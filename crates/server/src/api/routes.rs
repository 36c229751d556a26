use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::middleware::{identity_middleware, metrics_middleware};
use super::{batches, handlers, jobs};
use crate::state::AppState;

/// Room for multipart boundaries and the small text fields.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let config = state.config();
    let max_file = config
        .intake
        .standard_max_bytes
        .max(config.intake.pro_max_bytes) as usize;
    let convert_limit = max_file.saturating_add(FORM_OVERHEAD_BYTES);
    let batch_limit = max_file
        .saturating_mul(config.limits.max_batch_files.max(1))
        .saturating_add(FORM_OVERHEAD_BYTES);

    // Routes that act on behalf of a caller identity
    let caller_routes = Router::new()
        .route(
            "/convert",
            post(jobs::convert).layer(DefaultBodyLimit::max(convert_limit)),
        )
        .route("/jobs/{job_id}", get(jobs::get_job))
        .route("/jobs/{job_id}/result", get(jobs::get_result))
        .route(
            "/batches",
            post(batches::create_batch).layer(DefaultBodyLimit::max(batch_limit)),
        )
        .route("/batches/{batch_id}", get(batches::get_batch))
        .route("/usage", get(handlers::get_usage))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            identity_middleware,
        ));

    let api_routes = Router::new()
        // Health, config and metrics need no identity
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::get_metrics))
        .merge(caller_routes)
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
