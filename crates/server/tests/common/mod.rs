//! Common test utilities for HTTP testing with mocks.
//!
//! This module provides a test fixture that drives the router in-process
//! with an engine over in-memory stores and mock backends, so the full
//! request path runs without a converter binary or a remote service.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use mdraft_core::accounts::UpsertAccountRequest;
use mdraft_core::engine::{LimitsConfig, WorkerConfig};
use mdraft_core::testing::{EngineHarness, MockBackend};
use mdraft_core::{
    create_resolver, load_config_from_str, AccountStore, AuthMethod, IdentityResolver,
    IntakeConfig, QuotaConfig, Tier,
};
use mdraft_server::state::AppState;

/// Re-export fixtures for test convenience
pub use mdraft_core::testing::fixtures;

/// Test fixture for HTTP testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_convert() {
///     let fixture = TestFixture::new().await;
///
///     let form = Form::new().file("file", "report.pdf", fixtures::pdf_bytes());
///     let response = fixture.post_form("/api/v1/convert", form, &[]).await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Engine, stores and mock backends behind the router
    pub harness: EngineHarness,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Parsed JSON body, `Value::Null` when the body is not JSON.
    pub body: Value,
    /// Raw body text.
    pub text: String,
}

impl TestResponse {
    /// Session key minted for an anonymous caller, if any.
    pub fn session_id(&self) -> Option<String> {
        self.headers
            .get("x-session-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestFixture {
    /// Create a new test fixture with default configuration.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let mut builder = EngineHarness::builder()
            .workers(test_config.workers.clone())
            .limits(test_config.limits.clone())
            .quota(test_config.quota.clone())
            .intake(test_config.intake.clone());
        if test_config.with_pro {
            builder = builder.with_pro();
        }
        let harness = builder.build().await;

        for (user_id, api_key, tier) in &test_config.accounts {
            harness
                .accounts
                .upsert(UpsertAccountRequest::new(*user_id, *tier).with_api_key(*api_key))
                .expect("Failed to seed account");
        }

        let mut config = load_config_from_str(&format!(
            "[auth]\nmethod = \"{}\"",
            test_config.auth_method.as_str()
        ))
        .expect("Failed to parse test config");
        config.quota = test_config.quota;
        config.intake = test_config.intake;
        config.workers = test_config.workers;
        config.limits = test_config.limits;

        let resolver: Arc<dyn IdentityResolver> =
            Arc::from(create_resolver(&config.auth, harness.accounts.clone()));
        let state = Arc::new(AppState::new(config, resolver, harness.engine.clone()));
        let router = mdraft_server::api::create_router(state);

        Self { router, harness }
    }

    pub fn standard(&self) -> &MockBackend {
        &self.harness.standard
    }

    pub fn pro(&self) -> &MockBackend {
        &self.harness.pro
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.get_with(path, &[]).await
    }

    /// Send a GET request with extra headers.
    pub async fn get_with(&self, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Send a multipart POST request.
    pub async fn post_form(
        &self,
        path: &str,
        form: Form,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let (content_type, body) = form.finish();
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", content_type);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    /// Upload one file to `/convert`.
    pub async fn convert(
        &self,
        filename: &str,
        content: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let form = Form::new().file("file", filename, content);
        self.post_form("/api/v1/convert", form, headers).await
    }

    /// Poll a job until it reaches a terminal state.
    pub async fn wait_for_job(&self, job_id: &str, headers: &[(&str, &str)]) -> Value {
        let path = format!("/api/v1/jobs/{}", job_id);
        for _ in 0..500 {
            let response = self.get_with(&path, headers).await;
            assert_eq!(response.status, StatusCode::OK, "job lookup failed: {:?}", response.body);
            let state = response.body["state"].as_str().unwrap_or_default().to_string();
            if matches!(state.as_str(), "succeeded" | "failed" | "expired") {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {} did not finish", job_id);
    }

    /// Poll a batch until every job has finished.
    pub async fn wait_for_batch(&self, batch_id: &str, headers: &[(&str, &str)]) -> Value {
        let path = format!("/api/v1/batches/{}", batch_id);
        for _ in 0..500 {
            let response = self.get_with(&path, headers).await;
            assert_eq!(response.status, StatusCode::OK, "batch lookup failed: {:?}", response.body);
            if response.body["complete"] == Value::Bool(true) {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("batch {} did not finish", batch_id);
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).to_string();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
            text,
        }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub auth_method: AuthMethod,
    pub quota: QuotaConfig,
    pub intake: IntakeConfig,
    pub workers: WorkerConfig,
    pub limits: LimitsConfig,
    /// Configure the mock Pro backend.
    pub with_pro: bool,
    /// `(user_id, api_key, tier)` accounts to create.
    pub accounts: Vec<(&'static str, &'static str, Tier)>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            auth_method: AuthMethod::Session,
            quota: QuotaConfig::default(),
            intake: IntakeConfig::default(),
            workers: WorkerConfig::default(),
            limits: LimitsConfig::default(),
            with_pro: false,
            accounts: Vec::new(),
        }
    }
}

impl TestConfig {
    pub fn with_pro(mut self) -> Self {
        self.with_pro = true;
        self
    }

    pub fn with_account(mut self, user_id: &'static str, api_key: &'static str, tier: Tier) -> Self {
        self.accounts.push((user_id, api_key, tier));
        self
    }

    pub fn with_auth(mut self, method: AuthMethod) -> Self {
        self.auth_method = method;
        self
    }
}

const BOUNDARY: &str = "mdraft-test-boundary";

/// Minimal multipart/form-data builder.
#[derive(Debug, Default)]
pub struct Form {
    body: Vec<u8>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content: Vec<u8>) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(&content);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Content type header value and encoded body.
    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        (
            format!("multipart/form-data; boundary={BOUNDARY}"),
            self.body,
        )
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
