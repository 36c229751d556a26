//! Batch uploads through the HTTP API.

mod common;

use axum::http::StatusCode;
use common::{fixtures, Form, TestConfig, TestFixture};
use mdraft_core::engine::LimitsConfig;

const CLIENT_A: &[(&str, &str)] = &[("X-Session-Id", "client-a")];
const CLIENT_B: &[(&str, &str)] = &[("X-Session-Id", "client-b")];

fn pdfs(names: &[&str]) -> Form {
    names.iter().fold(Form::new(), |form, name| {
        form.file("files", name, fixtures::pdf_bytes())
    })
}

#[tokio::test]
async fn test_batch_rolls_up_outcomes() {
    let fixture = TestFixture::new().await;
    fixture.standard().fail_for_filename("b.pdf").await;

    let form = pdfs(&["a.pdf", "b.pdf", "c.pdf"]).file("files", "fake.pdf", fixtures::png_bytes());
    let response = fixture.post_form("/api/v1/batches", form, CLIENT_A).await;

    assert_status!(response, StatusCode::ACCEPTED);
    assert_eq!(response.body["total_jobs"], 3);
    assert_eq!(response.body["accepted"].as_array().unwrap().len(), 3);
    let rejected = response.body["rejected"].as_array().unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0]["filename"], "fake.pdf");
    assert_eq!(rejected[0]["code"], "signature-mismatch");

    let batch_id = response.body["batch_id"].as_str().unwrap().to_string();
    let batch = fixture.wait_for_batch(&batch_id, CLIENT_A).await;
    assert_eq!(batch["progress"], 100);
    assert_eq!(batch["succeeded_count"], 2);
    assert_eq!(batch["failed_count"], 1);
    assert!(batch["completed_at"].is_string());

    let jobs = batch["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 3);
    let failed: Vec<_> = jobs.iter().filter(|j| j["state"] == "failed").collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["filename"], "b.pdf");
    assert!(jobs.iter().all(|j| j["batch_id"] == batch_id.as_str()));

    // Each accepted file used one conversion
    let usage = fixture.get_with("/api/v1/usage", CLIENT_A).await;
    assert_eq!(usage.body["used_today"], 3);
}

#[tokio::test]
async fn test_batch_jobs_are_individually_retrievable() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_form("/api/v1/batches", pdfs(&["one.pdf", "two.pdf"]), CLIENT_A)
        .await;
    assert_status!(response, StatusCode::ACCEPTED);
    let batch_id = response.body["batch_id"].as_str().unwrap().to_string();
    fixture.wait_for_batch(&batch_id, CLIENT_A).await;

    for accepted in response.body["accepted"].as_array().unwrap() {
        let url = format!("{}/result", accepted["status_url"].as_str().unwrap());
        let result = fixture.get_with(&url, CLIENT_A).await;
        assert_status!(result, StatusCode::OK);
        assert!(result.text.contains("Mock output"));
    }
}

#[tokio::test]
async fn test_batch_is_private_to_its_owner() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_form("/api/v1/batches", pdfs(&["a.pdf"]), CLIENT_A)
        .await;
    let batch_id = response.body["batch_id"].as_str().unwrap().to_string();

    let other = fixture
        .get_with(&format!("/api/v1/batches/{}", batch_id), CLIENT_B)
        .await;
    assert_status!(other, StatusCode::NOT_FOUND);
    assert_eq!(other.body["code"], "not-found");
}

#[tokio::test]
async fn test_batch_without_valid_files() {
    let fixture = TestFixture::new().await;

    let form = Form::new()
        .file("files", "fake.pdf", fixtures::png_bytes())
        .file("files", "tool.exe", b"MZ".to_vec());
    let response = fixture.post_form("/api/v1/batches", form, CLIENT_A).await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "empty-batch");
    assert_eq!(response.body["rejected"].as_array().unwrap().len(), 2);
    assert_eq!(fixture.harness.job_count(), 0);
}

#[tokio::test]
async fn test_batch_file_count_limit() {
    let config = TestConfig {
        limits: LimitsConfig { max_batch_files: 2 },
        ..TestConfig::default()
    };
    let fixture = TestFixture::with_config(config).await;

    let response = fixture
        .post_form("/api/v1/batches", pdfs(&["a.pdf", "b.pdf", "c.pdf"]), CLIENT_A)
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "too-many-files");
}

#[tokio::test]
async fn test_batch_quota_is_all_or_nothing() {
    let fixture = TestFixture::new().await;
    for name in ["a.pdf", "b.pdf", "c.pdf"] {
        let response = fixture.convert(name, fixtures::pdf_bytes(), CLIENT_A).await;
        assert_status!(response, StatusCode::ACCEPTED);
    }
    let jobs_before = fixture.harness.job_count();

    let response = fixture
        .post_form("/api/v1/batches", pdfs(&["d.pdf", "e.pdf", "f.pdf"]), CLIENT_A)
        .await;

    assert_status!(response, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.body["code"], "quota-exceeded");
    assert_eq!(fixture.harness.job_count(), jobs_before);

    let usage = fixture.get_with("/api/v1/usage", CLIENT_A).await;
    assert_eq!(usage.body["used_today"], 3);
}

#[tokio::test]
async fn test_batch_requires_files() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_form("/api/v1/batches", Form::new().text("backend", "standard"), CLIENT_A)
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "bad-request");
}
