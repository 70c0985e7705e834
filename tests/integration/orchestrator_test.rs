// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{page, HangingEngine, ScriptedEngine, TestHarness};
use harvestrs::application::dto::job_request::{CreateJobRequest, ExecutionMode, ExportFormat, JobListQuery};
use harvestrs::domain::models::job::{FetchMethod, JobStatus};
use harvestrs::domain::models::scraped_record::FieldValue;
use harvestrs::domain::models::website_config::WebsiteConfig;
use harvestrs::domain::repositories::job_repository::JobRepository;
use harvestrs::engines::router::EngineRouter;
use harvestrs::engines::traits::FetchError;
use harvestrs::queue::job_queue::JobQueue;
use harvestrs::utils::errors::{ErrorKind, ServiceError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn product_selectors() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("name".to_string(), "h1.name".to_string()),
        ("price".to_string(), ".price".to_string()),
        ("tags".to_string(), "li.tag".to_string()),
        ("missing".to_string(), ".nothing-here".to_string()),
    ])
}

fn job_request(url: &str) -> CreateJobRequest {
    let mut request = CreateJobRequest::new(url);
    request.selectors = Some(product_selectors());
    request
}

#[tokio::test]
async fn test_sync_execution_persists_record() {
    let engine = ScriptedEngine::succeeding();
    let harness = TestHarness::with_engine(engine.clone());

    let job = harness
        .orchestrator
        .create_job(job_request("https://shop.example.com/widget"))
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let result = harness
        .orchestrator
        .execute_job(job.id, ExecutionMode::Sync)
        .await
        .unwrap();
    assert_eq!(result.status, JobStatus::Succeeded);
    assert_eq!(result.record_count, 1);
    assert_eq!(result.retry_count, 0);

    let stored = harness.job(job.id).await;
    assert_eq!(stored.status, JobStatus::Succeeded);
    assert_eq!(stored.executed_method, Some(FetchMethod::Requests));
    assert!(stored.started_at.is_some());
    assert!(stored.finished_at.is_some());

    let records = harness.orchestrator.job_records(job.id).await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.job_id, job.id);
    assert_eq!(record.fields["name"], FieldValue::Value("Widget".to_string()));
    assert_eq!(record.fields["price"], FieldValue::Value("19.99".to_string()));
    assert_eq!(
        record.fields["tags"],
        FieldValue::List(vec!["blue".to_string(), "small".to_string()])
    );
    assert_eq!(record.fields["missing"], FieldValue::Empty);
    assert_eq!(record.title.as_deref(), Some("Widget"));
    assert_eq!(record.status_code, 200);
    assert_eq!(engine.calls(), 1);
}

#[tokio::test]
async fn test_empty_selectors_still_produce_one_record() {
    let harness = TestHarness::with_engine(ScriptedEngine::succeeding());

    let job = harness
        .orchestrator
        .create_job(CreateJobRequest::new("https://shop.example.com/plain"))
        .await
        .unwrap();
    let result = harness
        .orchestrator
        .execute_job(job.id, ExecutionMode::Sync)
        .await
        .unwrap();

    assert_eq!(result.status, JobStatus::Succeeded);
    let records = harness.orchestrator.job_records(job.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].fields.is_empty());
    assert!(records[0].analysis.word_count > 0);
}

#[tokio::test]
async fn test_transient_failures_are_retried_and_counted() {
    let engine = ScriptedEngine::new(vec![
        Err(FetchError::HttpStatus { status: 503 }),
        Err(FetchError::Timeout),
    ]);
    let harness = TestHarness::with_engine(engine.clone());

    let job = harness
        .orchestrator
        .create_job(job_request("https://flaky.example.com/"))
        .await
        .unwrap();
    let result = harness
        .orchestrator
        .execute_job(job.id, ExecutionMode::Sync)
        .await
        .unwrap();

    assert_eq!(result.status, JobStatus::Succeeded);
    assert_eq!(result.retry_count, 2);
    assert_eq!(engine.calls(), 3);

    let stored = harness.job(job.id).await;
    assert_eq!(stored.retry_count, 2);
    assert!(stored.last_backoff_ms.is_some());
    // The last transient error stays on the job after success.
    assert_eq!(stored.last_error.map(|e| e.kind), Some(ErrorKind::Timeout));
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_job() {
    let engine = ScriptedEngine::new(vec![
        Err(FetchError::Network("reset".to_string())),
        Err(FetchError::Network("reset".to_string())),
        Err(FetchError::Network("reset".to_string())),
    ]);
    let harness = TestHarness::with_engine(engine.clone());

    let job = harness
        .orchestrator
        .create_job(job_request("https://down.example.com/"))
        .await
        .unwrap();
    let result = harness
        .orchestrator
        .execute_job(job.id, ExecutionMode::Sync)
        .await
        .unwrap();

    assert_eq!(result.status, JobStatus::Failed);
    assert_eq!(result.record_count, 0);
    assert_eq!(engine.calls(), 3);
    assert_eq!(result.error.map(|e| e.kind), Some(ErrorKind::Network));
    assert!(harness.orchestrator.job_records(job.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let engine = ScriptedEngine::new(vec![Err(FetchError::HttpStatus { status: 404 })]);
    let harness = TestHarness::with_engine(engine.clone());

    let job = harness
        .orchestrator
        .create_job(job_request("https://gone.example.com/page"))
        .await
        .unwrap();
    let result = harness
        .orchestrator
        .execute_job(job.id, ExecutionMode::Sync)
        .await
        .unwrap();

    assert_eq!(result.status, JobStatus::Failed);
    assert_eq!(result.retry_count, 0);
    assert_eq!(engine.calls(), 1);
    assert_eq!(result.error.map(|e| e.kind), Some(ErrorKind::HttpStatus));
}

#[tokio::test]
async fn test_site_requiring_scripts_uses_browser_engine() {
    let plain = ScriptedEngine::succeeding();
    let browser = ScriptedEngine::succeeding();
    let harness = TestHarness::new(
        EngineRouter::new()
            .register(FetchMethod::Requests, plain.clone())
            .register(FetchMethod::Playwright, browser.clone()),
    );

    let mut config = WebsiteConfig::new("App", "https://app.example.com").unwrap();
    config.requires_js = true;
    config.default_selectors = product_selectors();
    config.page_load_timeout_secs = Some(45);
    harness.add_config(config).await;

    let job = harness
        .orchestrator
        .create_job(CreateJobRequest::new("https://app.example.com/dashboard"))
        .await
        .unwrap();
    let result = harness
        .orchestrator
        .execute_job(job.id, ExecutionMode::Sync)
        .await
        .unwrap();

    assert_eq!(result.status, JobStatus::Succeeded);
    assert_eq!(plain.calls(), 0);
    assert_eq!(browser.calls(), 1);
    assert_eq!(
        harness.job(job.id).await.executed_method,
        Some(FetchMethod::Playwright)
    );

    let request = browser.last_request().unwrap();
    assert_eq!(request.timeout, Duration::from_secs(45));

    // Site selectors apply because the job gave none.
    let records = harness.orchestrator.job_records(job.id).await.unwrap();
    assert_eq!(records[0].fields["name"], FieldValue::Value("Widget".to_string()));
}

#[tokio::test]
async fn test_explicit_overrides_replace_site_defaults() {
    let engine = ScriptedEngine::succeeding();
    let harness = TestHarness::with_engine(engine.clone());

    let mut config = WebsiteConfig::new("Shop", "https://shop.example.com").unwrap();
    config.default_selectors = product_selectors();
    config.default_headers = BTreeMap::from([("X-Site".to_string(), "1".to_string())]);
    harness.add_config(config).await;

    let mut request = CreateJobRequest::new("https://shop.example.com/item");
    request.selectors = Some(BTreeMap::from([("heading".to_string(), "h1".to_string())]));
    request.headers = Some(BTreeMap::from([("X-Job".to_string(), "2".to_string())]));
    request.timeout_secs = Some(7);
    let job = harness.orchestrator.create_job(request).await.unwrap();

    harness
        .orchestrator
        .execute_job(job.id, ExecutionMode::Sync)
        .await
        .unwrap();

    let sent = engine.last_request().unwrap();
    assert_eq!(sent.timeout, Duration::from_secs(7));
    assert_eq!(sent.headers.get("X-Job").map(String::as_str), Some("2"));
    assert!(!sent.headers.contains_key("X-Site"));

    let records = harness.orchestrator.job_records(job.id).await.unwrap();
    assert_eq!(records[0].fields.len(), 1);
    assert!(records[0].fields.contains_key("heading"));
}

#[tokio::test]
async fn test_cancel_pending_job() {
    let harness = TestHarness::with_engine(ScriptedEngine::succeeding());
    let job = harness
        .orchestrator
        .create_job(CreateJobRequest::new("https://example.com/"))
        .await
        .unwrap();

    let cancelled = harness.orchestrator.cancel_job(job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.finished_at.is_some());

    // Terminal jobs reject a second cancel and any execution.
    assert!(matches!(
        harness.orchestrator.cancel_job(job.id).await,
        Err(ServiceError::InvalidState(_))
    ));
    assert!(matches!(
        harness.orchestrator.execute_job(job.id, ExecutionMode::Sync).await,
        Err(ServiceError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_cancel_running_job_releases_gate() {
    let engine = HangingEngine::new();
    let harness = TestHarness::with_engine(engine.clone());
    let capacity = harness.gate.capacity();

    let job = harness
        .orchestrator
        .create_job(CreateJobRequest::new("https://slow.example.com/"))
        .await
        .unwrap();

    let orchestrator = harness.orchestrator.clone();
    let id = job.id;
    let execution = tokio::spawn(async move { orchestrator.execute_job(id, ExecutionMode::Sync).await });

    engine.started.notified().await;
    assert_eq!(harness.gate.available_permits(), capacity - 1);
    assert_eq!(harness.orchestrator.active_jobs(), 1);

    let requested = harness.orchestrator.cancel_job(id).await.unwrap();
    assert_eq!(requested.status, JobStatus::Running);

    let result = execution.await.unwrap().unwrap();
    assert_eq!(result.status, JobStatus::Cancelled);
    assert_eq!(harness.gate.available_permits(), capacity);
    assert_eq!(harness.orchestrator.active_jobs(), 0);
    assert!(harness.orchestrator.job_records(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_while_waiting_for_gate_skips_fetch() {
    let engine = ScriptedEngine::succeeding();
    let harness = TestHarness::with_engine(engine.clone());
    let capacity = harness.gate.capacity();
    let token = CancellationToken::new();

    let mut held = Vec::new();
    for i in 0..capacity {
        let domain = format!("busy{}.example.com", i);
        held.push(harness.gate.acquire(&domain, None, &token).await.unwrap());
    }
    assert_eq!(harness.gate.available_permits(), 0);

    let job = harness
        .orchestrator
        .create_job(CreateJobRequest::new("https://queued.example.com/"))
        .await
        .unwrap();

    let orchestrator = harness.orchestrator.clone();
    let id = job.id;
    let execution = tokio::spawn(async move { orchestrator.execute_job(id, ExecutionMode::Sync).await });

    harness.wait_for_status(id, JobStatus::Running).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(engine.calls(), 0);

    harness.orchestrator.cancel_job(id).await.unwrap();
    let result = execution.await.unwrap().unwrap();
    assert_eq!(result.status, JobStatus::Cancelled);
    assert_eq!(engine.calls(), 0);
    assert!(harness.orchestrator.job_records(id).await.unwrap().is_empty());

    drop(held);
    assert_eq!(harness.gate.available_permits(), capacity);
}

#[tokio::test]
async fn test_invalid_selector_is_recorded_without_failing_job() {
    let harness = TestHarness::with_engine(ScriptedEngine::succeeding());
    let mut request = CreateJobRequest::new("https://shop.example.com/widget");
    request.selectors = Some(BTreeMap::from([
        ("price".to_string(), ".price".to_string()),
        ("broken".to_string(), "div[".to_string()),
    ]));
    let job = harness.orchestrator.create_job(request).await.unwrap();

    let result = harness
        .orchestrator
        .execute_job(job.id, ExecutionMode::Sync)
        .await
        .unwrap();
    assert_eq!(result.status, JobStatus::Succeeded);
    assert_eq!(result.record_count, 1);

    let records = harness.orchestrator.job_records(job.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].fields["price"], FieldValue::Value("19.99".to_string()));
    assert!(matches!(records[0].fields["broken"], FieldValue::Error(_)));
}

#[tokio::test]
async fn test_out_of_range_timeout_is_rejected() {
    let harness = TestHarness::with_engine(ScriptedEngine::succeeding());
    let mut request = CreateJobRequest::new("https://example.com/");
    request.timeout_secs = Some(u64::MAX);

    let err = harness.orchestrator.create_job(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_running_job_cannot_be_executed_twice() {
    let engine = HangingEngine::new();
    let harness = TestHarness::with_engine(engine.clone());

    let job = harness
        .orchestrator
        .create_job(CreateJobRequest::new("https://slow.example.com/"))
        .await
        .unwrap();

    let orchestrator = harness.orchestrator.clone();
    let id = job.id;
    let execution = tokio::spawn(async move { orchestrator.execute_job(id, ExecutionMode::Sync).await });
    engine.started.notified().await;

    assert!(matches!(
        harness.orchestrator.execute_job(id, ExecutionMode::Sync).await,
        Err(ServiceError::InvalidState(_))
    ));
    assert!(matches!(
        harness.orchestrator.run_job(id).await,
        Err(ServiceError::InvalidState(_))
    ));
    assert!(matches!(
        harness.orchestrator.delete_job(id).await,
        Err(ServiceError::InvalidState(_))
    ));

    harness.orchestrator.cancel_job(id).await.unwrap();
    execution.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_async_mode_enqueues_without_running() {
    let engine = ScriptedEngine::succeeding();
    let harness = TestHarness::with_engine(engine.clone());

    let job = harness
        .orchestrator
        .create_job(CreateJobRequest::new("https://example.com/queued"))
        .await
        .unwrap();
    let result = harness
        .orchestrator
        .execute_job(job.id, ExecutionMode::Async)
        .await
        .unwrap();

    assert_eq!(result.status, JobStatus::Pending);
    assert_eq!(engine.calls(), 0);
    assert_eq!(harness.queue.dequeue().await.unwrap(), Some(job.id));

    let result = harness.orchestrator.run_job(job.id).await.unwrap();
    assert_eq!(result.status, JobStatus::Succeeded);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_before_persisting() {
    let harness = TestHarness::with_engine(ScriptedEngine::succeeding());

    for url in ["ftp://example.com/file", "not a url", ""] {
        let err = harness
            .orchestrator
            .create_job(CreateJobRequest::new(url))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    let page = harness
        .orchestrator
        .list_jobs(JobListQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_bulk_create_reports_each_item() {
    let harness = TestHarness::with_engine(ScriptedEngine::succeeding());

    let response = harness
        .orchestrator
        .create_jobs(vec![
            CreateJobRequest::new("https://a.example.com/"),
            CreateJobRequest::new("javascript:alert(1)"),
            CreateJobRequest::new("https://b.example.com/"),
        ])
        .await;

    assert_eq!(response.created, 2);
    assert_eq!(response.failed, 1);
    assert!(response.items[1].error.is_some());
    assert!(response.items[1].job.is_none());
}

#[tokio::test]
async fn test_list_filters_by_status_and_domain() {
    let harness = TestHarness::with_engine(ScriptedEngine::succeeding());

    let done = harness
        .orchestrator
        .create_job(CreateJobRequest::new("https://a.example.com/1"))
        .await
        .unwrap();
    harness
        .orchestrator
        .create_job(CreateJobRequest::new("https://a.example.com/2"))
        .await
        .unwrap();
    harness
        .orchestrator
        .create_job(CreateJobRequest::new("https://b.example.com/1"))
        .await
        .unwrap();
    harness
        .orchestrator
        .execute_job(done.id, ExecutionMode::Sync)
        .await
        .unwrap();

    let pending_a = harness
        .orchestrator
        .list_jobs(JobListQuery {
            status: Some("pending".to_string()),
            domain: Some("a.example.com".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(pending_a.total, 1);
    assert_eq!(pending_a.items[0].url, "https://a.example.com/2");

    let first_page = harness
        .orchestrator
        .list_jobs(JobListQuery {
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(first_page.total, 3);
    assert_eq!(first_page.items.len(), 2);

    let stats = harness.orchestrator.statistics().await.unwrap();
    assert_eq!(stats.total_jobs, 3);
    assert_eq!(stats.status_counts.get("pending"), Some(&2));
    assert_eq!(stats.status_counts.get("succeeded"), Some(&1));
    assert_eq!(stats.method_counts.get("requests"), Some(&1));
    assert_eq!(stats.recent_jobs, 3);
    assert_eq!(stats.total_records, 1);
}

#[tokio::test]
async fn test_export_records_as_csv() {
    let harness = TestHarness::with_engine(ScriptedEngine::succeeding());
    let job = harness
        .orchestrator
        .create_job(job_request("https://shop.example.com/widget"))
        .await
        .unwrap();
    harness
        .orchestrator
        .execute_job(job.id, ExecutionMode::Sync)
        .await
        .unwrap();

    let (content_type, body) = harness
        .orchestrator
        .export_records(job.id, ExportFormat::Csv)
        .await
        .unwrap();
    assert!(content_type.starts_with("text/csv"));
    let header = body.lines().next().unwrap();
    assert!(header.contains("name"));
    assert!(header.contains("price"));
    assert!(body.contains("19.99"));

    let (content_type, body) = harness
        .orchestrator
        .export_records(job.id, ExportFormat::Json)
        .await
        .unwrap();
    assert_eq!(content_type, "application/json");
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_delete_only_terminal_jobs() {
    let harness = TestHarness::with_engine(ScriptedEngine::succeeding());
    let job = harness
        .orchestrator
        .create_job(CreateJobRequest::new("https://example.com/delete"))
        .await
        .unwrap();

    assert!(matches!(
        harness.orchestrator.delete_job(job.id).await,
        Err(ServiceError::InvalidState(_))
    ));

    harness
        .orchestrator
        .execute_job(job.id, ExecutionMode::Sync)
        .await
        .unwrap();
    harness.orchestrator.delete_job(job.id).await.unwrap();

    assert!(matches!(
        harness.orchestrator.get_job(job.id).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        harness.orchestrator.job_records(job.id).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_reconcile_requeues_orphaned_running_jobs() {
    let harness = TestHarness::with_engine(ScriptedEngine::succeeding());

    // A job left running by a previous process.
    let mut job = harness
        .orchestrator
        .create_job(CreateJobRequest::new("https://example.com/orphan"))
        .await
        .unwrap()
        .start(FetchMethod::Requests)
        .unwrap();
    job.updated_at = chrono::Utc::now() - chrono::Duration::minutes(30);
    job.started_at = Some(job.updated_at);
    harness.jobs.save(&job).await.unwrap();

    let requeued = harness
        .orchestrator
        .reconcile_stale_jobs(Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(requeued, 1);
    assert_eq!(harness.job(job.id).await.status, JobStatus::Pending);
    assert_eq!(harness.queue.dequeue().await.unwrap(), Some(job.id));

    // Nothing is stale the second time round.
    assert_eq!(
        harness
            .orchestrator
            .reconcile_stale_jobs(Duration::from_secs(60))
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_cancel_orphaned_running_job() {
    let harness = TestHarness::with_engine(ScriptedEngine::succeeding());
    let job = harness
        .orchestrator
        .create_job(CreateJobRequest::new("https://example.com/orphan"))
        .await
        .unwrap()
        .start(FetchMethod::Requests)
        .unwrap();
    harness.jobs.save(&job).await.unwrap();

    let cancelled = harness.orchestrator.cancel_job(job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn test_concurrent_jobs_on_one_domain_all_complete() {
    let engine = ScriptedEngine::new(vec![
        Ok(page("https://example.com/0", "<html><body><p>zero</p></body></html>")),
    ]);
    let harness = TestHarness::with_engine(engine.clone());

    let mut ids = Vec::new();
    for i in 0..5 {
        let job = harness
            .orchestrator
            .create_job(CreateJobRequest::new(format!("https://example.com/{}", i)))
            .await
            .unwrap();
        ids.push(job.id);
    }

    let handles: Vec<_> = ids
        .iter()
        .map(|id| {
            let orchestrator = Arc::clone(&harness.orchestrator);
            let id = *id;
            tokio::spawn(async move { orchestrator.execute_job(id, ExecutionMode::Sync).await })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.status, JobStatus::Succeeded);
    }
    assert_eq!(engine.calls(), 5);
    assert_eq!(harness.gate.available_permits(), harness.gate.capacity());
}
