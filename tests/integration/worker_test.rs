// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{HangingEngine, ScriptedEngine, TestHarness};
use harvestrs::application::dto::job_request::{CreateJobRequest, ExecutionMode};
use harvestrs::domain::models::job::JobStatus;
use harvestrs::workers::manager::WorkerManager;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_workers_drain_async_jobs() {
    let engine = ScriptedEngine::succeeding();
    let harness = TestHarness::with_engine(engine.clone());

    let mut workers = WorkerManager::new(CancellationToken::new());
    workers.start_scrape_workers(2, harness.orchestrator.clone(), harness.queue.clone());
    assert_eq!(workers.len(), 2);

    let mut ids = Vec::new();
    for i in 0..4 {
        let job = harness
            .orchestrator
            .create_job(CreateJobRequest::new(format!("https://site{}.example.com/", i)))
            .await
            .unwrap();
        harness
            .orchestrator
            .execute_job(job.id, ExecutionMode::Async)
            .await
            .unwrap();
        ids.push(job.id);
    }

    for id in ids {
        let job = harness.wait_for_status(id, JobStatus::Succeeded).await;
        assert_eq!(job.record_count, 1);
    }
    assert_eq!(engine.calls(), 4);

    workers.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_duplicate_delivery_runs_once() {
    let engine = ScriptedEngine::succeeding();
    let harness = TestHarness::with_engine(engine.clone());

    let mut workers = WorkerManager::new(CancellationToken::new());
    workers.start_scrape_workers(2, harness.orchestrator.clone(), harness.queue.clone());

    let job = harness
        .orchestrator
        .create_job(CreateJobRequest::new("https://example.com/once"))
        .await
        .unwrap();
    harness
        .orchestrator
        .execute_job(job.id, ExecutionMode::Async)
        .await
        .unwrap();
    // A second delivery of the same id while it is still pending.
    let _ = harness
        .orchestrator
        .execute_job(job.id, ExecutionMode::Async)
        .await;

    harness.wait_for_status(job.id, JobStatus::Succeeded).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.calls(), 1);

    workers.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_shutdown_is_bounded_by_grace_period() {
    let engine = HangingEngine::new();
    let harness = TestHarness::with_engine(engine.clone());

    let mut workers = WorkerManager::new(CancellationToken::new());
    workers.start_scrape_workers(1, harness.orchestrator.clone(), harness.queue.clone());

    let job = harness
        .orchestrator
        .create_job(CreateJobRequest::new("https://slow.example.com/"))
        .await
        .unwrap();
    harness
        .orchestrator
        .execute_job(job.id, ExecutionMode::Async)
        .await
        .unwrap();
    engine.started.notified().await;

    let started = std::time::Instant::now();
    workers.shutdown(Duration::from_millis(100)).await;
    assert!(started.elapsed() < Duration::from_secs(2));
}
