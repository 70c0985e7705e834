// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use harvestrs::config::settings::DatabaseSettings;
use harvestrs::domain::models::job::{FetchMethod, Job, JobError, JobStatus};
use harvestrs::domain::models::scraped_record::{content_hash, ContentAnalysis, FieldValue, ScrapedRecord};
use harvestrs::domain::models::website_config::WebsiteConfig;
use harvestrs::domain::repositories::job_repository::{JobFilter, JobRepository, Pagination, RepositoryError};
use harvestrs::domain::repositories::scraped_record_repository::ScrapedRecordRepository;
use harvestrs::domain::repositories::website_config_repository::WebsiteConfigRepository;
use harvestrs::infrastructure::database::{connection, schema};
use harvestrs::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use harvestrs::infrastructure::repositories::scraped_record_repo_impl::ScrapedRecordRepositoryImpl;
use harvestrs::infrastructure::repositories::website_config_repo_impl::WebsiteConfigRepositoryImpl;
use harvestrs::utils::errors::ErrorKind;
use sea_orm::DatabaseConnection;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

async fn database() -> Arc<DatabaseConnection> {
    let db = connection::create_pool(&DatabaseSettings::default())
        .await
        .unwrap();
    schema::ensure_schema(&db).await.unwrap();
    Arc::new(db)
}

fn record_for(job_id: Uuid, price: &str) -> ScrapedRecord {
    let html = format!("<span class=\"price\">{}</span>", price);
    ScrapedRecord {
        id: Uuid::new_v4(),
        job_id,
        fields: BTreeMap::from([
            ("price".to_string(), FieldValue::Value(price.to_string())),
            ("tags".to_string(), FieldValue::List(vec!["a".to_string(), "b".to_string()])),
            ("missing".to_string(), FieldValue::Empty),
        ]),
        source_url: "https://shop.example.com/item".to_string(),
        final_url: "https://shop.example.com/item".to_string(),
        status_code: 200,
        title: Some("Item".to_string()),
        analysis: ContentAnalysis {
            word_count: 1,
            ..ContentAnalysis::default()
        },
        content_length: html.len(),
        content_hash: content_hash(&html),
        extracted_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_job_save_is_an_upsert() {
    let db = database().await;
    let repo = JobRepositoryImpl::new(db);

    let mut job = Job::new("https://shop.example.com/item");
    job.selectors = Some(BTreeMap::from([("price".to_string(), ".price".to_string())]));
    job.timeout_secs = Some(20);
    repo.save(&job).await.unwrap();
    repo.save(&job).await.unwrap();

    let job = job
        .start(FetchMethod::Selenium)
        .unwrap()
        .record_retry(250, JobError::new(ErrorKind::Timeout, "slow"))
        .unwrap();
    repo.save(&job).await.unwrap();

    let loaded = repo.load(job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Running);
    assert_eq!(loaded.executed_method, Some(FetchMethod::Selenium));
    assert_eq!(loaded.retry_count, 1);
    assert_eq!(loaded.last_backoff_ms, Some(250));
    assert_eq!(loaded.last_error.map(|e| e.kind), Some(ErrorKind::Timeout));
    assert_eq!(loaded.selectors, job.selectors);
    assert_eq!(loaded.timeout_secs, Some(20));

    let page = repo
        .list(&JobFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn test_missing_job_loads_as_none() {
    let repo = JobRepositoryImpl::new(database().await);
    assert!(repo.load(Uuid::new_v4()).await.unwrap().is_none());
    assert!(!repo.delete(Uuid::new_v4()).await.unwrap());
}

#[tokio::test]
async fn test_save_with_records_commits_together() {
    let db = database().await;
    let jobs = JobRepositoryImpl::new(db.clone());
    let records = ScrapedRecordRepositoryImpl::new(db);

    let job = Job::new("https://shop.example.com/item")
        .start(FetchMethod::Requests)
        .unwrap();
    jobs.save(&job).await.unwrap();

    let job = job.succeed(2).unwrap();
    let rows = vec![record_for(job.id, "1.00"), record_for(job.id, "2.00")];
    jobs.save_with_records(&job, &rows).await.unwrap();

    let loaded = jobs.load(job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Succeeded);
    assert_eq!(loaded.record_count, 2);

    let stored = records.find_by_job(job.id).await.unwrap();
    assert_eq!(stored.len(), 2);
    let first = stored.iter().find(|r| r.id == rows[0].id).unwrap();
    assert_eq!(first.fields, rows[0].fields);
    assert_eq!(first.content_hash, rows[0].content_hash);
    assert_eq!(first.analysis.word_count, 1);
    assert_eq!(records.count().await.unwrap(), 2);

    assert!(jobs.delete(job.id).await.unwrap());
    assert!(records.find_by_job(job.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_filters_and_paginates() {
    let repo = JobRepositoryImpl::new(database().await);

    for i in 0..4 {
        repo.save(&Job::new(format!("https://a.example.com/{}", i)))
            .await
            .unwrap();
    }
    let failed = Job::new("https://b.example.com/")
        .start(FetchMethod::Requests)
        .unwrap()
        .fail(JobError::new(ErrorKind::Network, "refused"))
        .unwrap();
    repo.save(&failed).await.unwrap();

    let page = repo
        .list(
            &JobFilter {
                domain: Some("a.example.com".to_string()),
                ..Default::default()
            },
            Pagination { limit: 3, offset: 0 },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.items.len(), 3);

    let page = repo
        .list(
            &JobFilter {
                statuses: Some(vec![JobStatus::Failed, JobStatus::Cancelled]),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, failed.id);
    assert_eq!(page.items[0].last_error.as_ref().map(|e| e.kind), Some(ErrorKind::Network));
}

#[tokio::test]
async fn test_statistics_group_by_status_and_method() {
    let db = database().await;
    let repo = JobRepositoryImpl::new(db);

    repo.save(&Job::new("https://a.example.com/")).await.unwrap();
    let done = Job::new("https://a.example.com/done")
        .start(FetchMethod::Playwright)
        .unwrap()
        .succeed(1)
        .unwrap();
    repo.save_with_records(&done, &[record_for(done.id, "3.00")])
        .await
        .unwrap();

    let stats = repo
        .statistics(Utc::now() - chrono::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(stats.total_jobs, 2);
    assert_eq!(stats.status_counts.get("pending"), Some(&1));
    assert_eq!(stats.status_counts.get("succeeded"), Some(&1));
    assert_eq!(stats.method_counts.get("playwright"), Some(&1));
    assert_eq!(stats.method_counts.len(), 1);
    assert_eq!(stats.recent_jobs, 2);
    assert_eq!(stats.total_records, 1);
}

#[tokio::test]
async fn test_stale_running_and_retention_cleanup() {
    let repo = JobRepositoryImpl::new(database().await);

    let mut stale = Job::new("https://a.example.com/stale")
        .start(FetchMethod::Requests)
        .unwrap();
    stale.started_at = Some(Utc::now() - chrono::Duration::hours(2));
    repo.save(&stale).await.unwrap();

    let fresh = Job::new("https://a.example.com/fresh")
        .start(FetchMethod::Requests)
        .unwrap();
    repo.save(&fresh).await.unwrap();

    let mut old = Job::new("https://a.example.com/old").cancel().unwrap();
    old.finished_at = Some(Utc::now() - chrono::Duration::days(40));
    repo.save(&old).await.unwrap();

    let found = repo
        .find_stale_running(Utc::now() - chrono::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, stale.id);

    let removed = repo
        .delete_finished_before(Utc::now() - chrono::Duration::days(30))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(repo.load(old.id).await.unwrap().is_none());
    assert!(repo.load(fresh.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_website_config_domain_is_unique() {
    let repo = WebsiteConfigRepositoryImpl::new(database().await);

    let mut config = WebsiteConfig::new("Shop", "https://Shop.Example.com/catalog").unwrap();
    config.default_method = FetchMethod::Selenium;
    config.default_selectors = BTreeMap::from([("price".to_string(), ".price".to_string())]);
    config.rate_limit_delay_secs = Some(1.5);
    config.requires_js = true;
    repo.create(&config).await.unwrap();

    let duplicate = WebsiteConfig::new("Other", "https://shop.example.com/").unwrap();
    assert!(matches!(
        repo.create(&duplicate).await,
        Err(RepositoryError::AlreadyExists(_))
    ));

    let loaded = repo.load_by_domain("shop.example.com").await.unwrap().unwrap();
    assert_eq!(loaded.domain, "shop.example.com");
    assert_eq!(loaded.default_method, FetchMethod::Selenium);
    assert_eq!(loaded.default_selectors, config.default_selectors);
    assert_eq!(loaded.rate_limit_delay_secs, Some(1.5));
    assert!(loaded.requires_js);

    let mut updated = loaded;
    updated.is_active = false;
    updated.description = Some("paused".to_string());
    repo.update(&updated).await.unwrap();

    let reloaded = repo.load_by_domain("shop.example.com").await.unwrap().unwrap();
    assert!(!reloaded.is_active);
    assert_eq!(reloaded.description.as_deref(), Some("paused"));
    assert_eq!(repo.list().await.unwrap().len(), 1);

    let unknown = WebsiteConfig::new("Nope", "https://nope.example.com").unwrap();
    assert!(matches!(
        repo.update(&unknown).await,
        Err(RepositoryError::NotFound)
    ));
}
