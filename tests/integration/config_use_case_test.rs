// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{ScriptedEngine, TestHarness};
use harvestrs::application::dto::config_request::{CreateWebsiteConfigRequest, UpdateWebsiteConfigRequest};
use harvestrs::application::use_cases::website_config_use_case::WebsiteConfigUseCase;
use harvestrs::domain::models::job::FetchMethod;
use harvestrs::domain::models::scraped_record::FieldValue;
use harvestrs::engines::traits::FetchError;
use harvestrs::utils::errors::{ErrorKind, ServiceError};
use std::collections::BTreeMap;
use std::sync::Arc;

fn use_case(harness: &TestHarness) -> WebsiteConfigUseCase {
    WebsiteConfigUseCase::new(harness.configs.clone(), harness.pipeline.clone())
}

fn shop_request() -> CreateWebsiteConfigRequest {
    CreateWebsiteConfigRequest {
        name: "Shop".to_string(),
        base_url: "https://Shop.Example.com/catalog".to_string(),
        default_selectors: Some(BTreeMap::from([("price".to_string(), ".price".to_string())])),
        rate_limit_delay_secs: Some(0.5),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_normalizes_domain_and_rejects_duplicates() {
    let harness = TestHarness::with_engine(ScriptedEngine::succeeding());
    let configs = use_case(&harness);

    let created = configs.create(shop_request()).await.unwrap();
    assert_eq!(created.domain, "shop.example.com");
    assert_eq!(created.default_method, FetchMethod::Requests);
    assert!(created.is_active);

    let err = configs.create(shop_request()).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));

    let fetched = configs.get("SHOP.example.com").await.unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(configs.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_rejects_invalid_values() {
    let harness = TestHarness::with_engine(ScriptedEngine::succeeding());
    let configs = use_case(&harness);

    let mut request = shop_request();
    request.base_url = "ftp://shop.example.com".to_string();
    assert_eq!(
        configs.create(request).await.unwrap_err().kind(),
        ErrorKind::Validation
    );

    let mut request = shop_request();
    request.rate_limit_delay_secs = Some(-1.0);
    assert_eq!(
        configs.create(request).await.unwrap_err().kind(),
        ErrorKind::Validation
    );
}

#[tokio::test]
async fn test_update_changes_only_given_fields() {
    let harness = TestHarness::with_engine(ScriptedEngine::succeeding());
    let configs = use_case(&harness);
    let created = configs.create(shop_request()).await.unwrap();

    let updated = configs
        .update(
            "shop.example.com",
            UpdateWebsiteConfigRequest {
                requires_js: Some(true),
                default_method: Some(FetchMethod::Selenium),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.requires_js);
    assert_eq!(updated.default_method, FetchMethod::Selenium);
    assert_eq!(updated.default_selectors, created.default_selectors);
    assert_eq!(updated.rate_limit_delay_secs, Some(0.5));
    assert!(updated.updated_at >= created.updated_at);

    // The base url may move within the domain but not off it.
    let err = configs
        .update(
            "shop.example.com",
            UpdateWebsiteConfigRequest {
                base_url: Some("https://other.example.com/".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = configs
        .update("missing.example.com", UpdateWebsiteConfigRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn test_trial_run_extracts_with_site_selectors() {
    let engine = ScriptedEngine::succeeding();
    let harness = TestHarness::with_engine(engine.clone());
    let configs = use_case(&harness);
    configs.create(shop_request()).await.unwrap();

    let result = configs.test("shop.example.com").await.unwrap();
    assert!(result.success);
    assert_eq!(result.method, FetchMethod::Requests);
    assert_eq!(result.fields["price"], FieldValue::Value("19.99".to_string()));
    assert_eq!(result.status_code, Some(200));
    assert_eq!(engine.last_request().unwrap().url, "https://shop.example.com/catalog");

    // A trial run never creates jobs.
    let stats = harness.orchestrator.statistics().await.unwrap();
    assert_eq!(stats.total_jobs, 0);
}

#[tokio::test]
async fn test_trial_run_reports_failure_in_result() {
    let engine = ScriptedEngine::new(vec![Err(FetchError::HttpStatus { status: 403 })]);
    let harness = TestHarness::with_engine(engine);
    let configs = Arc::new(use_case(&harness));
    configs.create(shop_request()).await.unwrap();

    let result = configs.test("shop.example.com").await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error.map(|e| e.kind), Some(ErrorKind::HttpStatus));
    assert!(result.fields.is_empty());
}
