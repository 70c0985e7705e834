// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{ScriptedEngine, TestHarness};
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use harvestrs::presentation::routes::build_router;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> (TestHarness, Router) {
    let harness = TestHarness::with_engine(ScriptedEngine::succeeding());
    let router = build_router(harness.app_state());
    (harness, router)
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, String, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, bytes.to_vec())
}

async fn send_json(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, _, bytes) = send(router, method, uri, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_reports_active_jobs() {
    let (_harness, router) = app();
    let (status, body) = send_json(&router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_jobs"], 0);
}

#[tokio::test]
async fn test_job_lifecycle_over_http() {
    let (_harness, router) = app();

    let (status, job) = send_json(
        &router,
        Method::POST,
        "/api/v1/jobs",
        Some(json!({
            "url": "https://shop.example.com/widget",
            "selectors": { "price": ".price" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["status"], "pending");
    let id = job["id"].as_str().unwrap().to_string();

    let (status, result) = send_json(
        &router,
        Method::POST,
        &format!("/api/v1/jobs/{}/execute?mode=sync", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["status"], "succeeded");
    assert_eq!(result["record_count"], 1);

    let (status, records) =
        send_json(&router, Method::GET, &format!("/api/v1/jobs/{}/records", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(records[0]["fields"]["price"]["value"], "19.99");

    let (status, content_type, body) = send(
        &router,
        Method::GET,
        &format!("/api/v1/jobs/{}/records?format=csv", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/csv"));
    assert!(String::from_utf8(body).unwrap().contains("19.99"));

    // Running a finished job again is a conflict.
    let (status, error) = send_json(
        &router,
        Method::POST,
        &format!("/api/v1/jobs/{}/execute", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["kind"], "invalid_state");

    let (status, _) = send_json(&router, Method::DELETE, &format!("/api/v1/jobs/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, error) = send_json(&router, Method::GET, &format!("/api/v1/jobs/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["kind"], "not_found");
}

#[tokio::test]
async fn test_async_execute_is_accepted() {
    let (harness, router) = app();
    let (_, job) = send_json(
        &router,
        Method::POST,
        "/api/v1/jobs",
        Some(json!({ "url": "https://example.com/" })),
    )
    .await;
    let id = job["id"].as_str().unwrap();

    let (status, result) = send_json(
        &router,
        Method::POST,
        &format!("/api/v1/jobs/{}/execute?mode=async", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(result["status"], "pending");

    let (status, cancelled) = send_json(
        &router,
        Method::POST,
        &format!("/api/v1/jobs/{}/cancel", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    // The queued id is rejected once a worker picks it up.
    let id = id.parse().unwrap();
    assert!(harness.orchestrator.run_job(id).await.is_err());
}

#[tokio::test]
async fn test_invalid_job_is_bad_request() {
    let (_harness, router) = app();
    let (status, error) = send_json(
        &router,
        Method::POST,
        "/api/v1/jobs",
        Some(json!({ "url": "file:///etc/passwd" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["kind"], "validation");
}

#[tokio::test]
async fn test_bulk_create_and_list() {
    let (_harness, router) = app();
    let (status, response) = send_json(
        &router,
        Method::POST,
        "/api/v1/jobs/bulk",
        Some(json!({
            "jobs": [
                { "url": "https://a.example.com/" },
                { "url": "nope" },
                { "url": "https://b.example.com/" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["created"], 2);
    assert_eq!(response["failed"], 1);

    let (status, page) = send_json(
        &router,
        Method::GET,
        "/api/v1/jobs?status=pending&domain=a.example.com",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);

    let (status, _) = send_json(&router, Method::GET, "/api/v1/jobs?status=done", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, stats) = send_json(&router, Method::GET, "/api/v1/jobs/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_jobs"], 2);
}

#[tokio::test]
async fn test_config_endpoints() {
    let (_harness, router) = app();
    let request = json!({
        "name": "Shop",
        "base_url": "https://shop.example.com/",
        "default_selectors": { "price": ".price" }
    });

    let (status, config) =
        send_json(&router, Method::POST, "/api/v1/configs", Some(request.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(config["domain"], "shop.example.com");

    let (status, _) = send_json(&router, Method::POST, "/api/v1/configs", Some(request)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, config) = send_json(
        &router,
        Method::PUT,
        "/api/v1/configs/shop.example.com",
        Some(json!({ "requires_js": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["requires_js"], true);

    let (status, result) = send_json(
        &router,
        Method::POST,
        "/api/v1/configs/shop.example.com/test",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // Only the plain engine is registered, so the browser run fails inside the result.
    assert_eq!(result["success"], false);

    let (status, list) = send_json(&router, Method::GET, "/api/v1/configs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().map(Vec::len), Some(1));

    let (status, _) = send_json(&router, Method::GET, "/api/v1/configs/unknown.example.com", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_utility_endpoints() {
    let (_harness, router) = app();

    let (status, methods) = send_json(&router, Method::GET, "/api/v1/utils/methods", None).await;
    assert_eq!(status, StatusCode::OK);
    let methods = methods.as_array().unwrap();
    assert_eq!(methods.len(), 3);
    let requests = methods.iter().find(|m| m["method"] == "requests").unwrap();
    assert_eq!(requests["available"], true);
    assert_eq!(requests["browser"], false);

    let (status, links) = send_json(
        &router,
        Method::POST,
        "/api/v1/utils/extract-links",
        Some(json!({ "url": "https://shop.example.com/widget" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(links["links"][0], "https://shop.example.com/about");

    let (status, images) = send_json(
        &router,
        Method::POST,
        "/api/v1/utils/extract-images",
        Some(json!({ "url": "https://shop.example.com/widget" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(images["images"][0], "https://shop.example.com/widget.png");

    let (status, scraped) = send_json(
        &router,
        Method::POST,
        "/api/v1/utils/quick-scrape",
        Some(json!({
            "url": "https://shop.example.com/widget",
            "selectors": { "name": "h1.name" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scraped["fields"]["name"]["value"], "Widget");
    assert_eq!(scraped["method"], "requests");

    let (status, validation) = send_json(
        &router,
        Method::POST,
        "/api/v1/utils/validate-url",
        Some(json!({ "url": "gopher://example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(validation["is_valid"], false);
    assert!(validation["error"].is_string());
}
