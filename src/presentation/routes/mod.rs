// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::presentation::handlers::{config_handler, job_handler, utility_handler};
use crate::presentation::state::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

/// 创建应用路由
///
/// # 参数
///
/// * `state` - 处理器共享的用例
///
/// # 返回值
///
/// 返回配置好的路由，业务接口位于 `/api/v1` 下
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/jobs",
            post(job_handler::create_job).get(job_handler::list_jobs),
        )
        .route("/jobs/stats", get(job_handler::job_statistics))
        .route("/jobs/bulk", post(job_handler::create_jobs))
        .route(
            "/jobs/{id}",
            get(job_handler::get_job).delete(job_handler::delete_job),
        )
        .route("/jobs/{id}/execute", post(job_handler::execute_job))
        .route("/jobs/{id}/cancel", post(job_handler::cancel_job))
        .route("/jobs/{id}/records", get(job_handler::job_records))
        .route(
            "/configs",
            post(config_handler::create_config).get(config_handler::list_configs),
        )
        .route(
            "/configs/{domain}",
            get(config_handler::get_config).put(config_handler::update_config),
        )
        .route("/configs/{domain}/test", post(config_handler::test_config))
        .route("/utils/validate-url", post(utility_handler::validate_url))
        .route("/utils/extract-links", post(utility_handler::extract_links))
        .route("/utils/extract-images", post(utility_handler::extract_images))
        .route("/utils/quick-scrape", post(utility_handler::quick_scrape))
        .route("/utils/methods", get(utility_handler::supported_methods));

    Router::new()
        .route("/health", get(health_check))
        .route("/version", get(version))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 健康检查端点
///
/// # 返回值
///
/// 返回服务状态和当前执行中的任务数
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "active_jobs": state.orchestrator.active_jobs(),
    }))
}

/// 版本信息端点
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
