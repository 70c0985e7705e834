// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::dto::config_request::{
    ConfigTestResult, CreateWebsiteConfigRequest, UpdateWebsiteConfigRequest,
};
use crate::domain::models::website_config::WebsiteConfig;
use crate::presentation::errors::AppError;
use crate::presentation::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

pub async fn create_config(
    State(state): State<AppState>,
    Json(request): Json<CreateWebsiteConfigRequest>,
) -> Result<(StatusCode, Json<WebsiteConfig>), AppError> {
    let config = state.configs.create(request).await?;
    Ok((StatusCode::CREATED, Json(config)))
}

pub async fn list_configs(State(state): State<AppState>) -> Result<Json<Vec<WebsiteConfig>>, AppError> {
    Ok(Json(state.configs.list().await?))
}

pub async fn get_config(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<WebsiteConfig>, AppError> {
    Ok(Json(state.configs.get(&domain).await?))
}

pub async fn update_config(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Json(request): Json<UpdateWebsiteConfigRequest>,
) -> Result<Json<WebsiteConfig>, AppError> {
    Ok(Json(state.configs.update(&domain, request).await?))
}

/// 用配置抓取站点基础URL，抓取失败也返回 200 和失败原因
pub async fn test_config(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<ConfigTestResult>, AppError> {
    Ok(Json(state.configs.test(&domain).await?))
}
