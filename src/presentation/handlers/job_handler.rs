// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::dto::job_request::{
    BulkCreateJobsRequest, CreateJobRequest, ExecuteJobQuery, ExecutionMode, JobListQuery,
    RecordsQuery,
};
use crate::application::dto::job_response::{BulkCreateResponse, JobResult};
use crate::domain::models::job::Job;
use crate::domain::repositories::job_repository::{JobStatistics, Page};
use crate::presentation::errors::AppError;
use crate::presentation::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

/// 创建任务
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<Job>), AppError> {
    let job = state.orchestrator.create_job(request).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// 批量创建任务
pub async fn create_jobs(
    State(state): State<AppState>,
    Json(request): Json<BulkCreateJobsRequest>,
) -> Json<BulkCreateResponse> {
    Json(state.orchestrator.create_jobs(request.jobs).await)
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<Page<Job>>, AppError> {
    Ok(Json(state.orchestrator.list_jobs(query).await?))
}

pub async fn job_statistics(State(state): State<AppState>) -> Result<Json<JobStatistics>, AppError> {
    Ok(Json(state.orchestrator.statistics().await?))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, AppError> {
    Ok(Json(state.orchestrator.get_job(id).await?))
}

pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.orchestrator.delete_job(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 执行任务
///
/// 同步模式返回 200，异步模式返回 202
pub async fn execute_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ExecuteJobQuery>,
) -> Result<(StatusCode, Json<JobResult>), AppError> {
    let result = state.orchestrator.execute_job(id, query.mode).await?;
    let status = match query.mode {
        ExecutionMode::Sync => StatusCode::OK,
        ExecutionMode::Async => StatusCode::ACCEPTED,
    };
    Ok((status, Json(result)))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, AppError> {
    Ok(Json(state.orchestrator.cancel_job(id).await?))
}

/// 获取任务记录，`format=csv` 时导出为扁平表格
pub async fn job_records(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RecordsQuery>,
) -> Result<Response, AppError> {
    let (content_type, body) = state.orchestrator.export_records(id, query.format).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}
