// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{Job, JobStatus};
use crate::domain::models::scraped_record::ScrapedRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
    /// 唯一键冲突
    #[error("Record already exists: {0}")]
    AlreadyExists(String),
    /// 存储内容无法解析
    #[error("Corrupted record: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

/// 任务查询条件
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct JobFilter {
    pub statuses: Option<Vec<JobStatus>>,
    /// 精确匹配的小写主机名
    pub domain: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl JobFilter {
    /// 内存实现和测试共用的匹配逻辑
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&job.status) {
                return false;
            }
        }
        if let Some(domain) = &self.domain {
            if job.domain().as_deref() != Some(domain.as_str()) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if job.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if job.created_at > before {
                return false;
            }
        }
        true
    }
}

/// 分页参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u64,
    pub offset: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// 分页结果
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

/// 任务统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatistics {
    pub total_jobs: u64,
    pub status_counts: BTreeMap<String, u64>,
    pub method_counts: BTreeMap<String, u64>,
    /// 统计起点之后创建的任务数
    pub recent_jobs: u64,
    pub total_records: u64,
}

/// 任务仓库特质
///
/// 定义任务数据访问接口，`save` 为幂等写入
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 写入或覆盖任务
    async fn save(&self, job: &Job) -> Result<(), RepositoryError>;
    /// 在同一事务中写入任务和它的记录
    async fn save_with_records(
        &self,
        job: &Job,
        records: &[ScrapedRecord],
    ) -> Result<(), RepositoryError>;
    /// 根据ID加载任务
    async fn load(&self, id: Uuid) -> Result<Option<Job>, RepositoryError>;
    /// 条件查询任务，按创建时间倒序
    async fn list(&self, filter: &JobFilter, page: Pagination) -> Result<Page<Job>, RepositoryError>;
    /// 统计任务，`since` 之后创建的计入 recent_jobs
    async fn statistics(&self, since: DateTime<Utc>) -> Result<JobStatistics, RepositoryError>;
    /// 删除任务及其记录
    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError>;
    /// 查找在 `before` 之前启动且仍处于 Running 的任务
    async fn find_stale_running(&self, before: DateTime<Utc>) -> Result<Vec<Job>, RepositoryError>;
    /// 删除在 `before` 之前结束的终态任务及其记录
    async fn delete_finished_before(&self, before: DateTime<Utc>) -> Result<u64, RepositoryError>;
}
