// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{Job, JobError, JobStatus};
use serde::Serialize;
use uuid::Uuid;

/// 执行任务的结果摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub record_count: u32,
    pub retry_count: u32,
    /// 从开始执行到返回的耗时
    pub elapsed_ms: u64,
    pub error: Option<JobError>,
}

impl JobResult {
    pub fn from_job(job: &Job, elapsed_ms: u64) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            record_count: job.record_count,
            retry_count: job.retry_count,
            elapsed_ms,
            error: job.last_error.clone(),
        }
    }
}

/// 批量创建中单个条目的结果
#[derive(Debug, Clone, Serialize)]
pub struct BulkCreateItem {
    pub url: String,
    pub job: Option<Job>,
    pub error: Option<String>,
}

/// 批量创建结果
#[derive(Debug, Clone, Serialize)]
pub struct BulkCreateResponse {
    pub created: usize,
    pub failed: usize,
    pub items: Vec<BulkCreateItem>,
}

impl BulkCreateResponse {
    pub fn new(items: Vec<BulkCreateItem>) -> Self {
        let created = items.iter().filter(|i| i.job.is_some()).count();
        Self {
            created,
            failed: items.len() - created,
            items,
        }
    }
}
