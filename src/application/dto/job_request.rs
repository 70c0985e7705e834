// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::job::{FetchMethod, HeaderMap, JobStatus, SelectorMap};
use crate::domain::repositories::job_repository::{JobFilter, Pagination};
use crate::utils::validators::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_PAGE_SIZE: u64 = 500;

/// 创建任务请求
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CreateJobRequest {
    /// 目标URL
    pub url: String,
    /// 抓取方式，未指定时由站点配置决定
    pub method: Option<FetchMethod>,
    /// 字段名到选择器的映射
    pub selectors: Option<SelectorMap>,
    /// 请求头覆盖
    pub headers: Option<HeaderMap>,
    /// 超时时间（秒）
    pub timeout_secs: Option<u64>,
    /// 任务结束后的回调地址
    pub webhook_url: Option<String>,
}

impl CreateJobRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// 批量创建任务请求
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BulkCreateJobsRequest {
    pub jobs: Vec<CreateJobRequest>,
}

/// 执行方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// 阻塞到终态或超时
    #[default]
    Sync,
    /// 投递到后台队列后立即返回
    Async,
}

/// 执行任务的查询参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteJobQuery {
    #[serde(default)]
    pub mode: ExecutionMode,
}

/// 任务列表查询参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListQuery {
    /// 逗号分隔的状态列表
    pub status: Option<String>,
    pub domain: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl JobListQuery {
    /// 转换为仓库查询条件
    ///
    /// # 返回值
    ///
    /// * `Ok((JobFilter, Pagination))` - 查询条件和分页参数
    /// * `Err(ValidationError)` - 状态名无效或时间范围颠倒
    pub fn into_filter(self) -> Result<(JobFilter, Pagination), ValidationError> {
        let statuses = match self.status.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                let parsed = raw
                    .split(',')
                    .map(|s| {
                        s.trim().parse::<JobStatus>().map_err(|_| {
                            ValidationError::InvalidInput(format!("unknown status '{}'", s.trim()))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Some(parsed)
            }
            _ => None,
        };

        if let (Some(after), Some(before)) = (self.created_after, self.created_before) {
            if after > before {
                return Err(ValidationError::InvalidInput(
                    "created_after must not be later than created_before".to_string(),
                ));
            }
        }

        let defaults = Pagination::default();
        let pagination = Pagination {
            limit: self.limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE_SIZE),
            offset: self.offset.unwrap_or(0),
        };

        let filter = JobFilter {
            statuses,
            domain: self.domain.map(|d| d.trim().to_ascii_lowercase()),
            created_after: self.created_after,
            created_before: self.created_before,
        };

        Ok((filter, pagination))
    }
}

/// 记录导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

/// 记录查询参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordsQuery {
    #[serde(default)]
    pub format: ExportFormat,
}
