// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 字段名到选择器表达式的映射
pub type SelectorMap = BTreeMap<String, String>;

/// 请求头名到值的映射
pub type HeaderMap = BTreeMap<String, String>;

/// 抓取方式
///
/// 对应三种可互换的抓取策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchMethod {
    /// 轻量 HTTP 抓取
    #[default]
    Requests,
    /// 基于 WebDriver 协议的浏览器抓取
    Selenium,
    /// 基于 CDP 协议的浏览器抓取
    Playwright,
}

impl FetchMethod {
    pub const ALL: [FetchMethod; 3] = [
        FetchMethod::Requests,
        FetchMethod::Selenium,
        FetchMethod::Playwright,
    ];

    /// 是否为浏览器渲染策略
    pub fn is_browser(&self) -> bool {
        !matches!(self, FetchMethod::Requests)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMethod::Requests => "requests",
            FetchMethod::Selenium => "selenium",
            FetchMethod::Playwright => "playwright",
        }
    }
}

impl fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "requests" => Ok(FetchMethod::Requests),
            "selenium" => Ok(FetchMethod::Selenium),
            "playwright" => Ok(FetchMethod::Playwright),
            other => Err(DomainError::ValidationError(format!(
                "unsupported method '{}'",
                other
            ))),
        }
    }
}

/// 任务状态
///
/// 状态转换遵循以下流程：
/// Pending → Running → Succeeded/Failed/Cancelled
/// 仅对账流程可以将滞留的 Running 显式退回 Pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 已创建，尚未执行
    #[default]
    Pending,
    /// 执行中
    Running,
    /// 执行成功
    Succeeded,
    /// 重试耗尽或不可重试的失败
    Failed,
    /// 被取消
    Cancelled,
}

impl JobStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(()),
        }
    }
}

/// 任务上记录的错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    /// 机器可区分的错误类别
    pub kind: ErrorKind,
    /// 人类可读的错误描述
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// 领域错误类型
///
/// 表示在领域层可能发生的状态转换错误和验证失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 无效的状态转换，当任务状态转换不符合业务规则时发生
    #[error("cannot {action} a job in state '{from}'")]
    InvalidStateTransition { from: JobStatus, action: &'static str },

    /// 验证错误，当输入数据不符合领域规则时发生
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// 抓取任务
///
/// 由编排器独占修改，所有状态变化都经由下面的转换方法
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// 目标URL
    pub url: String,
    /// 显式指定的抓取方式
    pub method: Option<FetchMethod>,
    /// 显式指定的选择器，`None` 表示沿用站点配置
    pub selectors: Option<SelectorMap>,
    /// 显式指定的请求头，`None` 表示沿用站点配置
    pub headers: Option<HeaderMap>,
    /// 超时时间（秒）
    pub timeout_secs: Option<u64>,
    /// 终态通知地址
    pub webhook_url: Option<String>,
    pub status: JobStatus,
    /// 实际执行使用的抓取方式
    pub executed_method: Option<FetchMethod>,
    /// 已发生的重试次数
    pub retry_count: u32,
    /// 最近一次重试前的退避时间（毫秒）
    pub last_backoff_ms: Option<u64>,
    pub last_error: Option<JobError>,
    /// 成功时产生的记录数
    pub record_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// 创建一个新的待执行任务
    ///
    /// # 参数
    ///
    /// * `url` - 已校验的目标URL
    ///
    /// # 返回值
    ///
    /// 返回处于 Pending 状态的任务
    pub fn new(url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            method: None,
            selectors: None,
            headers: None,
            timeout_secs: None,
            webhook_url: None,
            status: JobStatus::Pending,
            executed_method: None,
            retry_count: 0,
            last_backoff_ms: None,
            last_error: None,
            record_count: 0,
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 目标URL的主机名（小写）
    pub fn domain(&self) -> Option<String> {
        crate::utils::validators::host_of(&self.url)
    }

    fn invalid(&self, action: &'static str) -> DomainError {
        DomainError::InvalidStateTransition {
            from: self.status,
            action,
        }
    }

    /// 启动任务
    ///
    /// 将任务状态从 Pending 变更为 Running
    pub fn start(mut self, method: FetchMethod) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Pending => {
                let now = Utc::now();
                self.status = JobStatus::Running;
                self.executed_method = Some(method);
                self.started_at = Some(now);
                self.updated_at = now;
                Ok(self)
            }
            _ => Err(self.invalid("start")),
        }
    }

    /// 记录一次暂时性失败后的重试
    ///
    /// 任务保持 Running 状态，仅更新重试计数和退避时间
    pub fn record_retry(mut self, backoff_ms: u64, error: JobError) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Running => {
                self.retry_count += 1;
                self.last_backoff_ms = Some(backoff_ms);
                self.last_error = Some(error);
                self.updated_at = Utc::now();
                Ok(self)
            }
            _ => Err(self.invalid("retry")),
        }
    }

    /// 完成任务
    ///
    /// 将任务状态从 Running 变更为 Succeeded
    pub fn succeed(mut self, record_count: u32) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Running => {
                let now = Utc::now();
                self.status = JobStatus::Succeeded;
                self.record_count = record_count;
                self.finished_at = Some(now);
                self.updated_at = now;
                Ok(self)
            }
            _ => Err(self.invalid("complete")),
        }
    }

    /// 标记任务失败
    ///
    /// 将任务状态从 Running 变更为 Failed
    pub fn fail(mut self, error: JobError) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Running => {
                let now = Utc::now();
                self.status = JobStatus::Failed;
                self.last_error = Some(error);
                self.finished_at = Some(now);
                self.updated_at = now;
                Ok(self)
            }
            _ => Err(self.invalid("fail")),
        }
    }

    /// 取消任务
    ///
    /// Pending 或 Running 状态的任务可以取消
    pub fn cancel(mut self) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Pending | JobStatus::Running => {
                let now = Utc::now();
                self.status = JobStatus::Cancelled;
                self.finished_at = Some(now);
                self.updated_at = now;
                Ok(self)
            }
            _ => Err(self.invalid("cancel")),
        }
    }

    /// 将滞留的 Running 任务显式退回 Pending 以便重新执行
    pub fn requeue(mut self) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Running => {
                self.status = JobStatus::Pending;
                self.retry_count += 1;
                self.started_at = None;
                self.executed_method = None;
                self.updated_at = Utc::now();
                Ok(self)
            }
            _ => Err(self.invalid("requeue")),
        }
    }
}
