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

use crate::utils::errors::ErrorKind;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

// Roughly thirty years, the same horizon tokio uses for its own far-future instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// 抓取错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// 连接失败等网络错误
    #[error("Network error: {0}")]
    Network(String),
    /// 超过截止时间
    #[error("Fetch timed out")]
    Timeout,
    /// 非 2xx 响应
    #[error("Unexpected HTTP status {status}")]
    HttpStatus { status: u16 },
    /// 请求本身无效，重试没有意义
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// 浏览器会话异常
    #[error("Browser error: {0}")]
    Browser(String),
}

impl FetchError {
    /// 判断错误是否可重试
    ///
    /// # 返回值
    ///
    /// 连接错误、超时、429 和 5xx 返回 true，其余返回 false
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout | FetchError::Browser(_) => true,
            FetchError::HttpStatus { status } => *status == 429 || (500..600).contains(status),
            FetchError::InvalidRequest(_) => false,
        }
    }

    /// 对应的错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Network(_) | FetchError::Browser(_) => ErrorKind::Network,
            FetchError::Timeout => ErrorKind::Timeout,
            FetchError::HttpStatus { .. } => ErrorKind::HttpStatus,
            FetchError::InvalidRequest(_) => ErrorKind::Validation,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus {
                status: status.as_u16(),
            }
        } else if err.is_redirect() {
            FetchError::InvalidRequest(format!("redirect limit exceeded: {}", err))
        } else if err.is_builder() {
            FetchError::InvalidRequest(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// 抓取请求
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    /// 目标URL
    pub url: String,
    /// 请求头，其中的 User-Agent 优先于其它来源
    pub headers: BTreeMap<String, String>,
    /// 超时时间
    pub timeout: Duration,
    /// 覆盖引擎默认的标识请求头
    pub user_agent: Option<String>,
    /// 浏览器策略等待出现的元素，未设置时使用固定等待
    pub wait_for_element: Option<String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            ..Default::default()
        }
    }

    /// 本次抓取的截止时刻，溢出时取一个足够远的时刻
    pub fn deadline(&self) -> tokio::time::Instant {
        let now = tokio::time::Instant::now();
        now.checked_add(self.timeout)
            .unwrap_or_else(|| now + FAR_FUTURE)
    }

    /// 实际生效的 User-Agent
    pub fn effective_user_agent<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
            .map(|(_, v)| v.as_str())
            .or(self.user_agent.as_deref())
            .unwrap_or(fallback)
    }
}

/// 一次抓取的结果，仅在内存中短暂存在
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    /// 原始 HTML/文本
    pub html: String,
    /// 重定向后的最终URL
    pub final_url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub elapsed: Duration,
}

/// 抓取引擎特质
///
/// 三种抓取策略共同满足的能力契约，编排器只依赖这个接口
#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// 执行抓取
    ///
    /// # 参数
    ///
    /// * `request` - 抓取请求
    ///
    /// # 返回值
    ///
    /// * `Ok(FetchResult)` - 抓取结果
    /// * `Err(FetchError)` - 抓取过程中出现的错误
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, FetchError>;

    /// 获取引擎名称
    fn name(&self) -> &'static str;
}
