// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::DomainError;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::domain::services::extraction_service::SelectorError;
use crate::domain::services::rate_limiting_service::CancelledError;
use crate::engines::traits::FetchError;
use crate::queue::job_queue::QueueError;
use crate::utils::validators::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 机器可区分的错误类别
///
/// 任务失败时随错误消息一同持久化，调用方据此判断失败原因而无需解析文本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    InvalidState,
    Network,
    Timeout,
    HttpStatus,
    Selector,
    Cancelled,
    RobotsDisallowed,
    Repository,
    Queue,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::HttpStatus => "http_status",
            ErrorKind::Selector => "selector",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::RobotsDisallowed => "robots_disallowed",
            ErrorKind::Repository => "repository",
            ErrorKind::Queue => "queue",
            ErrorKind::Internal => "internal",
        }
    }

    /// 是否为抓取阶段产生的错误类别
    pub fn is_fetch(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::HttpStatus
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 服务层错误类型
///
/// 编排器及其用例对外暴露的统一错误分类
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Blocked by robots.txt: {0}")]
    RobotsDisallowed(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// 返回错误对应的机器可区分类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::InvalidState(_) => ErrorKind::InvalidState,
            ServiceError::Fetch(e) => e.kind(),
            ServiceError::Selector(_) => ErrorKind::Selector,
            ServiceError::Cancelled => ErrorKind::Cancelled,
            ServiceError::RobotsDisallowed(_) => ErrorKind::RobotsDisallowed,
            ServiceError::Repository(RepositoryError::NotFound) => ErrorKind::NotFound,
            ServiceError::Repository(_) => ErrorKind::Repository,
            ServiceError::Queue(_) => ErrorKind::Queue,
            ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<CancelledError> for ServiceError {
    fn from(_: CancelledError) -> Self {
        ServiceError::Cancelled
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}
