// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::{ErrorKind, ServiceError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// 应用错误类型
///
/// 把服务层错误按类别映射为 HTTP 状态码
#[derive(Debug)]
pub struct AppError(ServiceError);

impl AppError {
    pub fn status(&self) -> StatusCode {
        status_for(self.0.kind())
    }
}

/// 错误类别对应的 HTTP 状态码
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState | ErrorKind::Cancelled => StatusCode::CONFLICT,
        kind if kind.is_fetch() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.0.kind();
        let error_message = self.0.to_string();

        if status.is_server_error() {
            error!(%kind, "Request failed: {}", error_message);
        }

        let body = Json(json!({ "error": error_message, "kind": kind }));
        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<ServiceError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
