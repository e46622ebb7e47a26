use std::time::Duration;

use application::ApplicationError;
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// 对外的错误表示
///
/// 响应体只携带稳定的错误码；内部细节（存储错误、堆栈）只进日志。
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    retry_after: Option<Duration>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str) -> Self {
        Self {
            status,
            code,
            retry_after: None,
        }
    }

    pub fn bad_request(code: &'static str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found")
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match &error {
            ApplicationError::Validation(message) => {
                tracing::debug!(message = %message, "请求校验失败");
                ApiError::bad_request("validation_error")
            }
            ApplicationError::RateLimited { retry_after } => ApiError {
                status: StatusCode::TOO_MANY_REQUESTS,
                code: "rate_limited",
                retry_after: Some(*retry_after),
            },
            ApplicationError::Forbidden(_) => ApiError::new(StatusCode::FORBIDDEN, "forbidden"),
            ApplicationError::NotFound(_) => ApiError::not_found(),
            ApplicationError::Encryption(message) => {
                tracing::error!(message = %message, "内容解密失败");
                ApiError::internal()
            }
            ApplicationError::Adapter { channel, message } => {
                tracing::error!(channel = %channel, message = %message, "通道分发失败");
                ApiError::internal()
            }
            ApplicationError::Repository(inner) => {
                tracing::error!(error = %inner, "仓储操作失败");
                ApiError::internal()
            }
            ApplicationError::Internal(message) => {
                tracing::error!(message = %message, "内部错误");
                ApiError::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(json!({ "error": self.code }))).into_response();
        if let Some(retry_after) = self.retry_after {
            let seconds = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}
