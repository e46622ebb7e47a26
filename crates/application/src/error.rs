use std::time::Duration;

use domain::{DomainError, RepositoryError};
use thiserror::Error;

/// 应用层错误类型
///
/// 校验和访问错误在边界解决，永远不触达持久层；
/// 去重竞争在本地解析，不作为错误暴露给调用方。
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("rate limited")]
    RateLimited { retry_after: Duration },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("adapter dispatch failed for channel {channel}: {message}")]
    Adapter {
        channel: &'static str,
        message: String,
    },

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<DomainError> for ApplicationError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation { field, message } => {
                ApplicationError::Validation(format!("{field}: {message}"))
            }
            DomainError::NotFound { resource, id } => {
                ApplicationError::NotFound(format!("{resource} {id}"))
            }
            DomainError::Forbidden { conversation_id } => {
                ApplicationError::Forbidden(conversation_id)
            }
            DomainError::BusinessRuleViolation { rule } => ApplicationError::Internal(rule),
        }
    }
}

/// 应用层结果类型
pub type ApplicationResult<T> = Result<T, ApplicationError>;
