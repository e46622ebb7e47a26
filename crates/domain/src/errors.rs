//! 领域模型错误定义

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 输入验证错误
    #[error("validation failed: {field}: {message}")]
    Validation { field: String, message: String },

    /// 资源不存在
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    /// 会话成员校验失败
    #[error("not a participant of conversation {conversation_id}")]
    Forbidden { conversation_id: String },

    /// 业务规则违反
    #[error("business rule violated: {rule}")]
    BusinessRuleViolation { rule: String },
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    pub fn forbidden(conversation_id: impl std::fmt::Display) -> Self {
        Self::Forbidden {
            conversation_id: conversation_id.to_string(),
        }
    }

    pub fn business_rule_violation(rule: impl Into<String>) -> Self {
        Self::BusinessRuleViolation { rule: rule.into() }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 仓储层错误类型
///
/// `UniqueViolation` 是去重竞争的关键信号：两个并发写入相同 dedupe key 时，
/// 存储层唯一约束让第二个创建失败，管道据此改为重新读取已有条目。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("record not found")]
    NotFound,
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn unique_violation(constraint: impl Into<String>) -> Self {
        Self::UniqueViolation {
            constraint: constraint.into(),
        }
    }
}

/// 仓储层结果类型
pub type RepositoryResult<T> = Result<T, RepositoryError>;
