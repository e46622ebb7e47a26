//! PostgreSQL 仓储实现集合

pub mod audit_log_repository_impl;
pub mod conversation_repository_impl;
pub mod item_repository_impl;
pub mod participant_repository_impl;
pub mod thread_repository_impl;

pub use audit_log_repository_impl::PgAuditLogRepository;
pub use conversation_repository_impl::PgConversationRepository;
pub use item_repository_impl::PgItemRepository;
pub use participant_repository_impl::PgParticipantRepository;
pub use thread_repository_impl::PgThreadRepository;

use domain::RepositoryError;

/// 把 sqlx 错误翻译为仓储错误；23505 是唯一约束冲突
pub(crate) fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return RepositoryError::unique_violation(
                db_err.constraint().unwrap_or("unique").to_string(),
            );
        }
    }
    RepositoryError::storage(err.to_string())
}

pub(crate) fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}
