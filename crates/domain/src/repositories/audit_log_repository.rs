//! 审计日志Repository接口定义

use async_trait::async_trait;

use crate::audit::AuditRecord;
use crate::errors::RepositoryResult;

/// 审计日志Repository接口
///
/// 写入是 fire-and-forget 性质：调用方把失败视为非致命。
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn create(&self, record: AuditRecord) -> RepositoryResult<()>;
}
