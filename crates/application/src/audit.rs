//! 审计日志写入器
//!
//! 审计落库是 fire-and-forget：外部审计槽故障绝不中断投递。

use std::sync::Arc;

use domain::{AuditLogRepository, AuditRecord};

/// 审计日志写入器
#[derive(Clone)]
pub struct AuditLogger {
    repository: Arc<dyn AuditLogRepository>,
}

impl AuditLogger {
    pub fn new(repository: Arc<dyn AuditLogRepository>) -> Self {
        Self { repository }
    }

    /// 写入一条审计记录；失败只记录告警
    pub async fn record(&self, record: AuditRecord) {
        let action = record.action.clone();
        if let Err(error) = self.repository.create(record).await {
            tracing::warn!(action = %action, error = %error, "审计日志写入失败，忽略");
        }
    }
}
