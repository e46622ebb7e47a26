//! 审计日志仓储的 PostgreSQL 实现

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use domain::{AuditLogRepository, AuditRecord, RepositoryResult};

use super::map_sqlx_err;

#[derive(Clone)]
pub struct PgAuditLogRepository {
    pool: PgPool,
}

impl PgAuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogRepository for PgAuditLogRepository {
    async fn create(&self, record: AuditRecord) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs
                (id, actor_address, actor_user_id, action, entity_type, entity_id, tenant_id, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.actor_address)
        .bind(record.actor_user_id.map(Uuid::from))
        .bind(&record.action)
        .bind(&record.entity_type)
        .bind(&record.entity_id)
        .bind(&record.tenant_id)
        .bind(&record.metadata)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }
}
