//! 线程仓储的 PostgreSQL 实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use domain::{
    ConversationId, InboxThread, OrderId, RepositoryResult, ThreadId, ThreadRepository,
};

use super::map_sqlx_err;

#[derive(Debug, FromRow)]
struct ThreadRecord {
    id: Uuid,
    tenant_id: String,
    conversation_id: Option<Uuid>,
    order_id: Option<Uuid>,
    metadata: Option<JsonValue>,
    dedupe_hint: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ThreadRecord> for InboxThread {
    fn from(value: ThreadRecord) -> Self {
        InboxThread {
            id: ThreadId::from(value.id),
            tenant_id: value.tenant_id,
            conversation_id: value.conversation_id.map(ConversationId::from),
            order_id: value.order_id.map(OrderId::from),
            metadata: value.metadata,
            dedupe_hint: value.dedupe_hint,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PgThreadRepository {
    pool: PgPool,
}

impl PgThreadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ThreadRepository for PgThreadRepository {
    async fn create(&self, thread: InboxThread) -> RepositoryResult<InboxThread> {
        let record = sqlx::query_as::<_, ThreadRecord>(
            r#"
            INSERT INTO inbox_threads
                (id, tenant_id, conversation_id, order_id, metadata, dedupe_hint, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, tenant_id, conversation_id, order_id, metadata, dedupe_hint, created_at, updated_at
            "#,
        )
        .bind(Uuid::from(thread.id))
        .bind(&thread.tenant_id)
        .bind(thread.conversation_id.map(Uuid::from))
        .bind(thread.order_id.map(Uuid::from))
        .bind(&thread.metadata)
        .bind(&thread.dedupe_hint)
        .bind(thread.created_at)
        .bind(thread.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(InboxThread::from(record))
    }

    async fn find_by_id(&self, id: ThreadId) -> RepositoryResult<Option<InboxThread>> {
        let record = sqlx::query_as::<_, ThreadRecord>(
            r#"
            SELECT id, tenant_id, conversation_id, order_id, metadata, dedupe_hint, created_at, updated_at
            FROM inbox_threads
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(InboxThread::from))
    }

    async fn find_by_context(
        &self,
        tenant_id: &str,
        conversation_id: Option<ConversationId>,
        order_id: Option<OrderId>,
    ) -> RepositoryResult<Option<InboxThread>> {
        let record = sqlx::query_as::<_, ThreadRecord>(
            r#"
            SELECT id, tenant_id, conversation_id, order_id, metadata, dedupe_hint, created_at, updated_at
            FROM inbox_threads
            WHERE tenant_id = $1
              AND conversation_id IS NOT DISTINCT FROM $2
              AND order_id IS NOT DISTINCT FROM $3
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(conversation_id.map(Uuid::from))
        .bind(order_id.map(Uuid::from))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(InboxThread::from))
    }
}
