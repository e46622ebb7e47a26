//! 会话仓储的 PostgreSQL 实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use domain::{
    Address, Conversation, ConversationId, ConversationKind, ConversationRepository, OrderId,
    RepositoryError, RepositoryResult, UserId,
};

use super::{invalid_data, map_sqlx_err};

const CONVERSATION_COLUMNS: &str = r#"
    id, tenant_id, kind, order_id, owner_user_id, metadata, last_message_at, created_at, updated_at
"#;

#[derive(Debug, FromRow)]
struct ConversationRecord {
    id: Uuid,
    tenant_id: String,
    kind: String,
    order_id: Option<Uuid>,
    owner_user_id: Option<Uuid>,
    metadata: Option<JsonValue>,
    last_message_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_kind(value: &str) -> RepositoryResult<ConversationKind> {
    match value {
        "favorites" => Ok(ConversationKind::Favorites),
        "order" => Ok(ConversationKind::Order),
        "other" => Ok(ConversationKind::Other),
        other => Err(invalid_data(format!("unknown conversation kind: {other}"))),
    }
}

impl TryFrom<ConversationRecord> for Conversation {
    type Error = RepositoryError;

    fn try_from(value: ConversationRecord) -> Result<Self, Self::Error> {
        Ok(Conversation {
            id: ConversationId::from(value.id),
            tenant_id: value.tenant_id,
            kind: parse_kind(&value.kind)?,
            order_id: value.order_id.map(OrderId::from),
            owner_user_id: value.owner_user_id.map(UserId::from),
            metadata: value.metadata,
            last_message_at: value.last_message_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn create(&self, conversation: Conversation) -> RepositoryResult<Conversation> {
        let sql = format!(
            r#"
            INSERT INTO conversations ({CONVERSATION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {CONVERSATION_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, ConversationRecord>(&sql)
            .bind(Uuid::from(conversation.id))
            .bind(&conversation.tenant_id)
            .bind(conversation.kind.as_str())
            .bind(conversation.order_id.map(Uuid::from))
            .bind(conversation.owner_user_id.map(Uuid::from))
            .bind(&conversation.metadata)
            .bind(conversation.last_message_at)
            .bind(conversation.created_at)
            .bind(conversation.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Conversation::try_from(record)
    }

    async fn update(&self, conversation: Conversation) -> RepositoryResult<Conversation> {
        let sql = format!(
            r#"
            UPDATE conversations
            SET metadata = $2,
                last_message_at = $3,
                updated_at = $4
            WHERE id = $1
            RETURNING {CONVERSATION_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, ConversationRecord>(&sql)
            .bind(Uuid::from(conversation.id))
            .bind(&conversation.metadata)
            .bind(conversation.last_message_at)
            .bind(conversation.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Conversation::try_from(record)
    }

    async fn find_by_id(&self, id: ConversationId) -> RepositoryResult<Option<Conversation>> {
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1");
        let record = sqlx::query_as::<_, ConversationRecord>(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        record.map(Conversation::try_from).transpose()
    }

    async fn find_by_order(&self, order_id: OrderId) -> RepositoryResult<Option<Conversation>> {
        let sql = format!(
            r#"
            SELECT {CONVERSATION_COLUMNS} FROM conversations
            WHERE order_id = $1
            ORDER BY created_at ASC
            LIMIT 1
            "#
        );
        let record = sqlx::query_as::<_, ConversationRecord>(&sql)
            .bind(Uuid::from(order_id))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        record.map(Conversation::try_from).transpose()
    }

    async fn find_favorites_by_address(
        &self,
        address: &Address,
    ) -> RepositoryResult<Option<Conversation>> {
        let sql = format!(
            r#"
            SELECT {columns} FROM conversations c
            WHERE c.kind = 'favorites'
              AND EXISTS (
                SELECT 1 FROM conversation_participants p
                WHERE p.conversation_id = c.id AND p.address = $1
              )
            ORDER BY c.created_at ASC
            LIMIT 1
            "#,
            columns = "c.id, c.tenant_id, c.kind, c.order_id, c.owner_user_id, c.metadata, c.last_message_at, c.created_at, c.updated_at"
        );
        let record = sqlx::query_as::<_, ConversationRecord>(&sql)
            .bind(address.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        record.map(Conversation::try_from).transpose()
    }
}
