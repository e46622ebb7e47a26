//! 条目仓储的 PostgreSQL 实现
//!
//! dedupe_key 上的唯一索引是幂等投递的最终防线：并发的重复创建
//! 由数据库裁决，这里只负责把 23505 翻译成 `UniqueViolation`。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use domain::{
    Address, Channel, Content, ConversationId, DeliveryStatus, EncryptedEnvelope, Importance,
    InboxItem, ItemId, ItemRepository, ItemType, Meta, OrderId, PiiClass, RepositoryError,
    RepositoryResult, ThreadId, UserId,
};

use super::{invalid_data, map_sqlx_err};

const ITEM_COLUMNS: &str = r#"
    id, tenant_id, thread_id, conversation_id, order_id, user_id, address,
    item_type, importance, channel, lang, content, encrypted_content, meta,
    classification, pii_class, status, dedupe_key, retry_count,
    next_attempt_at, delivered_at, read_at, read_by, expires_at, created_at, updated_at
"#;

#[derive(Debug, FromRow)]
struct ItemRecord {
    id: Uuid,
    tenant_id: String,
    thread_id: Uuid,
    conversation_id: Option<Uuid>,
    order_id: Option<Uuid>,
    user_id: Option<Uuid>,
    address: Option<String>,
    item_type: String,
    importance: String,
    channel: String,
    lang: String,
    content: JsonValue,
    encrypted_content: Option<JsonValue>,
    meta: Option<JsonValue>,
    classification: Vec<String>,
    pii_class: String,
    status: String,
    dedupe_key: String,
    retry_count: i32,
    next_attempt_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    read_at: Option<DateTime<Utc>>,
    read_by: Vec<String>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_item_type(value: &str) -> RepositoryResult<ItemType> {
    match value {
        "message" => Ok(ItemType::Message),
        "system" => Ok(ItemType::System),
        "reminder" => Ok(ItemType::Reminder),
        "alert" => Ok(ItemType::Alert),
        other => Err(invalid_data(format!("unknown item type: {other}"))),
    }
}

fn parse_importance(value: &str) -> RepositoryResult<Importance> {
    match value {
        "low" => Ok(Importance::Low),
        "normal" => Ok(Importance::Normal),
        "high" => Ok(Importance::High),
        "critical" => Ok(Importance::Critical),
        other => Err(invalid_data(format!("unknown importance: {other}"))),
    }
}

fn parse_channel(value: &str) -> RepositoryResult<Channel> {
    match value {
        "chat" => Ok(Channel::Chat),
        "toast" => Ok(Channel::Toast),
        "email" => Ok(Channel::Email),
        "push" => Ok(Channel::Push),
        "log" => Ok(Channel::Log),
        other => Err(invalid_data(format!("unknown channel: {other}"))),
    }
}

fn parse_status(value: &str) -> RepositoryResult<DeliveryStatus> {
    match value {
        "pending" => Ok(DeliveryStatus::Pending),
        "delivering" => Ok(DeliveryStatus::Delivering),
        "delivered" => Ok(DeliveryStatus::Delivered),
        "failed" => Ok(DeliveryStatus::Failed),
        other => Err(invalid_data(format!("unknown delivery status: {other}"))),
    }
}

fn parse_pii_class(value: &str) -> RepositoryResult<PiiClass> {
    match value {
        "none" => Ok(PiiClass::None),
        "personal" => Ok(PiiClass::Personal),
        "sensitive" => Ok(PiiClass::Sensitive),
        other => Err(invalid_data(format!("unknown pii class: {other}"))),
    }
}

impl TryFrom<ItemRecord> for InboxItem {
    type Error = RepositoryError;

    fn try_from(value: ItemRecord) -> Result<Self, Self::Error> {
        let content: Content = serde_json::from_value(value.content)
            .map_err(|err| invalid_data(err.to_string()))?;
        let encrypted_content: Option<EncryptedEnvelope> = value
            .encrypted_content
            .map(serde_json::from_value)
            .transpose()
            .map_err(|err| invalid_data(err.to_string()))?;
        let meta: Option<Meta> = value
            .meta
            .map(serde_json::from_value)
            .transpose()
            .map_err(|err| invalid_data(err.to_string()))?;
        let address = value
            .address
            .map(Address::parse)
            .transpose()
            .map_err(|err| invalid_data(err.to_string()))?;

        Ok(InboxItem {
            id: ItemId::from(value.id),
            tenant_id: value.tenant_id,
            thread_id: ThreadId::from(value.thread_id),
            conversation_id: value.conversation_id.map(ConversationId::from),
            order_id: value.order_id.map(OrderId::from),
            user_id: value.user_id.map(UserId::from),
            address,
            item_type: parse_item_type(&value.item_type)?,
            importance: parse_importance(&value.importance)?,
            channel: parse_channel(&value.channel)?,
            lang: value.lang,
            content,
            encrypted_content,
            meta,
            classification: value.classification,
            pii_class: parse_pii_class(&value.pii_class)?,
            status: parse_status(&value.status)?,
            dedupe_key: value.dedupe_key,
            retry_count: value.retry_count.max(0) as u32,
            next_attempt_at: value.next_attempt_at,
            delivered_at: value.delivered_at,
            read_at: value.read_at,
            read_by: value.read_by,
            expires_at: value.expires_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgItemRepository {
    pool: PgPool,
}

impl PgItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn content_json(item: &InboxItem) -> RepositoryResult<JsonValue> {
        serde_json::to_value(&item.content).map_err(|err| invalid_data(err.to_string()))
    }

    fn envelope_json(item: &InboxItem) -> RepositoryResult<Option<JsonValue>> {
        item.encrypted_content
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|err| invalid_data(err.to_string()))
    }

    fn meta_json(item: &InboxItem) -> RepositoryResult<Option<JsonValue>> {
        item.meta
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|err| invalid_data(err.to_string()))
    }
}

#[async_trait]
impl ItemRepository for PgItemRepository {
    async fn create(&self, item: InboxItem) -> RepositoryResult<InboxItem> {
        let sql = format!(
            r#"
            INSERT INTO inbox_items ({ITEM_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26)
            RETURNING {ITEM_COLUMNS}
            "#
        );

        let record = sqlx::query_as::<_, ItemRecord>(&sql)
            .bind(Uuid::from(item.id))
            .bind(&item.tenant_id)
            .bind(Uuid::from(item.thread_id))
            .bind(item.conversation_id.map(Uuid::from))
            .bind(item.order_id.map(Uuid::from))
            .bind(item.user_id.map(Uuid::from))
            .bind(item.address.as_ref().map(|a| a.as_str().to_string()))
            .bind(item.item_type.as_str())
            .bind(item.importance.as_str())
            .bind(item.channel.as_str())
            .bind(&item.lang)
            .bind(Self::content_json(&item)?)
            .bind(Self::envelope_json(&item)?)
            .bind(Self::meta_json(&item)?)
            .bind(&item.classification)
            .bind(item.pii_class.as_str())
            .bind(item.status.as_str())
            .bind(&item.dedupe_key)
            .bind(item.retry_count as i32)
            .bind(item.next_attempt_at)
            .bind(item.delivered_at)
            .bind(item.read_at)
            .bind(&item.read_by)
            .bind(item.expires_at)
            .bind(item.created_at)
            .bind(item.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        InboxItem::try_from(record)
    }

    async fn update(&self, item: InboxItem) -> RepositoryResult<InboxItem> {
        let sql = format!(
            r#"
            UPDATE inbox_items
            SET status = $2,
                retry_count = $3,
                next_attempt_at = $4,
                delivered_at = $5,
                read_at = $6,
                read_by = $7,
                updated_at = $8
            WHERE id = $1
            RETURNING {ITEM_COLUMNS}
            "#
        );

        let record = sqlx::query_as::<_, ItemRecord>(&sql)
            .bind(Uuid::from(item.id))
            .bind(item.status.as_str())
            .bind(item.retry_count as i32)
            .bind(item.next_attempt_at)
            .bind(item.delivered_at)
            .bind(item.read_at)
            .bind(&item.read_by)
            .bind(item.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        InboxItem::try_from(record)
    }

    async fn find_by_id(&self, id: ItemId) -> RepositoryResult<Option<InboxItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM inbox_items WHERE id = $1");
        let record = sqlx::query_as::<_, ItemRecord>(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        record.map(InboxItem::try_from).transpose()
    }

    async fn find_by_dedupe_key(&self, dedupe_key: &str) -> RepositoryResult<Option<InboxItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM inbox_items WHERE dedupe_key = $1");
        let record = sqlx::query_as::<_, ItemRecord>(&sql)
            .bind(dedupe_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        record.map(InboxItem::try_from).transpose()
    }

    async fn list_by_thread(
        &self,
        thread_id: ThreadId,
        limit: u32,
    ) -> RepositoryResult<Vec<InboxItem>> {
        let sql = format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM inbox_items
            WHERE thread_id = $1
            ORDER BY created_at ASC
            LIMIT $2
            "#
        );
        let records = sqlx::query_as::<_, ItemRecord>(&sql)
            .bind(Uuid::from(thread_id))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        records.into_iter().map(InboxItem::try_from).collect()
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
        limit: u32,
    ) -> RepositoryResult<Vec<InboxItem>> {
        let sql = format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM inbox_items
            WHERE conversation_id = $1
            ORDER BY created_at ASC
            LIMIT $2
            "#
        );
        let records = sqlx::query_as::<_, ItemRecord>(&sql)
            .bind(Uuid::from(conversation_id))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        records.into_iter().map(InboxItem::try_from).collect()
    }

    async fn list_unread_by_conversation(
        &self,
        conversation_id: ConversationId,
        address: &Address,
        limit: u32,
    ) -> RepositoryResult<Vec<InboxItem>> {
        let sql = format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM inbox_items
            WHERE conversation_id = $1
              AND NOT ($2 = ANY(read_by))
            ORDER BY created_at ASC
            LIMIT $3
            "#
        );
        let records = sqlx::query_as::<_, ItemRecord>(&sql)
            .bind(Uuid::from(conversation_id))
            .bind(address.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        records.into_iter().map(InboxItem::try_from).collect()
    }

    async fn find_latest_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> RepositoryResult<Option<InboxItem>> {
        let sql = format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM inbox_items
            WHERE conversation_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#
        );
        let record = sqlx::query_as::<_, ItemRecord>(&sql)
            .bind(Uuid::from(conversation_id))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        record.map(InboxItem::try_from).transpose()
    }

    async fn count_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> RepositoryResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM inbox_items WHERE conversation_id = $1")
                .bind(Uuid::from(conversation_id))
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

        Ok(count.max(0) as u64)
    }

    async fn count_unread_by_conversation(
        &self,
        conversation_id: ConversationId,
        address: &Address,
    ) -> RepositoryResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM inbox_items
            WHERE conversation_id = $1
              AND NOT ($2 = ANY(read_by))
            "#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(address.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(count.max(0) as u64)
    }
}
