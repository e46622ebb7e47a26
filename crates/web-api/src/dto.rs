//! 对外的线格式映射
//!
//! 条目响应携带还原后的内容：配置了密钥时信封被解开，
//! 没有密钥的历史明文原样返回。

use serde::Serialize;
use serde_json::Value as JsonValue;

use domain::{Content, Conversation, InboxItem, InboxThread, Timestamp};

/// 条目线格式
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDto {
    pub id: String,
    pub tenant_id: String,
    pub thread_id: String,
    pub conversation_id: Option<String>,
    pub order_id: Option<String>,
    pub user_id: Option<String>,
    pub address: Option<String>,
    #[serde(rename = "type")]
    pub item_type: String,
    pub importance: String,
    pub channel: String,
    pub lang: String,
    pub content: Content,
    pub meta: JsonValue,
    pub classification: Vec<String>,
    pub pii_class: String,
    pub status: String,
    pub dedupe_key: String,
    pub retry_count: u32,
    pub next_attempt_at: Option<Timestamp>,
    pub delivered_at: Option<Timestamp>,
    pub read_at: Option<Timestamp>,
    pub read_by: Vec<String>,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ItemDto {
    /// content 参数是已经还原的内容
    pub fn from_item(item: &InboxItem, content: Content) -> Self {
        Self {
            id: item.id.to_string(),
            tenant_id: item.tenant_id.clone(),
            thread_id: item.thread_id.to_string(),
            conversation_id: item.conversation_id.map(|id| id.to_string()),
            order_id: item.order_id.map(|id| id.to_string()),
            user_id: item.user_id.map(|id| id.to_string()),
            address: item.address.as_ref().map(|a| a.as_str().to_string()),
            item_type: item.item_type.as_str().to_string(),
            importance: item.importance.as_str().to_string(),
            channel: item.channel.as_str().to_string(),
            lang: item.lang.clone(),
            content,
            meta: item
                .meta
                .as_ref()
                .and_then(|meta| serde_json::to_value(meta).ok())
                .unwrap_or_else(|| JsonValue::Object(serde_json::Map::new())),
            classification: item.classification.clone(),
            pii_class: item.pii_class.as_str().to_string(),
            status: item.status.as_str().to_string(),
            dedupe_key: item.dedupe_key.clone(),
            retry_count: item.retry_count,
            next_attempt_at: item.next_attempt_at,
            delivered_at: item.delivered_at,
            read_at: item.read_at,
            read_by: item.read_by.clone(),
            expires_at: item.expires_at,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

/// 线程线格式
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadDto {
    pub id: String,
    pub tenant_id: String,
    pub conversation_id: Option<String>,
    pub order_id: Option<String>,
    pub metadata: JsonValue,
    pub dedupe_hint: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<&InboxThread> for ThreadDto {
    fn from(thread: &InboxThread) -> Self {
        Self {
            id: thread.id.to_string(),
            tenant_id: thread.tenant_id.clone(),
            conversation_id: thread.conversation_id.map(|id| id.to_string()),
            order_id: thread.order_id.map(|id| id.to_string()),
            metadata: thread.metadata.clone().unwrap_or(JsonValue::Null),
            dedupe_hint: thread.dedupe_hint.clone(),
            created_at: thread.created_at,
            updated_at: thread.updated_at,
        }
    }
}

/// 会话线格式
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    pub id: String,
    pub tenant_id: String,
    pub kind: String,
    pub order_id: Option<String>,
    pub metadata: JsonValue,
    pub last_message_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<&Conversation> for ConversationDto {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.to_string(),
            tenant_id: conversation.tenant_id.clone(),
            kind: conversation.kind.as_str().to_string(),
            order_id: conversation.order_id.map(|id| id.to_string()),
            metadata: conversation.metadata.clone().unwrap_or(JsonValue::Null),
            last_message_at: conversation.last_message_at,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}
