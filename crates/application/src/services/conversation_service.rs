//! 会话用例服务
//!
//! 成员资格是读取会话历史的唯一门槛：参与者记录存在即放行，
//! 不存在即 Forbidden（与会话整体缺失的 NotFound 区分）。

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use domain::{
    Address, AuditRecord, Conversation, ConversationId, ConversationKind,
    ConversationRepository, Importance, InboxItem, ItemRepository, OrderId, Participant,
    ParticipantRepository, ParticipantRole, Timestamp,
};

use crate::audit::AuditLogger;
use crate::clock::Clock;
use crate::encryption::ContentCipher;
use crate::error::{ApplicationError, ApplicationResult};

/// 对外的消息视图：内容已还原为明文文本
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub created_at: Timestamp,
    #[serde(rename = "type")]
    pub item_type: String,
    pub importance: String,
    pub channel: String,
    pub text: String,
    pub lang: String,
    pub address: Option<String>,
    pub meta: JsonValue,
    pub unread: bool,
}

/// 参与者视图
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantView {
    pub address: String,
    pub role: String,
}

/// 会话概览条目
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub kind: String,
    pub order_id: Option<String>,
    pub title: String,
    pub updated_at: Timestamp,
    pub last_message: Option<MessageView>,
    /// 请求者尚未读过的条目数
    pub unread_count: u64,
    pub total_messages: u64,
    pub participants: Vec<ParticipantView>,
    pub metadata: JsonValue,
}

pub struct ConversationServiceDependencies {
    pub conversations: Arc<dyn ConversationRepository>,
    pub participants: Arc<dyn ParticipantRepository>,
    pub items: Arc<dyn ItemRepository>,
    pub cipher: Arc<ContentCipher>,
    pub audit: AuditLogger,
    pub clock: Arc<dyn Clock>,
    pub default_tenant: String,
}

pub struct ConversationService {
    deps: ConversationServiceDependencies,
}

impl ConversationService {
    pub fn new(deps: ConversationServiceDependencies) -> Self {
        Self { deps }
    }

    /// 成员资格检查：返回参与者记录，否则 Forbidden / NotFound
    pub async fn ensure_access(
        &self,
        conversation_id: ConversationId,
        address: &Address,
    ) -> ApplicationResult<Participant> {
        self.deps
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| {
                ApplicationError::not_found(format!("conversation {conversation_id}"))
            })?;

        self.deps
            .participants
            .find(conversation_id, address)
            .await?
            .ok_or_else(|| ApplicationError::Forbidden(conversation_id.to_string()))
    }

    /// 惰性创建收藏夹自聊会话，并确保 owner 参与者记录存在
    pub async fn ensure_favorites_conversation(
        &self,
        address: &Address,
    ) -> ApplicationResult<Conversation> {
        let now = self.deps.clock.now();

        let conversation = match self
            .deps
            .conversations
            .find_favorites_by_address(address)
            .await?
        {
            Some(existing) => existing,
            None => {
                let conversation = Conversation {
                    id: ConversationId::generate(),
                    tenant_id: self.deps.default_tenant.clone(),
                    kind: ConversationKind::Favorites,
                    order_id: None,
                    owner_user_id: None,
                    metadata: None,
                    last_message_at: None,
                    created_at: now,
                    updated_at: now,
                };
                self.deps.conversations.create(conversation).await?
            }
        };

        self.deps
            .participants
            .upsert(Participant {
                conversation_id: conversation.id,
                address: address.clone(),
                role: ParticipantRole::Owner,
                user_id: None,
                joined_at: now,
            })
            .await?;

        self.deps
            .audit
            .record(AuditRecord {
                actor_address: Some(address.as_str().to_string()),
                actor_user_id: None,
                action: "ensure_favorites_conversation".to_string(),
                entity_type: "conversation".to_string(),
                entity_id: Some(conversation.id.to_string()),
                tenant_id: Some(conversation.tenant_id.clone()),
                metadata: Some(json!({ "kind": conversation.kind.as_str() })),
                created_at: now,
            })
            .await;

        Ok(conversation)
    }

    /// 为订单开通会话并登记 maker/taker 参与者
    pub async fn ensure_order_conversation(
        &self,
        order_id: OrderId,
        maker: &Address,
        taker: Option<&Address>,
    ) -> ApplicationResult<Conversation> {
        let now = self.deps.clock.now();

        let conversation = match self.deps.conversations.find_by_order(order_id).await? {
            Some(existing) => existing,
            None => {
                let conversation = Conversation {
                    id: ConversationId::generate(),
                    tenant_id: self.deps.default_tenant.clone(),
                    kind: ConversationKind::Order,
                    order_id: Some(order_id),
                    owner_user_id: None,
                    metadata: None,
                    last_message_at: None,
                    created_at: now,
                    updated_at: now,
                };
                self.deps.conversations.create(conversation).await?
            }
        };

        self.deps
            .participants
            .upsert(Participant {
                conversation_id: conversation.id,
                address: maker.clone(),
                role: ParticipantRole::Maker,
                user_id: None,
                joined_at: now,
            })
            .await?;

        if let Some(taker) = taker {
            self.deps
                .participants
                .upsert(Participant {
                    conversation_id: conversation.id,
                    address: taker.clone(),
                    role: ParticipantRole::Taker,
                    user_id: None,
                    joined_at: now,
                })
                .await?;
        }

        Ok(conversation)
    }

    /// 按会话ID或订单ID定位会话
    pub async fn find_by_identifier(
        &self,
        conversation_id: Option<ConversationId>,
        order_id: Option<OrderId>,
    ) -> ApplicationResult<Option<Conversation>> {
        if let Some(id) = conversation_id {
            return Ok(self.deps.conversations.find_by_id(id).await?);
        }
        if let Some(order_id) = order_id {
            return Ok(self.deps.conversations.find_by_order(order_id).await?);
        }
        Ok(None)
    }

    /// 标记会话重要级别（协商截止时间等元数据同理合并）
    pub async fn mark_important(
        &self,
        conversation_id: ConversationId,
        importance: Importance,
    ) -> ApplicationResult<Conversation> {
        let mut conversation = self
            .deps
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| {
                ApplicationError::not_found(format!("conversation {conversation_id}"))
            })?;

        let mut metadata = match conversation.metadata.take() {
            Some(JsonValue::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        metadata.insert(
            "importance".to_string(),
            JsonValue::String(importance.as_str().to_string()),
        );
        conversation.metadata = Some(JsonValue::Object(metadata));
        conversation.updated_at = self.deps.clock.now();

        Ok(self.deps.conversations.update(conversation).await?)
    }

    /// 访问检查后的会话历史
    pub async fn history(
        &self,
        conversation_id: ConversationId,
        address: &Address,
    ) -> ApplicationResult<(Conversation, Vec<MessageView>)> {
        self.ensure_access(conversation_id, address).await?;

        let conversation = self
            .deps
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| {
                ApplicationError::not_found(format!("conversation {conversation_id}"))
            })?;

        let items = self
            .deps
            .items
            .list_by_conversation(conversation_id, 200)
            .await?;

        let mut messages = Vec::with_capacity(items.len());
        for item in &items {
            messages.push(self.message_view(item, address)?);
        }

        Ok((conversation, messages))
    }

    /// 地址参与的全部会话概览，按更新时间降序
    pub async fn list_overview(
        &self,
        address: &Address,
    ) -> ApplicationResult<Vec<ConversationSummary>> {
        let conversation_ids = self
            .deps
            .participants
            .list_conversation_ids_by_address(address)
            .await?;

        if conversation_ids.is_empty() {
            // 第一次进入时顺便开通收藏夹自聊
            self.ensure_favorites_conversation(address).await?;
            return Ok(Vec::new());
        }

        let mut summaries = Vec::with_capacity(conversation_ids.len());
        for conversation_id in conversation_ids {
            let Some(conversation) = self.deps.conversations.find_by_id(conversation_id).await?
            else {
                continue;
            };

            let last_message = match self
                .deps
                .items
                .find_latest_by_conversation(conversation_id)
                .await?
            {
                Some(item) => Some(self.message_view(&item, address)?),
                None => None,
            };
            let unread_count = self
                .deps
                .items
                .count_unread_by_conversation(conversation_id, address)
                .await?;
            let total_messages = self
                .deps
                .items
                .count_by_conversation(conversation_id)
                .await?;
            let participants = self
                .deps
                .participants
                .list_by_conversation(conversation_id)
                .await?;

            summaries.push(ConversationSummary {
                id: conversation.id.to_string(),
                kind: conversation.kind.as_str().to_string(),
                order_id: conversation.order_id.map(|id| id.to_string()),
                title: title_for(&conversation),
                updated_at: conversation.updated_at,
                last_message,
                unread_count,
                total_messages,
                participants: participants
                    .into_iter()
                    .map(|p| ParticipantView {
                        address: p.address.as_str().to_string(),
                        role: p.role.as_str().to_string(),
                    })
                    .collect(),
                metadata: conversation.metadata.unwrap_or(JsonValue::Null),
            });
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    fn message_view(&self, item: &InboxItem, viewer: &Address) -> ApplicationResult<MessageView> {
        let content = self
            .deps
            .cipher
            .unwrap(&item.content, item.encrypted_content.as_ref())?;
        let text = content
            .args
            .get("text")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(MessageView {
            id: item.id.to_string(),
            created_at: item.created_at,
            item_type: item.item_type.as_str().to_string(),
            importance: item.importance.as_str().to_string(),
            channel: item.channel.as_str().to_string(),
            text,
            lang: item.lang.clone(),
            address: item.address.as_ref().map(|a| a.as_str().to_string()),
            meta: item
                .meta
                .as_ref()
                .and_then(|meta| serde_json::to_value(meta).ok())
                .unwrap_or(JsonValue::Null),
            unread: !item.is_read_by(viewer),
        })
    }
}

fn title_for(conversation: &Conversation) -> String {
    match conversation.kind {
        ConversationKind::Favorites => "Favorites".to_string(),
        ConversationKind::Order => "Order Chat".to_string(),
        ConversationKind::Other => "Conversation".to_string(),
    }
}
