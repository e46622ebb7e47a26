//! 扇出事件构造与目标解析
//!
//! 事件目标规则：
//! - message：会话全体参与者 + 发送者本人（发送者能看到自己的回显）
//! - typing：除发送者外的参与者
//! - read：除读取者外的参与者

use std::sync::Arc;

use domain::{Address, ConversationId, InboxItem, ParticipantRepository, Timestamp};
use serde_json::Value as JsonValue;

use crate::encryption::ContentCipher;
use crate::error::ApplicationResult;
use crate::fanout::{FanoutHub, InboxEvent, MessagePayload};

/// 实时事件通知器
#[derive(Clone)]
pub struct StreamNotifier {
    participants: Arc<dyn ParticipantRepository>,
    hub: Arc<FanoutHub>,
    cipher: Arc<ContentCipher>,
}

impl StreamNotifier {
    pub fn new(
        participants: Arc<dyn ParticipantRepository>,
        hub: Arc<FanoutHub>,
        cipher: Arc<ContentCipher>,
    ) -> Self {
        Self {
            participants,
            hub,
            cipher,
        }
    }

    /// 把新持久化的条目广播给会话参与者与发送者本人。
    /// 尽力而为：任何失败只记录告警，不影响投递结果。
    pub async fn notify_new_item(&self, item: &InboxItem) {
        let text = match self.cipher.unwrap(&item.content, item.encrypted_content.as_ref()) {
            Ok(content) => content
                .args
                .get("text")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string(),
            Err(error) => {
                tracing::warn!(item_id = %item.id, error = %error, "事件内容还原失败，跳过扇出");
                return;
            }
        };

        let mut targets: Vec<Address> = Vec::new();
        if let Some(address) = &item.address {
            targets.push(address.clone());
        }

        if let Some(conversation_id) = item.conversation_id {
            match self.participants.list_by_conversation(conversation_id).await {
                Ok(participants) => {
                    targets.extend(participants.into_iter().map(|p| p.address));
                }
                Err(error) => {
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        error = %error,
                        "参与者查询失败，仅通知发送者"
                    );
                }
            }
        }

        let event = InboxEvent::Message {
            conversation_id: item
                .conversation_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            message: MessagePayload {
                id: item.id.to_string(),
                text,
                address: item
                    .address
                    .as_ref()
                    .map(|a| a.as_str().to_string())
                    .unwrap_or_default(),
                created_at: item.created_at,
            },
        };

        self.hub.publish(&targets, event);
    }

    /// 输入状态信号：发送者本人不接收
    pub async fn notify_typing(
        &self,
        conversation_id: ConversationId,
        from: &Address,
        typing: bool,
    ) -> ApplicationResult<()> {
        let targets = self.targets_excluding(conversation_id, from).await?;
        self.hub.publish(
            &targets,
            InboxEvent::Typing {
                conversation_id: conversation_id.to_string(),
                from: from.as_str().to_string(),
                typing,
            },
        );
        Ok(())
    }

    /// 已读回执信号：读取者本人不接收
    pub async fn notify_read(
        &self,
        conversation_id: ConversationId,
        by: &Address,
        at: Timestamp,
    ) -> ApplicationResult<()> {
        let targets = self.targets_excluding(conversation_id, by).await?;
        self.hub.publish(
            &targets,
            InboxEvent::Read {
                conversation_id: conversation_id.to_string(),
                by: by.as_str().to_string(),
                at,
            },
        );
        Ok(())
    }

    async fn targets_excluding(
        &self,
        conversation_id: ConversationId,
        excluded: &Address,
    ) -> ApplicationResult<Vec<Address>> {
        let participants = self.participants.list_by_conversation(conversation_id).await?;
        Ok(participants
            .into_iter()
            .map(|p| p.address)
            .filter(|address| address != excluded)
            .collect())
    }
}
