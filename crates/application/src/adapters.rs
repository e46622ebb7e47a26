//! 通道适配器分发表
//!
//! 每个通道一种副作用与状态流转，封闭的枚举集合配合穷举分发：
//! 新增通道必须同时扩展 `Channel` 枚举和这里的 match 分支。
//!
//! chat/toast/log 同步送达；email/push 只记录下一次投递调度，
//! 实际传输在本核心范围之外。

use std::sync::Arc;

use domain::{Channel, ConversationRepository, InboxItem};

use crate::clock::Clock;
use crate::error::ApplicationResult;

/// 通道适配器
#[derive(Clone)]
pub struct ChannelAdapters {
    conversations: Arc<dyn ConversationRepository>,
    clock: Arc<dyn Clock>,
}

impl ChannelAdapters {
    pub fn new(conversations: Arc<dyn ConversationRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            conversations,
            clock,
        }
    }

    /// 执行条目所属通道的副作用并推进状态机
    ///
    /// 调用方负责把变更后的条目写回存储。
    pub async fn dispatch(&self, item: &mut InboxItem) -> ApplicationResult<()> {
        let now = self.clock.now();
        match item.channel {
            Channel::Chat => {
                item.mark_delivered(now);
                self.touch_conversation(item).await;
            }
            Channel::Toast => {
                item.mark_delivered(now);
            }
            Channel::Log => {
                // 诊断记录只携带分类标签，不含原文
                tracing::info!(
                    item_id = %item.id,
                    tenant_id = %item.tenant_id,
                    key = %item.content.key,
                    pii = item.pii_class.as_str(),
                    tags = ?item.classification,
                    "inbox log item"
                );
                item.mark_delivered(now);
            }
            Channel::Email => {
                item.schedule_retry(now + chrono::Duration::minutes(5), now);
            }
            Channel::Push => {
                item.schedule_retry(now + chrono::Duration::minutes(1), now);
            }
        }
        Ok(())
    }

    /// 更新会话的最近活动时间；失败不影响整体投递
    async fn touch_conversation(&self, item: &InboxItem) {
        let Some(conversation_id) = item.conversation_id else {
            return;
        };
        match self.conversations.find_by_id(conversation_id).await {
            Ok(Some(mut conversation)) => {
                conversation.touch_last_message(item.created_at);
                if let Err(error) = self.conversations.update(conversation).await {
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        error = %error,
                        "会话活动时间更新失败，忽略"
                    );
                }
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %error,
                    "会话查询失败，跳过活动时间更新"
                );
            }
        }
    }
}
