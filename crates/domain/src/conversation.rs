//! 会话实体定义
//!
//! 会话是参与者作用域的分组实体，成员资格是读取历史的唯一访问门槛。

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::value_objects::{Address, ConversationId, OrderId, Timestamp, UserId};

/// 会话种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    /// 自聊收藏夹，每个用户一个
    Favorites,
    /// 订单会话，每个订单一个
    Order,
    Other,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Favorites => "favorites",
            ConversationKind::Order => "order",
            ConversationKind::Other => "other",
        }
    }
}

/// 参与者角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Owner,
    Maker,
    Taker,
    Member,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Owner => "owner",
            ParticipantRole::Maker => "maker",
            ParticipantRole::Taker => "taker",
            ParticipantRole::Member => "member",
        }
    }
}

/// 会话实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub tenant_id: String,
    pub kind: ConversationKind,
    pub order_id: Option<OrderId>,
    pub owner_user_id: Option<UserId>,
    pub metadata: Option<JsonValue>,
    pub last_message_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Conversation {
    /// 记录最近一条消息的时间
    pub fn touch_last_message(&mut self, at: Timestamp) {
        self.last_message_at = Some(at);
        self.updated_at = at;
    }
}

/// 会话参与者
///
/// (conversation, address) 对的存在即是访问授权。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub conversation_id: ConversationId,
    pub address: Address,
    pub role: ParticipantRole,
    pub user_id: Option<UserId>,
    pub joined_at: Timestamp,
}
