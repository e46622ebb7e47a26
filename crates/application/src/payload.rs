//! 投递请求负载定义
//!
//! 对外的提交模式：未知字段拒绝，type/importance/channel/lang/piiClass
//! 缺省时应用默认值。

use serde::Deserialize;
use serde_json::Value as JsonValue;
use validator::Validate;

use domain::{
    Channel, Content, ConversationId, DeliveryStatus, Importance, ItemType, Meta, OrderId,
    PiiClass, ThreadId, Timestamp, UserId,
};

use crate::error::{ApplicationError, ApplicationResult};

fn default_lang() -> String {
    "en".to_string()
}

/// 投递请求负载
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IngestPayload {
    pub tenant_id: Option<String>,
    pub conversation_id: Option<ConversationId>,
    pub thread_id: Option<ThreadId>,
    pub order_id: Option<OrderId>,
    pub user_id: Option<UserId>,
    pub address: Option<String>,
    #[serde(rename = "type", default)]
    pub item_type: ItemType,
    #[serde(default)]
    pub importance: Importance,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default = "default_lang")]
    #[validate(length(min = 2, max = 10))]
    pub lang: String,
    pub content: Content,
    pub meta: Option<Meta>,
    #[serde(default)]
    pub pii_class: PiiClass,
    #[validate(length(min = 1))]
    pub dedupe_key: Option<String>,
    pub expires_at: Option<Timestamp>,
    pub status: Option<DeliveryStatus>,
    pub next_attempt_at: Option<Timestamp>,
}

impl IngestPayload {
    /// 解析并校验原始负载；任何缺陷都是 `Validation` 硬错误
    pub fn parse(raw: JsonValue) -> ApplicationResult<Self> {
        let payload: IngestPayload = serde_json::from_value(raw)
            .map_err(|error| ApplicationError::Validation(error.to_string()))?;
        payload
            .validate()
            .map_err(|error| ApplicationError::Validation(error.to_string()))?;
        if payload.content.key.is_empty() {
            return Err(ApplicationError::validation("content.key: cannot be empty"));
        }
        Ok(payload)
    }
}

/// 投递请求选项
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub actor_address: Option<String>,
    pub actor_user_id: Option<UserId>,
    /// 仅保留给可信内部流程（例如订单会话自动开通）
    pub bypass_rate_limit: bool,
}
