//! 收件箱实体定义
//!
//! 消息条目是投递的原子单位，线程是与会话无关的服务端分组键。
//! 条目的投递状态机：pending → delivering → delivered/failed。

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{
    Address, ConversationId, ItemId, OrderId, ThreadId, Timestamp, UserId,
};

/// 消息类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    #[default]
    Message,
    System,
    Reminder,
    Alert,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Message => "message",
            ItemType::System => "system",
            ItemType::Reminder => "reminder",
            ItemType::Alert => "alert",
        }
    }
}

/// 重要级别枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Low => "low",
            Importance::Normal => "normal",
            Importance::High => "high",
            Importance::Critical => "critical",
        }
    }
}

/// 投递通道枚举
///
/// 封闭集合：新增通道必须同时扩展枚举和适配器分发表。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Chat,
    Toast,
    Email,
    Push,
    Log,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Chat => "chat",
            Channel::Toast => "toast",
            Channel::Email => "email",
            Channel::Push => "push",
            Channel::Log => "log",
        }
    }

    /// 同步通道在适配器分发后立即标记送达；
    /// email/push 留待后续重试调度。
    pub fn is_synchronous(&self) -> bool {
        matches!(self, Channel::Chat | Channel::Toast | Channel::Log)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 投递状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Delivering,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivering => "delivering",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }
}

/// PII 敏感级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PiiClass {
    #[default]
    None,
    Personal,
    Sensitive,
}

impl PiiClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiClass::None => "none",
            PiiClass::Personal => "personal",
            PiiClass::Sensitive => "sensitive",
        }
    }

    fn priority(&self) -> u8 {
        match self {
            PiiClass::None => 0,
            PiiClass::Personal => 1,
            PiiClass::Sensitive => 2,
        }
    }

    /// 级别只升不降：none < personal < sensitive
    pub fn escalate(self, next: PiiClass) -> PiiClass {
        if next.priority() > self.priority() {
            next
        } else {
            self
        }
    }
}

/// 结构化消息内容：本地化键 + 参数表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub key: String,
    #[serde(default)]
    pub args: JsonMap<String, JsonValue>,
}

impl Content {
    pub fn new(key: impl Into<String>, args: JsonMap<String, JsonValue>) -> DomainResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(DomainError::validation("content.key", "cannot be empty"));
        }
        Ok(Self { key, args })
    }

    /// 生成脱敏摘要：字符串参数替换为遮蔽标记，数组收缩为长度，
    /// 对象收缩为占位标记。加密信封携带真实内容时，明文字段只存摘要。
    pub fn summarize(&self) -> Content {
        let args = self
            .args
            .iter()
            .map(|(key, value)| {
                let summarized = match value {
                    JsonValue::String(_) => JsonValue::String("[redacted]".to_string()),
                    JsonValue::Array(entries) => JsonValue::from(entries.len()),
                    JsonValue::Object(_) => JsonValue::String("[object]".to_string()),
                    other => other.clone(),
                };
                (key.clone(), summarized)
            })
            .collect();
        Content {
            key: self.key.clone(),
            args,
        }
    }
}

/// 加密信封：版本化的认证加密负载，全部字段 base64 编码
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub v: u32,
    pub alg: String,
    pub iv: String,
    pub tag: String,
    pub data: String,
}

/// 条目附加元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale_override: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<JsonMap<String, JsonValue>>,
}

/// 收件箱线程
///
/// 首次出现的 (tenant, conversation, order) 组合惰性创建，本核心不删除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxThread {
    pub id: ThreadId,
    pub tenant_id: String,
    pub conversation_id: Option<ConversationId>,
    pub order_id: Option<OrderId>,
    pub metadata: Option<JsonValue>,
    pub dedupe_hint: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// 收件箱条目实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxItem {
    pub id: ItemId,
    pub tenant_id: String,
    pub thread_id: ThreadId,
    pub conversation_id: Option<ConversationId>,
    pub order_id: Option<OrderId>,
    pub user_id: Option<UserId>,
    pub address: Option<Address>,
    pub item_type: ItemType,
    pub importance: Importance,
    pub channel: Channel,
    pub lang: String,
    /// 明文内容；加密激活时这里只保存脱敏摘要
    pub content: Content,
    /// 加密信封；携带真实负载
    pub encrypted_content: Option<EncryptedEnvelope>,
    pub meta: Option<Meta>,
    /// 分类标签（email/phone/wallet）
    pub classification: Vec<String>,
    pub pii_class: PiiClass,
    pub status: DeliveryStatus,
    pub dedupe_key: String,
    pub retry_count: u32,
    pub next_attempt_at: Option<Timestamp>,
    pub delivered_at: Option<Timestamp>,
    pub read_at: Option<Timestamp>,
    /// 已读地址集合（规范化地址字符串）
    pub read_by: Vec<String>,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl InboxItem {
    /// 标记为已送达
    pub fn mark_delivered(&mut self, now: Timestamp) {
        self.status = DeliveryStatus::Delivered;
        self.delivered_at = Some(now);
        self.updated_at = now;
    }

    /// 保持 pending 并记录下一次投递尝试时间
    pub fn schedule_retry(&mut self, next_attempt_at: Timestamp, now: Timestamp) {
        self.status = DeliveryStatus::Pending;
        self.next_attempt_at = Some(next_attempt_at);
        self.updated_at = now;
    }

    /// 标记投递失败
    pub fn mark_failed(&mut self, now: Timestamp) {
        self.status = DeliveryStatus::Failed;
        self.updated_at = now;
    }

    /// 将地址追加到已读集合；重复标记是幂等的。
    /// 返回是否为新增的已读记录。
    pub fn mark_read_by(&mut self, address: &Address, now: Timestamp) -> bool {
        if self.is_read_by(address) {
            return false;
        }
        self.read_by.push(address.as_str().to_string());
        self.read_at = Some(now);
        self.updated_at = now;
        true
    }

    pub fn is_read_by(&self, address: &Address) -> bool {
        self.read_by.iter().any(|entry| entry == address.as_str())
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.map(|at| at < now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pii_class_only_escalates() {
        assert_eq!(
            PiiClass::None.escalate(PiiClass::Personal),
            PiiClass::Personal
        );
        assert_eq!(
            PiiClass::Sensitive.escalate(PiiClass::Personal),
            PiiClass::Sensitive
        );
        assert_eq!(PiiClass::Personal.escalate(PiiClass::None), PiiClass::Personal);
    }

    #[test]
    fn content_key_must_not_be_empty() {
        assert!(Content::new("", JsonMap::new()).is_err());
        assert!(Content::new("chat.message", JsonMap::new()).is_ok());
    }

    #[test]
    fn summarize_redacts_string_args() {
        let mut args = JsonMap::new();
        args.insert("text".to_string(), json!("hello bob@example.com"));
        args.insert("attachments".to_string(), json!(["a.png", "b.png"]));
        args.insert("nested".to_string(), json!({"inner": "secret"}));
        args.insert("count".to_string(), json!(7));
        let content = Content::new("chat.message", args).unwrap();

        let summary = content.summarize();
        assert_eq!(summary.key, "chat.message");
        assert_eq!(summary.args["text"], json!("[redacted]"));
        assert_eq!(summary.args["attachments"], json!(2));
        assert_eq!(summary.args["nested"], json!("[object]"));
        assert_eq!(summary.args["count"], json!(7));
    }

    #[test]
    fn synchronous_channels() {
        assert!(Channel::Chat.is_synchronous());
        assert!(Channel::Toast.is_synchronous());
        assert!(Channel::Log.is_synchronous());
        assert!(!Channel::Email.is_synchronous());
        assert!(!Channel::Push.is_synchronous());
    }

    #[test]
    fn mark_read_is_idempotent() {
        let now = chrono::Utc::now();
        let address = Address::parse("Addr-A").unwrap();
        let mut item = sample_item(now);

        assert!(item.mark_read_by(&address, now));
        assert!(!item.mark_read_by(&address, now));
        assert_eq!(item.read_by, vec!["addr-a".to_string()]);
        assert!(item.read_at.is_some());
    }

    fn sample_item(now: Timestamp) -> InboxItem {
        InboxItem {
            id: ItemId::generate(),
            tenant_id: "default".to_string(),
            thread_id: ThreadId::generate(),
            conversation_id: None,
            order_id: None,
            user_id: None,
            address: None,
            item_type: ItemType::Message,
            importance: Importance::Normal,
            channel: Channel::Chat,
            lang: "en".to_string(),
            content: Content::new("chat.message", JsonMap::new()).unwrap(),
            encrypted_content: None,
            meta: None,
            classification: Vec::new(),
            pii_class: PiiClass::None,
            status: DeliveryStatus::Pending,
            dedupe_key: "k".to_string(),
            retry_count: 0,
            next_attempt_at: None,
            delivered_at: None,
            read_at: None,
            read_by: Vec::new(),
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
