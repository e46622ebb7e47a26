//! 审计记录定义

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::value_objects::{Timestamp, UserId};

/// 审计记录
///
/// metadata 只允许非敏感字段（通道、重要级别、线程ID、分类标签），
/// 永远不包含消息原文。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub actor_address: Option<String>,
    pub actor_user_id: Option<UserId>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub tenant_id: Option<String>,
    pub metadata: Option<JsonValue>,
    pub created_at: Timestamp,
}
