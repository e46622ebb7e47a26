//! 参与者Repository接口定义

use async_trait::async_trait;

use crate::conversation::Participant;
use crate::errors::RepositoryResult;
use crate::value_objects::{Address, ConversationId};

/// 参与者Repository接口
#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    /// 插入或更新参与者记录，(conversation, address) 为唯一键
    async fn upsert(&self, participant: Participant) -> RepositoryResult<Participant>;

    /// 查找指定会话和地址的参与者记录
    async fn find(
        &self,
        conversation_id: ConversationId,
        address: &Address,
    ) -> RepositoryResult<Option<Participant>>;

    /// 获取会话的全部参与者
    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> RepositoryResult<Vec<Participant>>;

    /// 获取地址参与的全部会话ID
    async fn list_conversation_ids_by_address(
        &self,
        address: &Address,
    ) -> RepositoryResult<Vec<ConversationId>>;
}
