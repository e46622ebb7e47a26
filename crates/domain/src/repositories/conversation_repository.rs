//! 会话Repository接口定义

use async_trait::async_trait;

use crate::conversation::Conversation;
use crate::errors::RepositoryResult;
use crate::value_objects::{Address, ConversationId, OrderId};

/// 会话Repository接口
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// 创建新会话
    async fn create(&self, conversation: Conversation) -> RepositoryResult<Conversation>;

    /// 更新会话（元数据、最近活动时间）
    async fn update(&self, conversation: Conversation) -> RepositoryResult<Conversation>;

    /// 根据ID查找会话
    async fn find_by_id(&self, id: ConversationId) -> RepositoryResult<Option<Conversation>>;

    /// 根据订单查找会话
    async fn find_by_order(&self, order_id: OrderId) -> RepositoryResult<Option<Conversation>>;

    /// 查找指定地址的收藏夹自聊会话
    async fn find_favorites_by_address(
        &self,
        address: &Address,
    ) -> RepositoryResult<Option<Conversation>>;
}
