//! 线程Repository接口定义

use async_trait::async_trait;

use crate::errors::RepositoryResult;
use crate::inbox::InboxThread;
use crate::value_objects::{ConversationId, OrderId, ThreadId};

/// 线程Repository接口
#[async_trait]
pub trait ThreadRepository: Send + Sync {
    /// 创建新线程
    async fn create(&self, thread: InboxThread) -> RepositoryResult<InboxThread>;

    /// 根据ID查找线程
    async fn find_by_id(&self, id: ThreadId) -> RepositoryResult<Option<InboxThread>>;

    /// 根据 (tenant, conversation, order) 组合查找线程
    async fn find_by_context(
        &self,
        tenant_id: &str,
        conversation_id: Option<ConversationId>,
        order_id: Option<OrderId>,
    ) -> RepositoryResult<Option<InboxThread>>;
}
