//! 条目Repository接口定义

use async_trait::async_trait;

use crate::errors::RepositoryResult;
use crate::inbox::InboxItem;
use crate::value_objects::{Address, ConversationId, ItemId, ThreadId};

/// 条目Repository接口
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// 创建新条目
    ///
    /// dedupe key 冲突时必须返回 `RepositoryError::UniqueViolation`，
    /// 管道据此把并发重复提交解析为"已存在"。
    async fn create(&self, item: InboxItem) -> RepositoryResult<InboxItem>;

    /// 更新条目（状态流转、已读集合）
    async fn update(&self, item: InboxItem) -> RepositoryResult<InboxItem>;

    /// 根据ID查找条目
    async fn find_by_id(&self, id: ItemId) -> RepositoryResult<Option<InboxItem>>;

    /// 根据 dedupe key 查找条目
    async fn find_by_dedupe_key(&self, dedupe_key: &str) -> RepositoryResult<Option<InboxItem>>;

    /// 获取线程内的条目，按创建时间升序
    async fn list_by_thread(
        &self,
        thread_id: ThreadId,
        limit: u32,
    ) -> RepositoryResult<Vec<InboxItem>>;

    /// 获取会话内的条目，按创建时间升序
    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
        limit: u32,
    ) -> RepositoryResult<Vec<InboxItem>>;

    /// 获取会话内指定地址尚未读过的条目
    async fn list_unread_by_conversation(
        &self,
        conversation_id: ConversationId,
        address: &Address,
        limit: u32,
    ) -> RepositoryResult<Vec<InboxItem>>;

    /// 获取会话内最新一条条目
    async fn find_latest_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> RepositoryResult<Option<InboxItem>>;

    /// 统计会话内条目总数
    async fn count_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> RepositoryResult<u64>;

    /// 统计会话内指定地址的未读条目数
    async fn count_unread_by_conversation(
        &self,
        conversation_id: ConversationId,
        address: &Address,
    ) -> RepositoryResult<u64>;
}
