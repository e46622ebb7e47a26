//! 内存仓储实现（用于测试）
//!
//! 行为与 PostgreSQL 实现对齐，尤其是 dedupe key 的唯一约束：
//! 检查与插入在同一把写锁内完成，并发重复创建的第二个请求
//! 会得到 `UniqueViolation`。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use domain::{
    Address, AuditLogRepository, AuditRecord, Conversation, ConversationId, ConversationKind,
    ConversationRepository, InboxItem, InboxThread, ItemId, ItemRepository, OrderId, Participant,
    ParticipantRepository, RepositoryError, RepositoryResult, ThreadId, ThreadRepository,
};

/// 线程仓储内存实现
#[derive(Default)]
pub struct MemoryThreadRepository {
    threads: RwLock<HashMap<ThreadId, InboxThread>>,
}

impl MemoryThreadRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThreadRepository for MemoryThreadRepository {
    async fn create(&self, thread: InboxThread) -> RepositoryResult<InboxThread> {
        let mut threads = self.threads.write().await;
        threads.insert(thread.id, thread.clone());
        Ok(thread)
    }

    async fn find_by_id(&self, id: ThreadId) -> RepositoryResult<Option<InboxThread>> {
        Ok(self.threads.read().await.get(&id).cloned())
    }

    async fn find_by_context(
        &self,
        tenant_id: &str,
        conversation_id: Option<ConversationId>,
        order_id: Option<OrderId>,
    ) -> RepositoryResult<Option<InboxThread>> {
        let threads = self.threads.read().await;
        let mut matches: Vec<&InboxThread> = threads
            .values()
            .filter(|thread| {
                thread.tenant_id == tenant_id
                    && thread.conversation_id == conversation_id
                    && thread.order_id == order_id
            })
            .collect();
        matches.sort_by_key(|thread| thread.created_at);
        Ok(matches.first().map(|thread| (*thread).clone()))
    }
}

/// 条目仓储内存实现
#[derive(Default)]
pub struct MemoryItemRepository {
    items: RwLock<HashMap<ItemId, InboxItem>>,
}

impl MemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_by_created<'a>(
        items: impl Iterator<Item = &'a InboxItem>,
    ) -> Vec<InboxItem> {
        let mut collected: Vec<InboxItem> = items.cloned().collect();
        collected.sort_by_key(|item| item.created_at);
        collected
    }
}

#[async_trait]
impl ItemRepository for MemoryItemRepository {
    async fn create(&self, item: InboxItem) -> RepositoryResult<InboxItem> {
        // 检查与插入在同一临界区内，对齐数据库唯一约束的裁决语义
        let mut items = self.items.write().await;
        if items
            .values()
            .any(|existing| existing.dedupe_key == item.dedupe_key)
        {
            return Err(RepositoryError::unique_violation(
                "inbox_items_dedupe_key_key",
            ));
        }
        items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update(&self, item: InboxItem) -> RepositoryResult<InboxItem> {
        let mut items = self.items.write().await;
        if !items.contains_key(&item.id) {
            return Err(RepositoryError::NotFound);
        }
        items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn find_by_id(&self, id: ItemId) -> RepositoryResult<Option<InboxItem>> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn find_by_dedupe_key(&self, dedupe_key: &str) -> RepositoryResult<Option<InboxItem>> {
        let items = self.items.read().await;
        Ok(items
            .values()
            .find(|item| item.dedupe_key == dedupe_key)
            .cloned())
    }

    async fn list_by_thread(
        &self,
        thread_id: ThreadId,
        limit: u32,
    ) -> RepositoryResult<Vec<InboxItem>> {
        let items = self.items.read().await;
        let mut collected =
            Self::sorted_by_created(items.values().filter(|item| item.thread_id == thread_id));
        collected.truncate(limit as usize);
        Ok(collected)
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
        limit: u32,
    ) -> RepositoryResult<Vec<InboxItem>> {
        let items = self.items.read().await;
        let mut collected = Self::sorted_by_created(
            items
                .values()
                .filter(|item| item.conversation_id == Some(conversation_id)),
        );
        collected.truncate(limit as usize);
        Ok(collected)
    }

    async fn list_unread_by_conversation(
        &self,
        conversation_id: ConversationId,
        address: &Address,
        limit: u32,
    ) -> RepositoryResult<Vec<InboxItem>> {
        let items = self.items.read().await;
        let mut collected = Self::sorted_by_created(items.values().filter(|item| {
            item.conversation_id == Some(conversation_id) && !item.is_read_by(address)
        }));
        collected.truncate(limit as usize);
        Ok(collected)
    }

    async fn find_latest_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> RepositoryResult<Option<InboxItem>> {
        let items = self.items.read().await;
        let collected = Self::sorted_by_created(
            items
                .values()
                .filter(|item| item.conversation_id == Some(conversation_id)),
        );
        Ok(collected.into_iter().next_back())
    }

    async fn count_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> RepositoryResult<u64> {
        let items = self.items.read().await;
        Ok(items
            .values()
            .filter(|item| item.conversation_id == Some(conversation_id))
            .count() as u64)
    }

    async fn count_unread_by_conversation(
        &self,
        conversation_id: ConversationId,
        address: &Address,
    ) -> RepositoryResult<u64> {
        let items = self.items.read().await;
        Ok(items
            .values()
            .filter(|item| {
                item.conversation_id == Some(conversation_id) && !item.is_read_by(address)
            })
            .count() as u64)
    }
}

/// 会话仓储内存实现
#[derive(Default)]
pub struct MemoryConversationRepository {
    conversations: RwLock<HashMap<ConversationId, Conversation>>,
    participants_view: RwLock<HashMap<ConversationId, Vec<String>>>,
}

impl MemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 收藏夹查找需要参与者视角；测试替身通过这个回调保持两张表同步
    pub async fn attach_participant(&self, conversation_id: ConversationId, address: &Address) {
        let mut view = self.participants_view.write().await;
        let bucket = view.entry(conversation_id).or_default();
        if !bucket.iter().any(|entry| entry == address.as_str()) {
            bucket.push(address.as_str().to_string());
        }
    }
}

#[async_trait]
impl ConversationRepository for MemoryConversationRepository {
    async fn create(&self, conversation: Conversation) -> RepositoryResult<Conversation> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn update(&self, conversation: Conversation) -> RepositoryResult<Conversation> {
        let mut conversations = self.conversations.write().await;
        if !conversations.contains_key(&conversation.id) {
            return Err(RepositoryError::NotFound);
        }
        conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find_by_id(&self, id: ConversationId) -> RepositoryResult<Option<Conversation>> {
        Ok(self.conversations.read().await.get(&id).cloned())
    }

    async fn find_by_order(&self, order_id: OrderId) -> RepositoryResult<Option<Conversation>> {
        let conversations = self.conversations.read().await;
        let mut matches: Vec<&Conversation> = conversations
            .values()
            .filter(|conversation| conversation.order_id == Some(order_id))
            .collect();
        matches.sort_by_key(|conversation| conversation.created_at);
        Ok(matches.first().map(|conversation| (*conversation).clone()))
    }

    async fn find_favorites_by_address(
        &self,
        address: &Address,
    ) -> RepositoryResult<Option<Conversation>> {
        let conversations = self.conversations.read().await;
        let view = self.participants_view.read().await;
        let mut matches: Vec<&Conversation> = conversations
            .values()
            .filter(|conversation| {
                conversation.kind == ConversationKind::Favorites
                    && view
                        .get(&conversation.id)
                        .map(|bucket| bucket.iter().any(|entry| entry == address.as_str()))
                        .unwrap_or(false)
            })
            .collect();
        matches.sort_by_key(|conversation| conversation.created_at);
        Ok(matches.first().map(|conversation| (*conversation).clone()))
    }
}

/// 参与者仓储内存实现
pub struct MemoryParticipantRepository {
    participants: RwLock<HashMap<(ConversationId, String), Participant>>,
    conversations: std::sync::Arc<MemoryConversationRepository>,
}

impl MemoryParticipantRepository {
    /// 与会话仓储共享状态，保证收藏夹查找看到参与者变更
    pub fn new(conversations: std::sync::Arc<MemoryConversationRepository>) -> Self {
        Self {
            participants: RwLock::new(HashMap::new()),
            conversations,
        }
    }
}

#[async_trait]
impl ParticipantRepository for MemoryParticipantRepository {
    async fn upsert(&self, participant: Participant) -> RepositoryResult<Participant> {
        let key = (
            participant.conversation_id,
            participant.address.as_str().to_string(),
        );
        {
            let mut participants = self.participants.write().await;
            match participants.get_mut(&key) {
                Some(existing) => {
                    existing.role = participant.role;
                    existing.user_id = participant.user_id;
                }
                None => {
                    participants.insert(key, participant.clone());
                }
            }
        }
        self.conversations
            .attach_participant(participant.conversation_id, &participant.address)
            .await;
        Ok(participant)
    }

    async fn find(
        &self,
        conversation_id: ConversationId,
        address: &Address,
    ) -> RepositoryResult<Option<Participant>> {
        let participants = self.participants.read().await;
        Ok(participants
            .get(&(conversation_id, address.as_str().to_string()))
            .cloned())
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> RepositoryResult<Vec<Participant>> {
        let participants = self.participants.read().await;
        let mut collected: Vec<Participant> = participants
            .values()
            .filter(|participant| participant.conversation_id == conversation_id)
            .cloned()
            .collect();
        collected.sort_by_key(|participant| participant.joined_at);
        Ok(collected)
    }

    async fn list_conversation_ids_by_address(
        &self,
        address: &Address,
    ) -> RepositoryResult<Vec<ConversationId>> {
        let participants = self.participants.read().await;
        let mut entries: Vec<&Participant> = participants
            .values()
            .filter(|participant| participant.address == *address)
            .collect();
        entries.sort_by_key(|participant| participant.joined_at);
        Ok(entries
            .into_iter()
            .map(|participant| participant.conversation_id)
            .collect())
    }
}

/// 审计日志仓储内存实现
#[derive(Default)]
pub struct MemoryAuditLogRepository {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl AuditLogRepository for MemoryAuditLogRepository {
    async fn create(&self, record: AuditRecord) -> RepositoryResult<()> {
        self.records.write().await.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Channel, Content, DeliveryStatus, Importance, ItemType, PiiClass};
    use serde_json::Map as JsonMap;

    fn sample_item(dedupe_key: &str) -> InboxItem {
        let now = chrono::Utc::now();
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
            dedupe_key: dedupe_key.to_string(),
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

    #[tokio::test]
    async fn duplicate_dedupe_key_is_a_unique_violation() {
        let repository = MemoryItemRepository::new();
        repository.create(sample_item("k1")).await.unwrap();

        let error = repository.create(sample_item("k1")).await.unwrap_err();
        assert!(matches!(error, RepositoryError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn concurrent_creates_with_same_key_admit_exactly_one() {
        use std::sync::Arc;

        let repository = Arc::new(MemoryItemRepository::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let repository = repository.clone();
            handles.push(tokio::spawn(async move {
                repository.create(sample_item("race")).await
            }));
        }

        let mut created = 0;
        let mut conflicted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(RepositoryError::UniqueViolation { .. }) => conflicted += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(conflicted, 7);
    }
}
