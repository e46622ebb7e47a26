//! 管道集成测试的装配工具：内存仓储 + 完整用例服务

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use application::{
    AuditLogger, ChannelAdapters, ChannelRateLimiters, ContentCipher, ConversationService,
    ConversationServiceDependencies, DispatchMetrics, FanoutHub, InboxService,
    InboxServiceDependencies, StreamNotifier, SystemClock,
};
use domain::{
    Address, Conversation, ConversationId, ConversationKind, ConversationRepository,
    ItemRepository, Participant, ParticipantRepository, ParticipantRole, ThreadRepository,
};
use infrastructure::{
    MemoryAuditLogRepository, MemoryConversationRepository, MemoryItemRepository,
    MemoryParticipantRepository, MemoryThreadRepository,
};

pub struct TestHarness {
    pub inbox: Arc<InboxService>,
    pub conversations: Arc<ConversationService>,
    pub notifier: StreamNotifier,
    pub fanout: Arc<FanoutHub>,
    pub metrics: Arc<DispatchMetrics>,
    pub threads: Arc<MemoryThreadRepository>,
    pub items: Arc<MemoryItemRepository>,
    pub conversation_repo: Arc<MemoryConversationRepository>,
    pub participant_repo: Arc<MemoryParticipantRepository>,
    pub audit_repo: Arc<MemoryAuditLogRepository>,
}

pub fn harness(encryption_key: Option<&str>) -> TestHarness {
    let threads = Arc::new(MemoryThreadRepository::new());
    let items = Arc::new(MemoryItemRepository::new());
    let conversation_repo = Arc::new(MemoryConversationRepository::new());
    let participant_repo = Arc::new(MemoryParticipantRepository::new(conversation_repo.clone()));
    let audit_repo = Arc::new(MemoryAuditLogRepository::new());

    let clock: Arc<dyn application::Clock> = Arc::new(SystemClock);
    let cipher = Arc::new(ContentCipher::new(encryption_key));
    let fanout = Arc::new(FanoutHub::new());
    let metrics = Arc::new(DispatchMetrics::new());
    let audit = AuditLogger::new(audit_repo.clone());
    let notifier = StreamNotifier::new(
        participant_repo.clone() as Arc<dyn ParticipantRepository>,
        fanout.clone(),
        cipher.clone(),
    );

    let inbox = Arc::new(InboxService::new(InboxServiceDependencies {
        threads: threads.clone() as Arc<dyn ThreadRepository>,
        items: items.clone() as Arc<dyn ItemRepository>,
        rate_limiters: Arc::new(ChannelRateLimiters::new()),
        cipher: cipher.clone(),
        adapters: ChannelAdapters::new(
            conversation_repo.clone() as Arc<dyn ConversationRepository>,
            clock.clone(),
        ),
        audit: audit.clone(),
        notifier: notifier.clone(),
        metrics: metrics.clone(),
        clock: clock.clone(),
        default_tenant: "default".to_string(),
    }));

    let conversations = Arc::new(ConversationService::new(ConversationServiceDependencies {
        conversations: conversation_repo.clone() as Arc<dyn ConversationRepository>,
        participants: participant_repo.clone() as Arc<dyn ParticipantRepository>,
        items: items.clone() as Arc<dyn ItemRepository>,
        cipher,
        audit,
        clock,
        default_tenant: "default".to_string(),
    }));

    TestHarness {
        inbox,
        conversations,
        notifier,
        fanout,
        metrics,
        threads,
        items,
        conversation_repo,
        participant_repo,
        audit_repo,
    }
}

pub fn address(value: &str) -> Address {
    Address::parse(value).unwrap()
}

/// 预置一个 other 类型的会话与参与者
pub async fn seed_conversation(
    harness: &TestHarness,
    participants: &[(&str, ParticipantRole)],
) -> ConversationId {
    let now = chrono::Utc::now();
    let conversation = Conversation {
        id: ConversationId::generate(),
        tenant_id: "default".to_string(),
        kind: ConversationKind::Other,
        order_id: None,
        owner_user_id: None,
        metadata: None,
        last_message_at: None,
        created_at: now,
        updated_at: now,
    };
    let conversation = harness
        .conversation_repo
        .create(conversation)
        .await
        .unwrap();

    for (addr, role) in participants {
        harness
            .participant_repo
            .upsert(Participant {
                conversation_id: conversation.id,
                address: address(addr),
                role: *role,
                user_id: None,
                joined_at: now,
            })
            .await
            .unwrap();
    }

    conversation.id
}

pub fn chat_payload(conversation_id: ConversationId, from: &str, text: &str) -> JsonValue {
    json!({
        "conversationId": conversation_id.to_string(),
        "address": from,
        "channel": "chat",
        "content": { "key": "chat.message", "args": { "text": text } },
    })
}
