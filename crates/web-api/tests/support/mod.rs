//! Web API 集成测试装配：内存仓储 + 随机端口上的真实服务器

#![allow(dead_code)]

use std::sync::Arc;

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
use web_api::{router, AppState};

pub struct TestApp {
    pub base: String,
    pub conversation_repo: Arc<MemoryConversationRepository>,
    pub participant_repo: Arc<MemoryParticipantRepository>,
}

pub async fn spawn_app(encryption_key: Option<&str>) -> TestApp {
    let threads = Arc::new(MemoryThreadRepository::new());
    let items = Arc::new(MemoryItemRepository::new());
    let conversation_repo = Arc::new(MemoryConversationRepository::new());
    let participant_repo = Arc::new(MemoryParticipantRepository::new(conversation_repo.clone()));
    let audit_repo = Arc::new(MemoryAuditLogRepository::new());

    let clock: Arc<dyn application::Clock> = Arc::new(SystemClock);
    let cipher = Arc::new(ContentCipher::new(encryption_key));
    let fanout = Arc::new(FanoutHub::new());
    let metrics = Arc::new(DispatchMetrics::new());
    let audit = AuditLogger::new(audit_repo);
    let notifier = StreamNotifier::new(
        participant_repo.clone() as Arc<dyn ParticipantRepository>,
        fanout.clone(),
        cipher.clone(),
    );

    let inbox_service = Arc::new(InboxService::new(InboxServiceDependencies {
        threads: threads as Arc<dyn ThreadRepository>,
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

    let conversation_service = Arc::new(ConversationService::new(
        ConversationServiceDependencies {
            conversations: conversation_repo.clone() as Arc<dyn ConversationRepository>,
            participants: participant_repo.clone() as Arc<dyn ParticipantRepository>,
            items: items as Arc<dyn ItemRepository>,
            cipher,
            audit,
            clock,
            default_tenant: "default".to_string(),
        },
    ));

    let state = AppState::new(
        inbox_service,
        conversation_service,
        notifier,
        fanout,
        metrics,
    );

    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestApp {
        base: format!("http://{addr}"),
        conversation_repo,
        participant_repo,
    }
}

pub async fn seed_conversation(
    app: &TestApp,
    participants: &[(&str, ParticipantRole)],
) -> ConversationId {
    let now = chrono::Utc::now();
    let conversation = app
        .conversation_repo
        .create(Conversation {
            id: ConversationId::generate(),
            tenant_id: "default".to_string(),
            kind: ConversationKind::Other,
            order_id: None,
            owner_user_id: None,
            metadata: None,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    for (addr, role) in participants {
        app.participant_repo
            .upsert(Participant {
                conversation_id: conversation.id,
                address: Address::parse(*addr).unwrap(),
                role: *role,
                user_id: None,
                joined_at: now,
            })
            .await
            .unwrap();
    }

    conversation.id
}

pub fn chat_body(
    conversation_id: ConversationId,
    from: &str,
    text: &str,
) -> serde_json::Value {
    serde_json::json!({
        "conversationId": conversation_id.to_string(),
        "address": from,
        "channel": "chat",
        "content": { "key": "chat.message", "args": { "text": text } },
    })
}
