//! 主应用程序入口
//!
//! 装配仓储、用例服务与 Axum 路由，启动收件箱投递服务。

use std::sync::Arc;

use application::{
    AuditLogger, ChannelAdapters, ChannelRateLimiters, ContentCipher, ConversationService,
    ConversationServiceDependencies, DispatchMetrics, FanoutHub, InboxService,
    InboxServiceDependencies, StreamNotifier, SystemClock,
};
use config::AppConfig;
use domain::{
    AuditLogRepository, ConversationRepository, ItemRepository, ParticipantRepository,
    ThreadRepository,
};
use infrastructure::{
    create_pg_pool, PgAuditLogRepository, PgConversationRepository, PgItemRepository,
    PgParticipantRepository, PgThreadRepository,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app_config = AppConfig::from_env();

    tracing::info!(
        "连接数据库: {}",
        app_config
            .database
            .url
            .split('@')
            .next_back()
            .unwrap_or("unknown")
    );

    let pg_pool = create_pg_pool(
        &app_config.database.url,
        app_config.database.max_connections,
    )
    .await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    // 仓储
    let threads: Arc<dyn ThreadRepository> = Arc::new(PgThreadRepository::new(pg_pool.clone()));
    let items: Arc<dyn ItemRepository> = Arc::new(PgItemRepository::new(pg_pool.clone()));
    let conversations: Arc<dyn ConversationRepository> =
        Arc::new(PgConversationRepository::new(pg_pool.clone()));
    let participants: Arc<dyn ParticipantRepository> =
        Arc::new(PgParticipantRepository::new(pg_pool.clone()));
    let audit_logs: Arc<dyn AuditLogRepository> = Arc::new(PgAuditLogRepository::new(pg_pool));

    // 进程内组件
    let clock: Arc<dyn application::Clock> = Arc::new(SystemClock);
    let cipher = Arc::new(ContentCipher::new(
        app_config.inbox.encryption_key.as_deref(),
    ));
    if cipher.is_active() {
        tracing::info!("内容信封加密已启用");
    }
    let fanout = Arc::new(FanoutHub::new());
    let metrics = Arc::new(DispatchMetrics::new());
    let rate_limiters = Arc::new(ChannelRateLimiters::new());
    let audit = AuditLogger::new(audit_logs);
    let notifier = StreamNotifier::new(participants.clone(), fanout.clone(), cipher.clone());

    // 用例服务
    let inbox_service = InboxService::new(InboxServiceDependencies {
        threads,
        items: items.clone(),
        rate_limiters,
        cipher: cipher.clone(),
        adapters: ChannelAdapters::new(conversations.clone(), clock.clone()),
        audit: audit.clone(),
        notifier: notifier.clone(),
        metrics: metrics.clone(),
        clock: clock.clone(),
        default_tenant: app_config.inbox.default_tenant.clone(),
    });

    let conversation_service = ConversationService::new(ConversationServiceDependencies {
        conversations,
        participants,
        items,
        cipher,
        audit,
        clock,
        default_tenant: app_config.inbox.default_tenant.clone(),
    });

    let state = AppState::new(
        Arc::new(inbox_service),
        Arc::new(conversation_service),
        notifier,
        fanout,
        metrics,
    );

    // 启动 Web 服务器
    let app = router(state);
    let bind = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;

    tracing::info!("收件箱服务器启动在 http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}
