//! 投递管道用例服务
//!
//! 编排 校验 → 租户归一 → 分类 → 限流 → 线程解析 → 去重 →
//! 加密 → 持久化 → 审计 → 通道分发 → 自动送达 → 实时扇出。
//! 去重检查通过后管道不再中途取消：要么跑完，要么以记录过的错误失败。

use std::sync::Arc;
use std::time::Instant;

use data_encoding::HEXLOWER;
use ring::digest;
use serde_json::{json, Value as JsonValue};

use domain::{
    Address, AuditRecord, Content, ConversationId, DeliveryStatus, InboxItem, InboxThread,
    ItemId, ItemRepository, Meta, RepositoryError, ThreadId, ThreadRepository,
};

use crate::adapters::ChannelAdapters;
use crate::audit::AuditLogger;
use crate::classifier::classify;
use crate::clock::Clock;
use crate::encryption::ContentCipher;
use crate::error::{ApplicationError, ApplicationResult};
use crate::notifier::StreamNotifier;
use crate::observability::DispatchMetrics;
use crate::payload::{IngestOptions, IngestPayload};
use crate::rate_limiter::ChannelRateLimiters;

/// 一次投递的结果
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub item: InboxItem,
    pub thread: InboxThread,
    /// true 表示命中已有条目，没有产生任何新的副作用
    pub deduped: bool,
}

/// 条目列表查询
#[derive(Debug, Clone, Default)]
pub struct ListItemsQuery {
    pub thread_id: Option<ThreadId>,
    pub conversation_id: Option<ConversationId>,
    pub limit: Option<u32>,
}

const LIST_LIMIT_DEFAULT: u32 = 100;
const LIST_LIMIT_MAX: u32 = 200;
const READ_BATCH_LIMIT: u32 = 2000;

pub struct InboxServiceDependencies {
    pub threads: Arc<dyn ThreadRepository>,
    pub items: Arc<dyn ItemRepository>,
    pub rate_limiters: Arc<ChannelRateLimiters>,
    pub cipher: Arc<ContentCipher>,
    pub adapters: ChannelAdapters,
    pub audit: AuditLogger,
    pub notifier: StreamNotifier,
    pub metrics: Arc<DispatchMetrics>,
    pub clock: Arc<dyn Clock>,
    pub default_tenant: String,
}

pub struct InboxService {
    deps: InboxServiceDependencies,
}

impl InboxService {
    pub fn new(deps: InboxServiceDependencies) -> Self {
        Self { deps }
    }

    /// 接收一条投递请求
    pub async fn ingest(
        &self,
        raw: JsonValue,
        options: IngestOptions,
    ) -> ApplicationResult<IngestOutcome> {
        // 1. 校验
        let payload = IngestPayload::parse(raw)?;
        let address = payload
            .address
            .as_deref()
            .map(Address::parse)
            .transpose()?;

        // 2. 租户归一
        let tenant_id = normalize_tenant(payload.tenant_id.as_deref(), &self.deps.default_tenant);

        // 3. 内容分类，调用方给定的级别只会被提升
        let classification = classify(&payload.content, payload.pii_class);

        // 4. 限流
        if !options.bypass_rate_limit {
            let identity = address
                .as_ref()
                .map(|a| a.as_str().to_string())
                .or_else(|| payload.user_id.map(|id| id.to_string()))
                .or_else(|| payload.thread_id.map(|id| id.to_string()));
            let decision =
                self.deps
                    .rate_limiters
                    .consume(&tenant_id, payload.channel, identity.as_deref());
            if !decision.allowed {
                return Err(ApplicationError::RateLimited {
                    retry_after: decision.retry_after.unwrap_or_default(),
                });
            }
        }

        // 5. 线程解析
        let thread = self.resolve_thread(&payload, &tenant_id).await?;

        // 6. 去重键：调用方提供的键优先，否则由内容+元数据+线程派生
        let dedupe_key = payload
            .dedupe_key
            .clone()
            .unwrap_or_else(|| derive_dedupe_key(&payload.content, payload.meta.as_ref(), thread.id));

        // 7. 去重检查：命中即返回，不产生任何新副作用
        if let Some(existing) = self.deps.items.find_by_dedupe_key(&dedupe_key).await? {
            return Ok(IngestOutcome {
                item: existing,
                thread,
                deduped: true,
            });
        }

        // 8. 加密：信封携带真实负载时明文字段只存脱敏摘要
        let envelope = self.deps.cipher.wrap(&payload.content)?;
        let content_to_persist = if envelope.is_some() {
            payload.content.summarize()
        } else {
            payload.content.clone()
        };

        // 9. 持久化为 pending
        let now = self.deps.clock.now();
        let item = InboxItem {
            id: ItemId::generate(),
            tenant_id: tenant_id.clone(),
            thread_id: thread.id,
            conversation_id: payload.conversation_id.or(thread.conversation_id),
            order_id: payload.order_id.or(thread.order_id),
            user_id: payload.user_id,
            address,
            item_type: payload.item_type,
            importance: payload.importance,
            channel: payload.channel,
            lang: payload.lang.clone(),
            content: content_to_persist,
            encrypted_content: envelope,
            meta: payload.meta.clone(),
            classification: classification.tags.iter().cloned().collect(),
            pii_class: classification.level,
            status: payload.status.unwrap_or_default(),
            dedupe_key: dedupe_key.clone(),
            retry_count: 0,
            next_attempt_at: payload.next_attempt_at,
            delivered_at: None,
            read_at: None,
            read_by: Vec::new(),
            expires_at: payload.expires_at,
            created_at: now,
            updated_at: now,
        };

        let mut item = match self.deps.items.create(item).await {
            Ok(created) => created,
            // 并发重复提交：唯一约束挡下第二次创建，改读已有条目
            Err(RepositoryError::UniqueViolation { .. }) => {
                let existing = self
                    .deps
                    .items
                    .find_by_dedupe_key(&dedupe_key)
                    .await?
                    .ok_or_else(|| {
                        ApplicationError::internal(
                            "dedupe key conflicted but the existing item is gone",
                        )
                    })?;
                return Ok(IngestOutcome {
                    item: existing,
                    thread,
                    deduped: true,
                });
            }
            Err(other) => return Err(other.into()),
        };

        // 10. 审计：只携带非敏感元数据，永不包含原文
        self.deps
            .audit
            .record(AuditRecord {
                actor_address: options.actor_address.clone(),
                actor_user_id: options.actor_user_id,
                action: "inbox_item_created".to_string(),
                entity_type: "inbox_item".to_string(),
                entity_id: Some(item.id.to_string()),
                tenant_id: Some(tenant_id.clone()),
                metadata: Some(json!({
                    "channel": item.channel.as_str(),
                    "importance": item.importance.as_str(),
                    "threadId": thread.id.to_string(),
                    "piiClass": item.pii_class.as_str(),
                    "classification": item.classification,
                })),
                created_at: now,
            })
            .await;

        // 11. 通道分发，记录延迟与结果
        let channel = item.channel;
        let started = Instant::now();
        let dispatched = self.dispatch(&mut item).await;
        match dispatched {
            Ok(()) => {
                self.deps
                    .metrics
                    .record(channel, "delivered", started.elapsed());
            }
            Err(error) => {
                self.deps.metrics.record(channel, "failed", started.elapsed());
                tracing::error!(
                    item_id = %item.id,
                    channel = %channel,
                    error = %error,
                    "条目已持久化，但通道分发失败"
                );
                return Err(error);
            }
        }

        // 12. 同步通道兜底送达
        if item.channel.is_synchronous() && item.status != DeliveryStatus::Delivered {
            item.mark_delivered(self.deps.clock.now());
            self.deps.items.update(item.clone()).await?;
        }

        // 分发可能更新了条目，返回前重新读取最终状态
        let item = self
            .deps
            .items
            .find_by_id(item.id)
            .await?
            .ok_or_else(|| ApplicationError::internal("persisted item disappeared"))?;

        // 实时扇出，尽力而为
        self.deps.notifier.notify_new_item(&item).await;

        Ok(IngestOutcome {
            item,
            thread,
            deduped: false,
        })
    }

    async fn dispatch(&self, item: &mut InboxItem) -> ApplicationResult<()> {
        self.deps.adapters.dispatch(item).await?;
        self.deps
            .items
            .update(item.clone())
            .await
            .map_err(|error| ApplicationError::Adapter {
                channel: item.channel.as_str(),
                message: error.to_string(),
            })?;
        Ok(())
    }

    /// 线程解析：显式线程ID优先，其次按 (tenant, conversation, order)
    /// 组合复用，都没有时惰性创建
    async fn resolve_thread(
        &self,
        payload: &IngestPayload,
        tenant_id: &str,
    ) -> ApplicationResult<InboxThread> {
        if let Some(thread_id) = payload.thread_id {
            if let Some(existing) = self.deps.threads.find_by_id(thread_id).await? {
                return Ok(existing);
            }
        }

        if let Some(existing) = self
            .deps
            .threads
            .find_by_context(tenant_id, payload.conversation_id, payload.order_id)
            .await?
        {
            return Ok(existing);
        }

        let now = self.deps.clock.now();
        let thread = InboxThread {
            id: ThreadId::generate(),
            tenant_id: tenant_id.to_string(),
            conversation_id: payload.conversation_id,
            order_id: payload.order_id,
            metadata: payload
                .meta
                .as_ref()
                .and_then(|meta| serde_json::to_value(meta).ok()),
            dedupe_hint: payload.dedupe_key.clone(),
            created_at: now,
            updated_at: now,
        };
        Ok(self.deps.threads.create(thread).await?)
    }

    /// 列出线程或会话内的条目，创建时间升序
    pub async fn list_items(&self, query: ListItemsQuery) -> ApplicationResult<Vec<InboxItem>> {
        let limit = query
            .limit
            .unwrap_or(LIST_LIMIT_DEFAULT)
            .min(LIST_LIMIT_MAX);

        if let Some(thread_id) = query.thread_id {
            return Ok(self.deps.items.list_by_thread(thread_id, limit).await?);
        }
        if let Some(conversation_id) = query.conversation_id {
            return Ok(self
                .deps
                .items
                .list_by_conversation(conversation_id, limit)
                .await?);
        }
        Err(ApplicationError::validation(
            "threadId or conversationId is required",
        ))
    }

    /// 把单个条目标记为指定地址已读
    pub async fn mark_item_read(
        &self,
        item_id: ItemId,
        address: &Address,
    ) -> ApplicationResult<InboxItem> {
        let mut item = self
            .deps
            .items
            .find_by_id(item_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found(format!("inbox_item {item_id}")))?;

        if item.mark_read_by(address, self.deps.clock.now()) {
            item = self.deps.items.update(item).await?;
        }
        Ok(item)
    }

    /// 把会话内所有未读条目标记为已读，返回新标记的数量，
    /// 并向其余参与者广播已读回执
    pub async fn mark_conversation_read(
        &self,
        conversation_id: ConversationId,
        address: &Address,
    ) -> ApplicationResult<usize> {
        let unread = self
            .deps
            .items
            .list_unread_by_conversation(conversation_id, address, READ_BATCH_LIMIT)
            .await?;

        let now = self.deps.clock.now();
        let mut count = 0usize;
        for mut item in unread {
            if item.mark_read_by(address, now) {
                self.deps.items.update(item).await?;
                count += 1;
            }
        }

        self.deps
            .notifier
            .notify_read(conversation_id, address, now)
            .await?;

        Ok(count)
    }

    /// 还原条目内容用于对外展示
    pub fn effective_content(&self, item: &InboxItem) -> ApplicationResult<Content> {
        self.deps
            .cipher
            .unwrap(&item.content, item.encrypted_content.as_ref())
    }
}

fn normalize_tenant(tenant_id: Option<&str>, fallback: &str) -> String {
    match tenant_id.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => fallback.to_string(),
    }
}

/// 派生去重键：SHA-256(content + meta) 拼接线程ID。
/// 同一线程内重发的相同内容会被视为同一条逻辑消息。
pub fn derive_dedupe_key(content: &Content, meta: Option<&Meta>, thread_id: ThreadId) -> String {
    let serialized = json!({
        "content": content,
        "meta": meta.cloned().unwrap_or_default(),
    });
    let hash = digest::digest(&digest::SHA256, serialized.to_string().as_bytes());
    format!("{}:{}", HEXLOWER.encode(hash.as_ref()), thread_id)
}
