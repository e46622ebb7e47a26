//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：投递管道的编排、限流准入、
//! 内容分类与加密、实时扇出，以及对外部适配器（审计、观测）的抽象。

pub mod adapters;
pub mod audit;
pub mod classifier;
pub mod clock;
pub mod encryption;
pub mod error;
pub mod fanout;
pub mod notifier;
pub mod observability;
pub mod payload;
pub mod rate_limiter;
pub mod services;

pub use adapters::ChannelAdapters;
pub use audit::AuditLogger;
pub use classifier::{classify, Classification};
pub use clock::{Clock, SystemClock};
pub use encryption::ContentCipher;
pub use error::{ApplicationError, ApplicationResult};
pub use fanout::{FanoutHub, InboxEvent, MessagePayload, Subscription};
pub use notifier::StreamNotifier;
pub use observability::{DispatchMetrics, MetricsSnapshot};
pub use payload::{IngestOptions, IngestPayload};
pub use rate_limiter::{ChannelRateLimiters, RateDecision, RateLimiter};
pub use services::{
    derive_dedupe_key, ConversationService, ConversationServiceDependencies, ConversationSummary,
    InboxService, InboxServiceDependencies, IngestOutcome, ListItemsQuery, MessageView,
    ParticipantView,
};
