//! 基础设施层实现。
//!
//! PostgreSQL 仓储是唯一的生产实现；内存仓储是测试替身，
//! 通过依赖注入使用，不作为运行时降级路径。

pub mod db;
pub mod memory;

pub use db::repositories::{
    PgAuditLogRepository, PgConversationRepository, PgItemRepository, PgParticipantRepository,
    PgThreadRepository,
};
pub use db::create_pg_pool;
pub use memory::{
    MemoryAuditLogRepository, MemoryConversationRepository, MemoryItemRepository,
    MemoryParticipantRepository, MemoryThreadRepository,
};
