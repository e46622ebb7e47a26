//! 收件箱系统核心领域模型
//!
//! 包含消息条目、线程、会话等核心实体，以及投递状态机相关的业务规则。

pub mod audit;
pub mod conversation;
pub mod errors;
pub mod inbox;
pub mod repositories;
pub mod value_objects;

// 重新导出常用类型
pub use audit::*;
pub use conversation::*;
pub use errors::*;
pub use inbox::*;
pub use repositories::*;
pub use value_objects::*;
