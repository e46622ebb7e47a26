//! Web API 层。
//!
//! 提供 Axum 路由，将 HTTP / SSE 请求委托给应用层的用例服务。

mod dto;
mod error;
mod routes;
mod state;
mod stream;

pub use dto::{ConversationDto, ItemDto, ThreadDto};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
