//! 长连接事件流
//!
//! SSE 端点：每个连接对应一个收件人地址的订阅；keep-alive 注释帧
//! 作为空闲心跳探测失效连接，连接断开时订阅随流的 Drop 被清理。

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use application::Subscription;
use domain::Address;

use crate::error::ApiError;
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    address: Option<String>,
}

pub async fn subscribe_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let address = Address::parse(query.address.as_deref().unwrap_or_default())
        .map_err(|_| ApiError::bad_request("address_required"))?;

    let subscription = state.fanout.subscribe(address);

    let ready = stream::once(async {
        Ok(Event::default().event("ready").data(r#"{"ok":true}"#))
    });

    // 订阅随流一起存活；客户端断开时流被 Drop，注册表条目同步清理
    let events = stream::unfold(subscription, |mut subscription: Subscription| async move {
        let event = subscription.recv().await?;
        Some((event, subscription))
    })
    .map(|event| {
        let name = event.event_name();
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event(name).data(data))
    });

    Ok(Sse::new(ready.chain(events)).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("keep-alive"),
    ))
}
