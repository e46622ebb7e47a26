//! SSE 长连接事件流测试

mod support;

use std::time::Duration;

use domain::ParticipantRole;
use reqwest::StatusCode;
use serde_json::json;
use support::{chat_body, seed_conversation, spawn_app};

/// 从 SSE 响应中持续读取，直到缓冲里出现目标片段
async fn read_until(response: &mut reqwest::Response, needle: &str) -> String {
    let mut buffer = String::new();
    loop {
        let chunk = tokio::time::timeout(Duration::from_secs(5), response.chunk())
            .await
            .expect("timed out waiting for SSE data")
            .expect("stream error")
            .expect("stream closed early");
        buffer.push_str(&String::from_utf8_lossy(&chunk));
        if buffer.contains(needle) {
            return buffer;
        }
    }
}

#[tokio::test]
async fn stream_requires_address() {
    let app = spawn_app(None).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/v1/stream", app.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn subscriber_receives_ready_then_typing_events() {
    let app = spawn_app(None).await;
    let conversation_id = seed_conversation(
        &app,
        &[
            ("addr-a", ParticipantRole::Maker),
            ("addr-b", ParticipantRole::Taker),
        ],
    )
    .await;
    let client = reqwest::Client::new();

    let mut stream = client
        .get(format!("{}/api/v1/stream?address=addr-b", app.base))
        .send()
        .await
        .unwrap();
    assert_eq!(stream.status(), StatusCode::OK);

    // 连接建立即收到 ready 事件
    read_until(&mut stream, "event: ready").await;

    client
        .post(format!("{}/api/v1/chat/typing", app.base))
        .json(&json!({
            "address": "addr-a",
            "conversationId": conversation_id.to_string(),
            "typing": true,
        }))
        .send()
        .await
        .unwrap();

    let buffer = read_until(&mut stream, "event: typing").await;
    assert!(buffer.contains("chat.typing"));
    assert!(buffer.contains("addr-a"));
}

#[tokio::test]
async fn subscriber_receives_message_events_with_plaintext() {
    let app = spawn_app(Some("stream-secret")).await;
    let conversation_id = seed_conversation(
        &app,
        &[
            ("addr-a", ParticipantRole::Maker),
            ("addr-b", ParticipantRole::Taker),
        ],
    )
    .await;
    let client = reqwest::Client::new();

    let mut stream = client
        .get(format!("{}/api/v1/stream?address=addr-b", app.base))
        .send()
        .await
        .unwrap();
    read_until(&mut stream, "event: ready").await;

    let response = client
        .post(format!("{}/api/v1/inbox", app.base))
        .json(&chat_body(conversation_id, "addr-a", "streamed hello"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // 加密启用时事件负载仍是解开后的明文
    let buffer = read_until(&mut stream, "event: message").await;
    assert!(buffer.contains("streamed hello"));
    assert!(buffer.contains("chat.message"));
}

#[tokio::test]
async fn sender_gets_their_own_message_echo() {
    let app = spawn_app(None).await;
    let conversation_id = seed_conversation(
        &app,
        &[
            ("addr-a", ParticipantRole::Maker),
            ("addr-b", ParticipantRole::Taker),
        ],
    )
    .await;
    let client = reqwest::Client::new();

    let mut stream = client
        .get(format!("{}/api/v1/stream?address=addr-a", app.base))
        .send()
        .await
        .unwrap();
    read_until(&mut stream, "event: ready").await;

    client
        .post(format!("{}/api/v1/inbox", app.base))
        .json(&chat_body(conversation_id, "addr-a", "echo check"))
        .send()
        .await
        .unwrap();

    let buffer = read_until(&mut stream, "event: message").await;
    assert!(buffer.contains("echo check"));
}
