//! 会话访问控制与开通流程测试

mod support;

use application::{ApplicationError, IngestOptions};
use domain::{ConversationId, ConversationKind, Importance, OrderId, ParticipantRole};
use serde_json::json;
use support::{address, chat_payload, harness, seed_conversation};

#[tokio::test]
async fn participant_passes_and_stranger_is_forbidden() {
    let h = harness(None);
    let conversation_id = seed_conversation(
        &h,
        &[
            ("addr-a", ParticipantRole::Maker),
            ("addr-b", ParticipantRole::Taker),
        ],
    )
    .await;

    let participant = h
        .conversations
        .ensure_access(conversation_id, &address("addr-a"))
        .await
        .unwrap();
    assert_eq!(participant.role, ParticipantRole::Maker);

    let denied = h
        .conversations
        .ensure_access(conversation_id, &address("addr-z"))
        .await;
    assert!(matches!(denied, Err(ApplicationError::Forbidden(_))));

    // 地址比较基于规范化形式
    let normalized = h
        .conversations
        .ensure_access(conversation_id, &address("  ADDR-A "))
        .await;
    assert!(normalized.is_ok());
}

#[tokio::test]
async fn missing_conversation_is_not_found_not_forbidden() {
    let h = harness(None);

    let result = h
        .conversations
        .ensure_access(ConversationId::generate(), &address("addr-a"))
        .await;
    assert!(matches!(result, Err(ApplicationError::NotFound(_))));
}

#[tokio::test]
async fn favorites_conversation_is_created_once() {
    let h = harness(None);
    let addr = address("addr-a");

    let first = h
        .conversations
        .ensure_favorites_conversation(&addr)
        .await
        .unwrap();
    assert_eq!(first.kind, ConversationKind::Favorites);

    let second = h
        .conversations
        .ensure_favorites_conversation(&addr)
        .await
        .unwrap();
    assert_eq!(second.id, first.id);

    // 开通后 owner 即可通过访问检查
    let participant = h
        .conversations
        .ensure_access(first.id, &addr)
        .await
        .unwrap();
    assert_eq!(participant.role, ParticipantRole::Owner);
}

#[tokio::test]
async fn order_conversation_provisions_maker_and_taker() {
    let h = harness(None);
    let order_id = OrderId::generate();

    let conversation = h
        .conversations
        .ensure_order_conversation(order_id, &address("maker-1"), Some(&address("taker-1")))
        .await
        .unwrap();
    assert_eq!(conversation.kind, ConversationKind::Order);

    let maker = h
        .conversations
        .ensure_access(conversation.id, &address("maker-1"))
        .await
        .unwrap();
    assert_eq!(maker.role, ParticipantRole::Maker);

    let taker = h
        .conversations
        .ensure_access(conversation.id, &address("taker-1"))
        .await
        .unwrap();
    assert_eq!(taker.role, ParticipantRole::Taker);

    // 同一订单复用会话
    let again = h
        .conversations
        .ensure_order_conversation(order_id, &address("maker-1"), None)
        .await
        .unwrap();
    assert_eq!(again.id, conversation.id);
}

#[tokio::test]
async fn history_is_gated_by_membership() {
    let h = harness(None);
    let conversation_id = seed_conversation(&h, &[("addr-a", ParticipantRole::Owner)]).await;

    h.inbox
        .ingest(
            chat_payload(conversation_id, "addr-a", "note to self"),
            IngestOptions::default(),
        )
        .await
        .unwrap();

    let (conversation, messages) = h
        .conversations
        .history(conversation_id, &address("addr-a"))
        .await
        .unwrap();
    assert_eq!(conversation.id, conversation_id);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "note to self");
    // 尚未标记已读之前，对任何地址都是未读
    assert!(messages[0].unread);

    let denied = h
        .conversations
        .history(conversation_id, &address("addr-z"))
        .await;
    assert!(matches!(denied, Err(ApplicationError::Forbidden(_))));
}

#[tokio::test]
async fn overview_reports_unread_counts_per_requester() {
    let h = harness(None);
    let conversation_id = seed_conversation(
        &h,
        &[
            ("addr-a", ParticipantRole::Maker),
            ("addr-b", ParticipantRole::Taker),
        ],
    )
    .await;

    for text in ["m1", "m2"] {
        h.inbox
            .ingest(
                chat_payload(conversation_id, "addr-a", text),
                IngestOptions::default(),
            )
            .await
            .unwrap();
    }

    let overview = h
        .conversations
        .list_overview(&address("addr-b"))
        .await
        .unwrap();
    assert_eq!(overview.len(), 1);
    let summary = &overview[0];
    assert_eq!(summary.total_messages, 2);
    assert_eq!(summary.unread_count, 2);
    assert_eq!(summary.participants.len(), 2);
    let last = summary.last_message.as_ref().unwrap();
    assert_eq!(last.text, "m2");

    h.inbox
        .mark_conversation_read(conversation_id, &address("addr-b"))
        .await
        .unwrap();

    let overview = h
        .conversations
        .list_overview(&address("addr-b"))
        .await
        .unwrap();
    assert_eq!(overview[0].unread_count, 0);
}

#[tokio::test]
async fn first_overview_provisions_favorites_and_returns_empty() {
    let h = harness(None);
    let addr = address("addr-new");

    let overview = h.conversations.list_overview(&addr).await.unwrap();
    assert!(overview.is_empty());

    // 第二次就能看到刚开通的收藏夹
    let overview = h.conversations.list_overview(&addr).await.unwrap();
    assert_eq!(overview.len(), 1);
    assert_eq!(overview[0].kind, "favorites");
}

#[tokio::test]
async fn mark_important_merges_metadata() {
    let h = harness(None);
    let conversation_id = seed_conversation(&h, &[("addr-a", ParticipantRole::Owner)]).await;

    let updated = h
        .conversations
        .mark_important(conversation_id, Importance::High)
        .await
        .unwrap();
    assert_eq!(updated.metadata.unwrap()["importance"], json!("high"));

    let missing = h
        .conversations
        .mark_important(ConversationId::generate(), Importance::High)
        .await;
    assert!(matches!(missing, Err(ApplicationError::NotFound(_))));
}
