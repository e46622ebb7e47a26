//! 实时扇出目标规则测试

mod support;

use application::{InboxEvent, IngestOptions};
use domain::ParticipantRole;
use support::{address, chat_payload, harness, seed_conversation};

#[tokio::test]
async fn message_event_reaches_participants_and_sender_echo() {
    let h = harness(None);
    let conversation_id = seed_conversation(
        &h,
        &[
            ("addr-a", ParticipantRole::Maker),
            ("addr-b", ParticipantRole::Taker),
        ],
    )
    .await;

    let mut sender_tab1 = h.fanout.subscribe(address("addr-a"));
    let mut sender_tab2 = h.fanout.subscribe(address("addr-a"));
    let mut peer = h.fanout.subscribe(address("addr-b"));
    let mut stranger = h.fanout.subscribe(address("addr-c"));

    let outcome = h
        .inbox
        .ingest(
            chat_payload(conversation_id, "addr-a", "hello there"),
            IngestOptions::default(),
        )
        .await
        .unwrap();

    // 发送者的每个连接都收到自己的回显
    for subscription in [&mut sender_tab1, &mut sender_tab2, &mut peer] {
        match subscription.try_recv() {
            Some(InboxEvent::Message {
                conversation_id: cid,
                message,
            }) => {
                assert_eq!(cid, conversation_id.to_string());
                assert_eq!(message.id, outcome.item.id.to_string());
                assert_eq!(message.text, "hello there");
                assert_eq!(message.address, "addr-a");
            }
            other => panic!("expected message event, got {other:?}"),
        }
    }

    assert!(stranger.try_recv().is_none());
}

#[tokio::test]
async fn typing_event_never_reaches_sender() {
    let h = harness(None);
    let conversation_id = seed_conversation(
        &h,
        &[
            ("addr-a", ParticipantRole::Maker),
            ("addr-b", ParticipantRole::Taker),
        ],
    )
    .await;

    let mut sender = h.fanout.subscribe(address("addr-a"));
    let mut peer = h.fanout.subscribe(address("addr-b"));

    h.notifier
        .notify_typing(conversation_id, &address("addr-a"), true)
        .await
        .unwrap();

    assert!(sender.try_recv().is_none());
    match peer.try_recv() {
        Some(InboxEvent::Typing { from, typing, .. }) => {
            assert_eq!(from, "addr-a");
            assert!(typing);
        }
        other => panic!("expected typing event, got {other:?}"),
    }
}

#[tokio::test]
async fn read_event_never_reaches_reader_and_counts_unread() {
    let h = harness(None);
    let conversation_id = seed_conversation(
        &h,
        &[
            ("addr-a", ParticipantRole::Maker),
            ("addr-b", ParticipantRole::Taker),
        ],
    )
    .await;

    for text in ["one", "two", "three"] {
        h.inbox
            .ingest(
                chat_payload(conversation_id, "addr-a", text),
                IngestOptions::default(),
            )
            .await
            .unwrap();
    }

    let mut writer = h.fanout.subscribe(address("addr-a"));
    let mut reader = h.fanout.subscribe(address("addr-b"));

    let count = h
        .inbox
        .mark_conversation_read(conversation_id, &address("addr-b"))
        .await
        .unwrap();
    assert_eq!(count, 3);

    // 再读一次不再有新标记
    let again = h
        .inbox
        .mark_conversation_read(conversation_id, &address("addr-b"))
        .await
        .unwrap();
    assert_eq!(again, 0);

    assert!(reader.try_recv().is_none(), "读取者不收到自己的回执");
    match writer.try_recv() {
        Some(InboxEvent::Read { by, .. }) => assert_eq!(by, "addr-b"),
        other => panic!("expected read event, got {other:?}"),
    }
}

#[tokio::test]
async fn encrypted_items_fan_out_plaintext_to_subscribers() {
    let h = harness(Some("fanout-secret"));
    let conversation_id = seed_conversation(&h, &[("addr-a", ParticipantRole::Owner)]).await;

    let mut subscription = h.fanout.subscribe(address("addr-a"));

    h.inbox
        .ingest(
            chat_payload(conversation_id, "addr-a", "visible to subscribers"),
            IngestOptions::default(),
        )
        .await
        .unwrap();

    match subscription.try_recv() {
        Some(InboxEvent::Message { message, .. }) => {
            assert_eq!(message.text, "visible to subscribers");
        }
        other => panic!("expected message event, got {other:?}"),
    }
}
