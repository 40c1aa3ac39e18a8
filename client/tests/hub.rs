use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;

use client::board::uuid::Uuid;
use client::board::{channel_name, CursorEvent, RealtimeError, CURSOR_TOPIC};
use client::{ChannelProvider, MemoryChannelProvider, RealtimeChannel, RealtimeTopicHub};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn cursor(user_id: &str, x: f32, y: f32) -> CursorEvent {
    CursorEvent {
        user_id: user_id.to_string(),
        x,
        y,
    }
}

#[tokio::test]
async fn it_reuses_the_channel_for_repeated_opens() {
    init_logs();
    let provider = Arc::new(MemoryChannelProvider::new());
    let hub = RealtimeTopicHub::new(provider.clone());
    let session_id = Uuid::new_v4();

    hub.open_channel(session_id).await.expect("");
    hub.open_channel(session_id).await.expect("");

    assert_eq!(provider.connect_count(&channel_name(&session_id)), 1);
    assert!(hub.is_open(&session_id));
}

#[tokio::test]
async fn it_unregisters_on_last_detach_and_reregisters_on_attach() {
    init_logs();
    let provider = Arc::new(MemoryChannelProvider::new());
    let hub = RealtimeTopicHub::new(provider.clone());
    let session_id = Uuid::new_v4();
    let name = channel_name(&session_id);

    let mut first = hub
        .json_topic::<CursorEvent>(session_id, CURSOR_TOPIC)
        .await
        .expect("");
    assert_eq!(provider.handler_count(&name), 1);

    let early = cursor("u1", 1.0, 1.0);
    hub.publish(session_id, CURSOR_TOPIC, &early).await.expect("");
    assert_eq!(first.next().await, Some(Ok(early)));

    drop(first);
    assert_eq!(provider.handler_count(&name), 0);

    // Published while nobody listens; must not be replayed later.
    let missed = cursor("u1", 2.0, 2.0);
    hub.publish(session_id, CURSOR_TOPIC, &missed)
        .await
        .expect("");

    let mut second = hub
        .json_topic::<CursorEvent>(session_id, CURSOR_TOPIC)
        .await
        .expect("");
    assert_eq!(provider.handler_count(&name), 1);

    let late = cursor("u2", 3.0, 3.0);
    hub.publish(session_id, CURSOR_TOPIC, &late).await.expect("");
    assert_eq!(second.next().await, Some(Ok(late)));
}

#[tokio::test]
async fn it_drops_malformed_payloads_without_closing_the_topic() {
    init_logs();
    let provider = Arc::new(MemoryChannelProvider::new());
    let hub = RealtimeTopicHub::new(provider.clone());
    let session_id = Uuid::new_v4();

    let mut cursors = hub
        .json_topic::<CursorEvent>(session_id, CURSOR_TOPIC)
        .await
        .expect("");

    // A peer on the same channel sends something undecodable.
    let peer = provider
        .connect(&channel_name(&session_id))
        .await
        .expect("");
    peer.send(CURSOR_TOPIC, json!("garbage")).await.expect("");
    peer.send(CURSOR_TOPIC, json!({"x": "not a number"}))
        .await
        .expect("");

    let valid = cursor("u1", 10.0, 20.0);
    hub.publish(session_id, CURSOR_TOPIC, &valid).await.expect("");
    assert_eq!(cursors.next().await, Some(Ok(valid)));
}

#[tokio::test]
async fn it_fails_publish_without_an_open_channel() {
    init_logs();
    let provider = Arc::new(MemoryChannelProvider::new());
    let hub = RealtimeTopicHub::new(provider);
    let session_id = Uuid::new_v4();

    let err = hub
        .publish(session_id, CURSOR_TOPIC, &cursor("u1", 0.0, 0.0))
        .await
        .unwrap_err();
    assert_eq!(err, RealtimeError::ChannelNotOpen { session_id });
}

#[tokio::test]
async fn it_broadcasts_to_every_attached_listener() {
    init_logs();
    let provider = Arc::new(MemoryChannelProvider::new());
    let hub = RealtimeTopicHub::new(provider.clone());
    let session_id = Uuid::new_v4();

    let mut left = hub
        .json_topic::<CursorEvent>(session_id, CURSOR_TOPIC)
        .await
        .expect("");
    let mut right = hub
        .json_topic::<CursorEvent>(session_id, CURSOR_TOPIC)
        .await
        .expect("");
    // One registration on the channel no matter how many listeners.
    assert_eq!(provider.handler_count(&channel_name(&session_id)), 1);

    let round_trip = cursor("u1", 10.0, 20.0);
    hub.publish(session_id, CURSOR_TOPIC, &round_trip)
        .await
        .expect("");

    assert_eq!(left.next().await, Some(Ok(round_trip.clone())));
    assert_eq!(right.next().await, Some(Ok(round_trip)));
}

#[tokio::test]
async fn it_preserves_per_topic_delivery_order() {
    init_logs();
    let provider = Arc::new(MemoryChannelProvider::new());
    let hub = RealtimeTopicHub::new(provider);
    let session_id = Uuid::new_v4();

    let mut cursors = hub
        .json_topic::<CursorEvent>(session_id, CURSOR_TOPIC)
        .await
        .expect("");
    for i in 0..3 {
        hub.publish(session_id, CURSOR_TOPIC, &cursor("u1", i as f32, 0.0))
            .await
            .expect("");
    }
    for i in 0..3 {
        assert_eq!(cursors.next().await, Some(Ok(cursor("u1", i as f32, 0.0))));
    }
}

#[tokio::test]
async fn it_delivers_across_clients_sharing_a_channel() {
    init_logs();
    let provider = Arc::new(MemoryChannelProvider::new());
    let alice = RealtimeTopicHub::new(provider.clone());
    let bob = RealtimeTopicHub::new(provider.clone());
    let session_id = Uuid::new_v4();

    let mut bob_cursors = bob
        .json_topic::<CursorEvent>(session_id, CURSOR_TOPIC)
        .await
        .expect("");
    alice.open_channel(session_id).await.expect("");

    let moved = cursor("alice", 5.0, 6.0);
    alice
        .publish(session_id, CURSOR_TOPIC, &moved)
        .await
        .expect("");
    assert_eq!(bob_cursors.next().await, Some(Ok(moved)));

    // Two clients, two connections onto the same named channel.
    assert_eq!(provider.connect_count(&channel_name(&session_id)), 2);
}

#[tokio::test]
async fn it_surfaces_channel_failure_as_a_terminal_error() {
    init_logs();
    let provider = Arc::new(MemoryChannelProvider::new());
    let hub = RealtimeTopicHub::new(provider.clone());
    let session_id = Uuid::new_v4();

    let mut cursors = hub
        .json_topic::<CursorEvent>(session_id, CURSOR_TOPIC)
        .await
        .expect("");

    provider.fail(&channel_name(&session_id), "link down");

    match cursors.next().await {
        Some(Err(RealtimeError::Transport { .. })) => {}
        other => panic!("expected terminal transport error, got {:?}", other),
    }
    assert_eq!(cursors.next().await, None);

    // The hub forgot the session; reconnecting is the caller's move.
    assert!(!hub.is_open(&session_id));
    let err = hub
        .publish(session_id, CURSOR_TOPIC, &cursor("u1", 0.0, 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, RealtimeError::ChannelNotOpen { .. }));
}

#[tokio::test]
async fn it_reopens_after_a_failure() {
    init_logs();
    let provider = Arc::new(MemoryChannelProvider::new());
    let hub = RealtimeTopicHub::new(provider.clone());
    let session_id = Uuid::new_v4();

    hub.open_channel(session_id).await.expect("");
    provider.fail(&channel_name(&session_id), "link down");
    assert!(!hub.is_open(&session_id));

    hub.open_channel(session_id).await.expect("");
    let mut cursors = hub
        .json_topic::<CursorEvent>(session_id, CURSOR_TOPIC)
        .await
        .expect("");
    let back = cursor("u1", 7.0, 8.0);
    hub.publish(session_id, CURSOR_TOPIC, &back).await.expect("");
    assert_eq!(cursors.next().await, Some(Ok(back)));
}
