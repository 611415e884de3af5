#![cfg(feature = "inmem-store")]

use std::sync::Arc;
use std::time::Duration;

use feedback_service::models::*;
use feedback_service::queue::{handle_envelope, Action, ChannelSource, Envelope, FeedbackConsumer, Outcome, QueueError};
use feedback_service::repo::{inmem::InMemFeedbackStore, FeedbackStore, StoreError};
use serde_json::{json, Value};

fn envelope(action: &str, payload: Value) -> Envelope {
    let raw = json!({"action": action, "version": "1", "payload": payload});
    Envelope::decode(raw.to_string().as_bytes()).unwrap()
}

fn create_payload(receiver_id: i64, kind: &str, offer_hash: &str, trade_hash: &str) -> Value {
    json!({
        "sender_id": 1,
        "receiver_id": receiver_id,
        "trade_id": 10,
        "offer_hash": offer_hash,
        "trade_hash": trade_hash,
        "message": "queued feedback",
        "type": kind
    })
}

async fn only_row(store: &InMemFeedbackStore) -> Feedback {
    let all = FeedbackFilter { with_trashed: true, ..Default::default() };
    let mut page = store.find(&all).await.unwrap();
    assert_eq!(page.total, 1);
    page.items.remove(0)
}

#[tokio::test]
async fn every_action_reaches_the_store() {
    let store = InMemFeedbackStore::new();

    let out = handle_envelope(&store, &envelope("create-action", create_payload(2, "positive", "offer-a", "trade-1")))
        .await
        .unwrap();
    assert_eq!(out, Outcome::Applied(Action::Create));
    let id = only_row(&store).await.id;
    assert_eq!(store.stats(2).await.unwrap().positive, 1);

    handle_envelope(&store, &envelope("update-action", json!({"feedback_id": id, "type": "negative"})))
        .await
        .unwrap();
    let stats = store.stats(2).await.unwrap();
    assert_eq!((stats.positive, stats.negative), (0, 1));

    handle_envelope(
        &store,
        &envelope("change-trade-status-action", json!({"trade_hash": "trade-1", "trade_status": "completed"})),
    )
    .await
    .unwrap();
    assert_eq!(only_row(&store).await.trade_status.as_deref(), Some("completed"));

    handle_envelope(
        &store,
        &envelope("delete-offer-action", json!({"offer_hash": "offer-a", "deleted_at": "2021-09-06 05:01:43"})),
    )
    .await
    .unwrap();
    assert_eq!(only_row(&store).await.offer_deleted_at, Some(timestamp::parse("2021-09-06 05:01:43").unwrap()));

    handle_envelope(&store, &envelope("delete-action", json!({"trade_hash": "trade-1"}))).await.unwrap();
    assert!(only_row(&store).await.deleted_at.is_some());
    assert_eq!(store.stats(2).await.unwrap().negative, 0);
}

#[tokio::test]
async fn unknown_action_is_skipped() {
    let store = InMemFeedbackStore::new();
    let out = handle_envelope(&store, &envelope("archive-action", json!({}))).await.unwrap();
    assert_eq!(out, Outcome::Skipped("archive-action".into()));
    assert_eq!(store.find(&FeedbackFilter::default()).await.unwrap().total, 0);
}

#[tokio::test]
async fn bad_payloads_fail_the_message_only() {
    let store = InMemFeedbackStore::new();

    let err = handle_envelope(&store, &envelope("create-action", create_payload(2, "meh", "o", "t")))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Store(StoreError::Validation(ref e)) if e.contains("type")));

    let err = handle_envelope(&store, &envelope("delete-action", json!({}))).await.unwrap_err();
    assert!(matches!(err, QueueError::InvalidPayload(_)));

    let err = handle_envelope(&store, &envelope("update-action", json!({"message": "no target id"})))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Decode(_)));

    let err = handle_envelope(&store, &envelope("delete-action", json!({"feedback_id": 41}))).await.unwrap_err();
    assert!(matches!(err, QueueError::Store(StoreError::NotFound)));
}

#[tokio::test]
async fn consumer_survives_garbage_and_processes_the_rest() {
    let store = Arc::new(InMemFeedbackStore::new());
    let consumer = FeedbackConsumer::new(store.clone()).with_error_backoff(Duration::from_millis(1));

    assert!(consumer.dispatch(b"{{{ not json").is_none());

    let (tx, source) = ChannelSource::new(8);
    let run = tokio::spawn({
        let consumer = consumer.clone();
        async move { consumer.run(source).await }
    });

    tx.send(b"garbage".to_vec()).await.unwrap();
    let msg = json!({"action": "create-action", "version": "1", "payload": create_payload(7, "positive", "o", "t")});
    tx.send(msg.to_string().into_bytes()).await.unwrap();
    let msg = json!({"action": "mystery-action", "payload": {}});
    tx.send(msg.to_string().into_bytes()).await.unwrap();
    drop(tx);
    run.await.unwrap();

    // handlers are fire-and-forget; wait for the spawned create to land
    let mut stats = None;
    for _ in 0..100 {
        if let Ok(s) = store.stats(7).await {
            stats = Some(s);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(stats.map(|s| s.positive), Some(1));
}

#[tokio::test]
async fn dispatch_returns_a_joinable_handle() {
    let store = Arc::new(InMemFeedbackStore::new());
    let consumer = FeedbackConsumer::new(store.clone());
    let msg = json!({"action": "create-action", "payload": create_payload(3, "negative", "o", "t")});
    let handle = consumer.dispatch(msg.to_string().as_bytes()).unwrap();
    handle.await.unwrap();
    assert_eq!(store.stats(3).await.unwrap().negative, 1);
}
