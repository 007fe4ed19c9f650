use std::{sync::Arc, time::Duration};

use axum::extract::ws::Message;
use seed_sync_back::{
    config::AppConfig,
    dao::seed_store::memory::InMemorySeedStore,
    services::{broadcast_scheduler, persistence_sync, websocket_service},
    state::{AppState, ClientConnection, SharedState},
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use uuid::Uuid;

type TestClient = (
    Uuid,
    mpsc::UnboundedSender<Message>,
    mpsc::UnboundedReceiver<Message>,
);

fn connect(state: &SharedState) -> TestClient {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();
    state.clients().insert(id, ClientConnection { id, tx: tx.clone() });
    (id, tx, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let Message::Text(text) = message {
            out.push(serde_json::from_str(text.as_str()).unwrap());
        }
    }
    out
}

fn increment(matt: [i64; 9], hail: [i64; 9]) -> String {
    json!({ "type": "increment", "matt": matt, "hail": hail }).to_string()
}

#[tokio::test]
async fn increments_flow_to_clients_and_storage() {
    let store = InMemorySeedStore::new()
        .with_list("seedsMatt", [5, 0, 0, 0, 0, 0, 0, 0, 0])
        .with_list("seedsHail", [0, 0, 0, 0, 0, 0, 0, 0, 1]);
    let state = AppState::new(AppConfig::default());
    state.set_seed_store(Arc::new(store.clone())).await;

    // Startup load: an immediate read matches the stored record.
    persistence_sync::run_cycle(&state).await.unwrap();
    let snapshot = state.snapshot().await;
    assert_eq!(snapshot.matt, [5, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(snapshot.hail, [0, 0, 0, 0, 0, 0, 0, 0, 1]);
    broadcast_scheduler::run_cycle(&state).await;

    let (writer_id, writer_tx, mut writer_rx) = connect(&state);
    let (_, _, mut watcher_rx) = connect(&state);

    websocket_service::handle_text(
        &state,
        writer_id,
        &writer_tx,
        &increment([1, 0, 0, 0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0, 0, 0, 0]),
    )
    .await
    .unwrap();
    websocket_service::handle_text(
        &state,
        writer_id,
        &writer_tx,
        &increment([0, 0, 0, 0, 0, 0, 0, 0, 0], [0, 0, 0, -3, 0, 0, 0, 0, 0]),
    )
    .await
    .unwrap();
    assert!(drain(&mut writer_rx).is_empty());

    assert_eq!(broadcast_scheduler::run_cycle(&state).await, Some(2));
    assert_eq!(broadcast_scheduler::run_cycle(&state).await, None);

    for rx in [&mut writer_rx, &mut watcher_rx] {
        let messages = drain(rx);
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0],
            json!({
                "type": "seedUpdate",
                "matt": [6, 0, 0, 0, 0, 0, 0, 0, 0],
                "hail": [0, 0, 0, -3, 0, 0, 0, 0, 1],
            })
        );
    }

    let report = persistence_sync::run_cycle(&state).await.unwrap();
    assert_eq!(report.written, 2);
    assert_eq!(store.list("seedsMatt").unwrap()[0], "6");
    assert_eq!(store.list("seedsHail").unwrap()[3], "-3");

    let report = persistence_sync::run_cycle(&state).await.unwrap();
    assert_eq!(report.written, 0);
}

#[tokio::test]
async fn rejected_messages_never_reach_other_clients() {
    let state = AppState::new(AppConfig::default());
    let (sender_id, sender_tx, mut sender_rx) = connect(&state);
    let (_, _, mut other_rx) = connect(&state);

    for payload in [
        r#"{"type":"foo"}"#.to_string(),
        r#"{"matt":[1,0,0,0,0,0,0,0,0]}"#.to_string(),
        json!({ "type": "increment", "matt": [1, 2, 3], "hail": [0, 0, 0, 0, 0, 0, 0, 0, 0] })
            .to_string(),
        json!({ "type": "increment", "matt": "1", "hail": [0, 0, 0, 0, 0, 0, 0, 0, 0] })
            .to_string(),
    ] {
        websocket_service::handle_text(&state, sender_id, &sender_tx, &payload)
            .await
            .unwrap();
    }

    let replies = drain(&mut sender_rx);
    let codes: Vec<_> = replies.iter().map(|reply| reply["code"].clone()).collect();
    assert_eq!(codes, vec![json!(400), json!(400), json!(422), json!(422)]);
    assert!(replies.iter().all(|reply| reply["type"] == "error"));

    assert_eq!(broadcast_scheduler::run_cycle(&state).await, None);
    assert!(drain(&mut other_rx).is_empty());
    assert_eq!(state.snapshot().await.matt, [0; 9]);
}

#[tokio::test]
async fn service_keeps_working_without_storage() {
    let state = AppState::new(AppConfig::default());
    let (id, tx, mut rx) = connect(&state);

    websocket_service::handle_text(
        &state,
        id,
        &tx,
        &increment([0, 0, 0, 0, 0, 0, 0, 0, 2], [0, 0, 0, 0, 0, 0, 0, 0, 0]),
    )
    .await
    .unwrap();

    assert!(persistence_sync::run_cycle(&state).await.is_err());
    assert_eq!(broadcast_scheduler::run_cycle(&state).await, Some(1));

    websocket_service::handle_text(&state, id, &tx, r#"{"type":"updateRequest"}"#)
        .await
        .unwrap();
    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["matt"][8], 2);

    // Once storage shows up, the pending increment is written on top of the empty record.
    let store = InMemorySeedStore::new();
    state.set_seed_store(Arc::new(store.clone())).await;
    persistence_sync::run_cycle(&state).await.unwrap();
    assert_eq!(store.list("seedsMatt").unwrap()[8], "2");
}

#[tokio::test(start_paused = true)]
async fn background_loops_run_on_their_own_periods() {
    let store = InMemorySeedStore::new();
    let config =
        AppConfig::default().with_intervals(Duration::from_secs(5), Duration::from_secs(1));
    let state = AppState::new(config);
    state.set_seed_store(Arc::new(store.clone())).await;
    let (id, tx, mut rx) = connect(&state);

    let flush = tokio::spawn(persistence_sync::run(state.clone()));
    let broadcast = tokio::spawn(broadcast_scheduler::run(state.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.list("seedsMatt").is_some());

    websocket_service::handle_text(
        &state,
        id,
        &tx,
        &increment([0, 4, 0, 0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 0, 0, 0, 0, 0]),
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(drain(&mut rx).len(), 1);
    assert_eq!(store.list("seedsMatt").unwrap()[1], "0");

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(store.list("seedsMatt").unwrap()[1], "4");
    assert!(drain(&mut rx).is_empty());

    flush.abort();
    broadcast.abort();
}
