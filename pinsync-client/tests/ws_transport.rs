//! WebSocket transport: delivery, reconnect, correlation and dispatch

mod common;

use common::{MockCloud, identity, wait_until};
use pinsync_client::{
    ConnectionState, InboundMessage, SessionManager, WsCommand, WsTransport,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

async fn connected_transport(cloud: &MockCloud) -> Arc<WsTransport> {
    let session = Arc::new(SessionManager::new(cloud.config()).unwrap());
    session.initialize(identity()).await.unwrap();
    let transport = Arc::new(WsTransport::new(cloud.config(), session));
    transport.start();

    let mut state = transport.subscribe_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .expect("transport did not connect")
    .unwrap();
    transport
}

#[tokio::test]
async fn test_frames_delivered_in_order() {
    let cloud = MockCloud::start().await;
    let transport = connected_transport(&cloud).await;

    transport.send(WsCommand::Entry, json!({ "seq": 1 }));
    transport.send("top_scores", json!({ "seq": 2 }));

    assert!(wait_until(Duration::from_secs(3), || cloud.state.frames().len() == 2).await);
    let frames = cloud.state.frames();
    assert_eq!(frames[0], json!({ "message": { "cmd": "ENTRY", "data": { "seq": 1 } } }));
    assert_eq!(frames[1]["message"]["cmd"], "TOP_SCORES");
    assert_eq!(cloud.state.ws_tokens_minted.load(Ordering::SeqCst), 1);

    transport.stop().await;
}

#[tokio::test]
async fn test_reconnect_drains_outage_queue() {
    let cloud = MockCloud::start().await;
    cloud
        .state
        .close_after_first_frame
        .store(true, Ordering::SeqCst);
    let transport = connected_transport(&cloud).await;
    let mut state = transport.subscribe_state();

    transport.send(WsCommand::Entry, json!({ "n": 1 }));
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Disconnected),
    )
    .await
    .expect("server close not observed")
    .unwrap();

    // Queued while the socket is down
    transport.send(WsCommand::Entry, json!({ "n": 2 }));
    transport.send(WsCommand::Entry, json!({ "n": 3 }));

    assert!(wait_until(Duration::from_secs(5), || cloud.state.frames().len() == 3).await);
    let frames = cloud.state.frames();
    let order: Vec<_> = frames
        .iter()
        .map(|f| f["message"]["data"]["n"].as_i64().unwrap())
        .collect();
    assert_eq!(order, vec![1, 2, 3]);

    // Exactly one reconnect after the backoff
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(cloud.state.ws_connections.load(Ordering::SeqCst), 2);
    assert_eq!(transport.connection_count(), 2);
    assert_eq!(transport.state(), ConnectionState::Connected);

    transport.stop().await;
}

#[tokio::test]
async fn test_request_gets_correlated_reply() {
    let cloud = MockCloud::start().await;
    let transport = connected_transport(&cloud).await;

    let default_hits = Arc::new(AtomicUsize::new(0));
    let hits = default_hits.clone();
    transport.set_default_callback(move |_| {
        hits.fetch_add(1, Ordering::SeqCst);
    });

    let reply = transport
        .request("pair", json!({ "player": 1 }), Some(Duration::from_secs(3)))
        .await
        .unwrap();
    assert_eq!(reply.command, Some(WsCommand::Pair));
    assert_eq!(reply.data, json!({ "ok": true }));
    assert_eq!(default_hits.load(Ordering::SeqCst), 0);

    let sent = cloud.state.frames();
    assert_eq!(sent[0]["message"]["cmd"], "PAIR");
    assert!(sent[0]["message"]["id"].is_string());

    transport.stop().await;
}

#[tokio::test]
async fn test_inbound_routing() {
    let cloud = MockCloud::start().await;
    let transport = connected_transport(&cloud).await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(&'static str, InboundMessage)>();
    let bg = tx.clone();
    transport.set_background_callback(move |m| {
        let _ = bg.send(("background", m.clone()));
    });
    let scores = tx.clone();
    transport.set_callback("top_scores", move |m| {
        let _ = scores.send(("top_scores", m.clone()));
    });
    transport.set_default_callback(move |m| {
        let _ = tx.send(("default", m.clone()));
    });

    // The server side subscribes to pushes once the upgrade completes
    assert!(wait_until(Duration::from_secs(3), || cloud.state.push.receiver_count() > 0).await);
    cloud
        .state
        .push
        .send(json!({ "type": "balance", "data": { "coins": 5 } }).to_string())
        .unwrap();
    cloud
        .state
        .push
        .send(json!({ "message": { "cmd": "top_scores", "data": [1, 2] } }).to_string())
        .unwrap();
    cloud
        .state
        .push
        .send(json!({ "message": { "cmd": "promo", "data": {} } }).to_string())
        .unwrap();

    let mut seen = Vec::new();
    for _ in 0..3 {
        let (route, msg) = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push((route, msg.command.map(|c| c.to_string())));
    }
    assert_eq!(
        seen,
        vec![
            ("background", Some("BALANCE".to_string())),
            ("top_scores", Some("TOP_SCORES".to_string())),
            ("default", Some("PROMO".to_string())),
        ]
    );

    transport.stop().await;
}

#[tokio::test]
async fn test_zero_timer_settings_still_deliver() {
    let cloud = MockCloud::start().await;
    let mut config = cloud.config();
    config.ws_ping_interval = Duration::ZERO;
    config.queue_poll_interval = Duration::ZERO;

    let session = Arc::new(SessionManager::new(config.clone()).unwrap());
    session.initialize(identity()).await.unwrap();
    let transport = Arc::new(WsTransport::new(config, session));
    transport.start();

    transport.send(WsCommand::Entry, json!({ "n": 1 }));
    assert!(wait_until(Duration::from_secs(5), || cloud.state.frames().len() == 1).await);
    assert!(transport.is_running());
    assert_eq!(transport.state(), ConnectionState::Connected);

    transport.stop().await;
}

#[tokio::test]
async fn test_stop_closes_and_stays_down() {
    let cloud = MockCloud::start().await;
    let transport = connected_transport(&cloud).await;

    transport.stop().await;
    assert!(!transport.is_running());
    assert_eq!(transport.state(), ConnectionState::Disconnected);

    transport.send(WsCommand::Entry, json!({}));
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(cloud.state.ws_connections.load(Ordering::SeqCst), 1);
    assert!(cloud.state.frames().is_empty());
}
