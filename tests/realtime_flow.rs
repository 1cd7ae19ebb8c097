// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end real-time channel flow over a live WebSocket.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use stockflow::audit::AuditService;
use stockflow::auth::AuthService;
use stockflow::config::{Environment, Settings};
use stockflow::db::DBClient;
use stockflow::kv::{KeyValueStore, MemoryStore};
use stockflow::models::PriceSnapshot;
use stockflow::realtime::{Hub, WsServer};

fn settings() -> Settings {
    Settings {
        database_url: String::new(),
        redis_url: None,
        jwt_secret_key: "integration-test-signing-key-0123456789".to_string(),
        jwt_algorithm: "HS256".to_string(),
        access_token_expire_minutes: 15,
        refresh_token_expire_days: 7,
        cors_origins: vec![],
        log_level: "INFO".to_string(),
        environment: Environment::Development,
        mcp_stock_data_url: "http://localhost:8002".to_string(),
        mcp_news_url: "http://localhost:8003".to_string(),
        mcp_market_data_url: "http://localhost:8004".to_string(),
        price_update_interval: Duration::from_secs(60),
        ws_bind_addr: "127.0.0.1:0".to_string(),
    }
}

struct TestServer {
    hub: Arc<Hub>,
    auth: Arc<AuthService>,
    addr: std::net::SocketAddr,
    shutdown: CancellationToken,
    _dir: tempfile::TempDir,
}

async fn start_server() -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(
        DBClient::new(dir.path().join("ws_db").to_str().unwrap())
            .await
            .unwrap(),
    );
    db.initialize_schema().await.unwrap();

    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let audit = Arc::new(AuditService::new(db.clone()));
    let auth = Arc::new(AuthService::new(db, kv, audit, &settings()).unwrap());

    let hub = Arc::new(Hub::new());
    let shutdown = CancellationToken::new();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = Arc::new(WsServer::new(
        hub.clone(),
        auth.clone(),
        addr.to_string(),
        shutdown.clone(),
    ));
    tokio::spawn(server.run_on(listener));

    TestServer {
        hub,
        auth,
        addr,
        shutdown,
        _dir: dir,
    }
}

async fn next_json(
    ws: &mut (impl futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
          + Unpin),
) -> serde_json::Value {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read failed")
        {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Unexpected frame: {:?}", other),
        }
    }
}

fn snapshot(ticker: &str, price: f64) -> PriceSnapshot {
    PriceSnapshot {
        ticker: ticker.to_string(),
        price,
        change: 1.0,
        change_percent: 0.5,
        volume: 1000,
        timestamp: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn authenticated_subscribe_and_broadcast() {
    let server = start_server().await;

    let registered = server
        .auth
        .register("alice@example.com", "P@ssword1")
        .await
        .unwrap();

    let url = format!("ws://{}/ws?token={}", server.addr, registered.access_token);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    // Handshake acknowledgement
    let connected = next_json(&mut ws).await;
    assert_eq!(connected["type"], "connected");
    assert!(connected["connection_id"].is_string());

    // Subscribe and wait until the hub index reflects it
    ws.send(Message::Text(
        r#"{"action": "subscribe", "tickers": ["AAPL", "MSFT"]}"#.into(),
    ))
    .await
    .unwrap();

    for _ in 0..50 {
        if server.hub.subscribed_tickers().await.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        server.hub.subscribed_tickers().await,
        vec!["AAPL".to_string(), "MSFT".to_string()]
    );

    // A broadcast for a subscribed ticker arrives with the wire shape
    let delivered = server
        .hub
        .broadcast_price_update("MSFT", snapshot("MSFT", 410.0))
        .await;
    assert_eq!(delivered, 1);

    let update = next_json(&mut ws).await;
    assert_eq!(update["type"], "price_update");
    assert_eq!(update["ticker"], "MSFT");
    assert_eq!(update["price"], 410.0);
    assert_eq!(update["changePercent"], 0.5);

    // Ping round trip
    ws.send(Message::Text(r#"{"action": "ping"}"#.into()))
        .await
        .unwrap();
    let pong = next_json(&mut ws).await;
    assert_eq!(pong["type"], "pong");

    // Unknown action gets a typed error
    ws.send(Message::Text(r#"{"action": "teleport"}"#.into()))
        .await
        .unwrap();
    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert!(error["message"].as_str().unwrap().contains("teleport"));

    // Unsubscribe one ticker; the index narrows
    ws.send(Message::Text(
        r#"{"action": "unsubscribe", "tickers": ["AAPL"]}"#.into(),
    ))
    .await
    .unwrap();
    for _ in 0..50 {
        if server.hub.subscribed_tickers().await.len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        server.hub.subscribed_tickers().await,
        vec!["MSFT".to_string()]
    );

    // Client disconnect cleans everything up
    ws.close(None).await.unwrap();
    for _ in 0..50 {
        if server.hub.stats().await.total_connections == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.hub.stats().await.total_connections, 0);
    assert!(server.hub.subscribed_tickers().await.is_empty());
}

#[tokio::test]
async fn bad_token_closed_with_policy_violation() {
    let server = start_server().await;

    let url = format!("ws://{}/ws?token=not-a-real-token", server.addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    // The server sends a JSON error, then closes with 1008
    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["message"], "Authentication failed");

    match tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for close")
        .expect("stream ended")
        .expect("read failed")
    {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Policy),
        other => panic!("Expected close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn shutdown_closes_connections_normally() {
    let server = start_server().await;

    let registered = server
        .auth
        .register("bob@example.com", "P@ssword1")
        .await
        .unwrap();

    let url = format!("ws://{}/ws?token={}", server.addr, registered.access_token);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let connected = next_json(&mut ws).await;
    assert_eq!(connected["type"], "connected");

    server.shutdown.cancel();

    match tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for close")
        .expect("stream ended")
        .expect("read failed")
    {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Normal),
        other => panic!("Expected close frame, got {:?}", other),
    }
}
