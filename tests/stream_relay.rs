//! End-to-end relay tests
//!
//! Run the real axum app against a scripted mock broker data socket and a
//! real WebSocket client: envelope ordering, subscribe echo, silent drop of
//! unknown actions, the no-credential path, and reconnect/resubscribe.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use stock_stream_api::api::ApiState;
use stock_stream_api::auth::TokenManager;
use stock_stream_api::database::models::NewAccessToken;
use stock_stream_api::database::repositories::{InMemoryTokenRepository, TokenRepository};
use stock_stream_api::fyers::auth_api::FyersAuthClient;
use stock_stream_api::fyers::quotes::FyersQuotesClient;
use stock_stream_api::fyers::reconnect::ReconnectConfig;
use stock_stream_api::fyers::{FyersConfig, FyersFeedConnector};
use stock_stream_api::websocket::WsState;
use stock_stream_api::create_router;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ServerWs = WebSocketStream<TcpStream>;

fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(100),
        multiplier: 2.0,
        jitter_factor: 0.0,
        max_attempts: 5,
    }
}

fn test_config(feed_addr: SocketAddr) -> Arc<FyersConfig> {
    Arc::new(FyersConfig {
        client_id: "APP-100".to_string(),
        secret_key: "secret".to_string(),
        redirect_uri: "http://localhost:8000/api/v1/auth/callback".to_string(),
        pin: None,
        // Nothing listens on the REST side; a valid token is pre-seeded
        rest_base_url: "http://127.0.0.1:9".to_string(),
        data_base_url: "http://127.0.0.1:9".to_string(),
        feed_url: format!("ws://{}/", feed_addr),
    })
}

/// Start the app against the given mock feed; returns the client WS URL
async fn spawn_app(repo: Arc<InMemoryTokenRepository>, feed_addr: SocketAddr) -> String {
    let config = test_config(feed_addr);

    let token_manager = Arc::new(TokenManager::new(
        repo,
        FyersAuthClient::new(Arc::clone(&config)),
    ));
    let quotes = Arc::new(FyersQuotesClient::new(Arc::clone(&config)));
    let connector = Arc::new(FyersFeedConnector::with_reconnect(
        Arc::clone(&config),
        fast_reconnect(),
    ));

    let ws_state = Arc::new(WsState {
        token_manager: Arc::clone(&token_manager),
        connector,
        default_symbols: vec!["NSE:ADANIENT-EQ".to_string()],
    });
    let api_state = ApiState {
        token_manager,
        quotes,
    };

    let app = create_router(api_state, ws_state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("ws://{}/ws/stocks", addr)
}

fn seeded_repo() -> Arc<InMemoryTokenRepository> {
    let repo = Arc::new(InMemoryTokenRepository::new());
    repo.insert(NewAccessToken::new(
        "valid-token".to_string(),
        Some("refresh".to_string()),
        Utc::now() + chrono::Duration::hours(12),
    ))
    .unwrap();
    repo
}

/// Read server frames until the next subscription control frame
async fn expect_sub_frame(ws: &mut ServerWs) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for control frame")
            .expect("feed stream ended")
            .expect("feed stream error");
        if let Message::Text(text) = msg {
            let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
            if frame["T"] == "SUB" {
                return frame;
            }
        }
    }
}

/// Read client frames until the next JSON envelope
async fn next_envelope(ws: &mut ClientWs) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for envelope")
            .expect("client stream ended")
            .expect("client stream error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn relays_ticks_in_feed_order_then_reports_close() {
    let feed_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let feed_addr = feed_listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = feed_listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        // The session subscribes its default set right after open
        let frame = expect_sub_frame(&mut ws).await;
        assert_eq!(frame["TLIST"][0], "NSE:ADANIENT-EQ");
        assert_eq!(frame["SUB_T"], "SymbolUpdate");

        for ltp in [612.3, 612.4] {
            ws.send(Message::Text(
                serde_json::json!({"symbol": "NSE:ADANIENT-EQ", "ltp": ltp}).to_string(),
            ))
            .await
            .unwrap();
        }
        ws.close(None).await.unwrap();
    });

    let url = spawn_app(seeded_repo(), feed_addr).await;
    let (mut client, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let subscribed = next_envelope(&mut client).await;
    assert_eq!(subscribed["type"], "subscribed");
    assert_eq!(subscribed["symbols"][0], "NSE:ADANIENT-EQ");
    assert_eq!(subscribed["data_type"], "SymbolUpdate");

    let first = next_envelope(&mut client).await;
    assert_eq!(first["type"], "data_update");
    assert_eq!(first["message"]["ltp"], 612.3);
    assert!(first["timestamp"].as_str().unwrap().contains('T'));

    let second = next_envelope(&mut client).await;
    assert_eq!(second["type"], "data_update");
    assert_eq!(second["message"]["ltp"], 612.4);

    let closed = next_envelope(&mut client).await;
    assert_eq!(closed["type"], "connection_closed");
}

#[tokio::test]
async fn client_commands_are_acked_and_unknown_actions_dropped() {
    let feed_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let feed_addr = feed_listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = feed_listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Consume control frames; this feed never emits ticks
        while ws.next().await.is_some() {}
    });

    let url = spawn_app(seeded_repo(), feed_addr).await;
    let (mut client, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let subscribed = next_envelope(&mut client).await;
    assert_eq!(subscribed["type"], "subscribed");

    // Typo'd action: silently dropped, no envelope of any kind
    client
        .send(Message::Text(
            r#"{"action":"subscrbe","symbols":["NSE:TCS-EQ"]}"#.to_string(),
        ))
        .await
        .unwrap();

    // Follow-up subscribe: the next envelope must be its ack, proving the
    // unknown action produced nothing in between
    client
        .send(Message::Text(
            r#"{"action":"subscribe","symbols":["NSE:TCS-EQ"]}"#.to_string(),
        ))
        .await
        .unwrap();

    let ack = next_envelope(&mut client).await;
    assert_eq!(ack["type"], "subscribed");
    assert_eq!(ack["symbols"][0], "NSE:TCS-EQ");

    client
        .send(Message::Text(
            r#"{"action":"unsubscribe","symbols":["NSE:TCS-EQ"]}"#.to_string(),
        ))
        .await
        .unwrap();

    let ack = next_envelope(&mut client).await;
    assert_eq!(ack["type"], "unsubscribed");
    assert_eq!(ack["symbols"][0], "NSE:TCS-EQ");
}

#[tokio::test]
async fn missing_credential_yields_error_envelope_then_close() {
    // Empty token store and an unreachable token endpoint
    let repo = Arc::new(InMemoryTokenRepository::new());
    let url = spawn_app(repo, "127.0.0.1:9".parse().unwrap()).await;

    let (mut client, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let error = next_envelope(&mut client).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["message"], "Failed to obtain access token");

    // The session tears down; nothing else arrives on this socket
    let next = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for close");
    assert!(!matches!(next, Some(Ok(Message::Text(_)))));
}

#[tokio::test]
async fn reconnect_restores_subscriptions_without_a_second_subscribed_envelope() {
    let feed_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let feed_addr = feed_listener.local_addr().unwrap();

    tokio::spawn(async move {
        // First connection: one tick, then an abrupt drop (no close frame)
        let (stream, _) = feed_listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        expect_sub_frame(&mut ws).await;
        ws.send(Message::Text(
            serde_json::json!({"seq": 1}).to_string(),
        ))
        .await
        .unwrap();
        drop(ws);

        // Second connection: the adapter must resubscribe on its own
        let (stream, _) = feed_listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let frame = expect_sub_frame(&mut ws).await;
        assert_eq!(frame["TLIST"][0], "NSE:ADANIENT-EQ");
        ws.send(Message::Text(
            serde_json::json!({"seq": 2}).to_string(),
        ))
        .await
        .unwrap();
        // Keep the connection up until the client is done
        while ws.next().await.is_some() {}
    });

    let url = spawn_app(seeded_repo(), feed_addr).await;
    let (mut client, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let subscribed = next_envelope(&mut client).await;
    assert_eq!(subscribed["type"], "subscribed");

    let first = next_envelope(&mut client).await;
    assert_eq!(first["type"], "data_update");
    assert_eq!(first["message"]["seq"], 1);

    // The drop surfaces as a transient error envelope...
    let error = next_envelope(&mut client).await;
    assert_eq!(error["type"], "error");

    // ...and streaming resumes with no second subscribed envelope
    let second = next_envelope(&mut client).await;
    assert_eq!(second["type"], "data_update");
    assert_eq!(second["message"]["seq"], 2);
}
