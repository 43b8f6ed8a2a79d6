use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use async_trait::async_trait;
use futures::{sink::SinkExt, stream::SplitSink, stream::StreamExt};
use std::sync::Arc;
use tokio::select;
use tracing::{error, info};

use crate::auth::TokenManager;
use crate::fyers::feed::FeedConnector;

use super::messages::ServerEnvelope;
use super::session::{ClientSendError, ClientSink, Session};

/// WebSocket connection state
pub struct WsState {
    pub token_manager: Arc<TokenManager>,
    pub connector: Arc<dyn FeedConnector>,
    /// Symbols every new session subscribes to on open
    pub default_symbols: Vec<String>,
}

/// Handle WebSocket upgrade request
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Envelope sink over the client half of an axum WebSocket
struct WsClientSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl ClientSink for WsClientSink {
    async fn send_envelope(&mut self, envelope: &ServerEnvelope) -> Result<(), ClientSendError> {
        let json =
            serde_json::to_string(envelope).map_err(|e| ClientSendError(e.to_string()))?;
        self.sender
            .send(Message::Text(json))
            .await
            .map_err(|e| ClientSendError(e.to_string()))
    }

    async fn send_pong(&mut self, payload: Vec<u8>) -> Result<(), ClientSendError> {
        self.sender
            .send(Message::Pong(payload))
            .await
            .map_err(|e| ClientSendError(e.to_string()))
    }
}

/// Bridge one WebSocket connection to its own data socket
async fn handle_socket(socket: WebSocket, state: Arc<WsState>) {
    let (sender, mut receiver) = socket.split();

    let mut session = Session::new(
        WsClientSink { sender },
        state.default_symbols.clone(),
    );
    info!(session = %session.id(), "WebSocket client connected");

    let Some(mut feed_events) = session
        .begin(&state.token_manager, state.connector.as_ref())
        .await
    else {
        session.teardown().await;
        return;
    };

    loop {
        select! {
            // Client-originated frames
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if !session.on_client_text(&text).await {
                        break;
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    if session.on_client_ping(payload).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(session = %session.id(), "WebSocket client disconnected");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(session = %session.id(), "WebSocket error: {}", e);
                    break;
                }
            },

            // Events from the owned feed adapter, in feed order
            event = feed_events.recv() => match event {
                Some(event) => {
                    if !session.on_feed_event(event).await {
                        break;
                    }
                }
                // Adapter task ended without a close event
                None => break,
            },
        }
    }

    session.teardown().await;
}
