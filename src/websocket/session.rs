//! Client session bridge
//!
//! One session per browser WebSocket connection. The session obtains a
//! credential, opens its own data socket adapter, forwards every feed event
//! to its client as an envelope, and relays client subscribe/unsubscribe
//! commands upstream. The feed adapter is owned exclusively by the session
//! and torn down exactly once with it.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::TokenManager;
use crate::fyers::feed::{FeedConnector, FeedError, FeedHandle};
use crate::fyers::messages::{DataType, FeedEvent, SymbolSpec};

use super::messages::{parse_client_command, ClientCommand, ParsedCommand, ServerEnvelope};

/// Client socket write failure - treated as session termination
#[derive(Debug, Error)]
#[error("Failed to send frame to client: {0}")]
pub struct ClientSendError(pub String);

/// Sink for envelopes headed to one client connection
#[async_trait]
pub trait ClientSink: Send {
    async fn send_envelope(&mut self, envelope: &ServerEnvelope) -> Result<(), ClientSendError>;

    /// Answer a protocol-level ping; no-op outside real sockets
    async fn send_pong(&mut self, _payload: Vec<u8>) -> Result<(), ClientSendError> {
        Ok(())
    }
}

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Connecting,
    AwaitingToken,
    Opening,
    Subscribing,
    Streaming,
    Closing,
    Closed,
    /// Absorbing error state, reachable from any non-terminal state
    Errored,
}

impl SessionState {
    pub const fn is_streaming(&self) -> bool {
        matches!(self, SessionState::Streaming)
    }

    pub const fn is_shutting_down(&self) -> bool {
        matches!(
            self,
            SessionState::Closing | SessionState::Closed | SessionState::Errored
        )
    }
}

/// One browser connection bridged to one data socket
pub struct Session<S: ClientSink> {
    id: Uuid,
    state: SessionState,
    sink: S,
    feed: Option<Arc<dyn FeedHandle>>,
    subscriptions: HashSet<SymbolSpec>,
    default_symbols: Vec<String>,
    connected: bool,
}

impl<S: ClientSink> Session<S> {
    pub fn new(sink: S, default_symbols: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Connecting,
            sink,
            feed: None,
            subscriptions: HashSet::new(),
            default_symbols,
            connected: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Acquire a credential and open the upstream data socket.
    ///
    /// Returns the adapter's event stream, or `None` when the session
    /// cannot start - an error envelope has already been sent and the
    /// caller should tear down.
    pub async fn begin(
        &mut self,
        tokens: &TokenManager,
        connector: &dyn FeedConnector,
    ) -> Option<mpsc::UnboundedReceiver<FeedEvent>> {
        self.state = SessionState::AwaitingToken;

        let Some(access_token) = tokens.get_access_token().await else {
            warn!(session = %self.id, "No valid access token available");
            self.send_error("Failed to obtain access token").await;
            self.state = SessionState::Closing;
            return None;
        };

        self.state = SessionState::Opening;
        match connector.connect(&access_token).await {
            Ok((feed, events)) => {
                self.feed = Some(feed);
                Some(events)
            }
            Err(e) => {
                error!(session = %self.id, "Failed to open data socket: {}", e);
                self.send_error(&format!("Connection error: {}", e)).await;
                self.state = SessionState::Errored;
                None
            }
        }
    }

    /// Handle one event from the owned adapter.
    /// Returns false when the session should shut down.
    pub async fn on_feed_event(&mut self, event: FeedEvent) -> bool {
        match event {
            FeedEvent::Opened => self.on_feed_open().await,
            FeedEvent::Message(payload) => self.on_feed_message(payload).await,
            FeedEvent::Error(error) => self.on_feed_error(error).await,
            FeedEvent::Closed => {
                self.on_feed_closed().await;
                false
            }
        }
    }

    /// Handle one text frame from the client.
    /// Returns false when the session should shut down.
    pub async fn on_client_text(&mut self, text: &str) -> bool {
        let command = match parse_client_command(text) {
            ParsedCommand::Command(command) => command,
            ParsedCommand::UnknownAction(action) => {
                debug!(session = %self.id, ?action, "Ignoring unknown client action");
                return true;
            }
            ParsedCommand::Invalid(reason) => {
                self.send_error(&format!("Error processing request: {}", reason))
                    .await;
                return true;
            }
        };

        // Commands are rejected, not queued, while the feed is down
        if self.feed.is_none() || !self.connected {
            self.send_error("Not connected to Fyers data socket").await;
            return true;
        }

        match command {
            ClientCommand::Subscribe { symbols, data_type } => {
                self.handle_subscribe(symbols, data_type).await
            }
            ClientCommand::Unsubscribe { symbols, data_type } => {
                self.handle_unsubscribe(symbols, data_type).await
            }
        }
    }

    /// Answer a protocol-level ping from the client
    pub async fn on_client_ping(&mut self, payload: Vec<u8>) -> Result<(), ClientSendError> {
        self.sink.send_pong(payload).await
    }

    /// Close the adapter and finish the session.
    ///
    /// Safe to call more than once; adapter close is idempotent and any
    /// failure during teardown is logged, never propagated.
    pub async fn teardown(&mut self) {
        if !self.state.is_shutting_down() {
            self.state = SessionState::Closing;
        }
        if let Some(feed) = self.feed.take() {
            debug!(
                session = %self.id,
                acked_subscriptions = feed.subscriptions().len(),
                "Closing data socket"
            );
            feed.close();
        }
        self.state = SessionState::Closed;
        info!(session = %self.id, "Session closed");
    }

    async fn on_feed_open(&mut self) -> bool {
        info!(session = %self.id, "Data socket open, subscribing default symbols");
        self.connected = true;
        self.state = SessionState::Subscribing;

        let symbols = self.default_symbols.clone();
        let specs: Vec<SymbolSpec> = symbols.iter().cloned().map(SymbolSpec::lite).collect();

        match self.feed_subscribe(specs.clone()) {
            Ok(()) => {
                self.subscriptions.extend(specs);
            }
            Err(e) => {
                warn!(session = %self.id, "Default subscription failed: {}", e);
                self.send_error(&format!("Subscription error: {}", e)).await;
            }
        }

        // The broker does not ack subscriptions synchronously; report and
        // move on to streaming either way
        let delivered = self
            .send(&ServerEnvelope::Subscribed {
                symbols,
                data_type: DataType::SymbolUpdate,
            })
            .await;
        self.state = SessionState::Streaming;
        delivered
    }

    async fn on_feed_message(&mut self, payload: serde_json::Value) -> bool {
        self.send(&ServerEnvelope::data_update(payload)).await
    }

    async fn on_feed_error(&mut self, error: FeedError) -> bool {
        error!(session = %self.id, "Upstream feed error: {}", error);

        if !self.state.is_streaming() {
            // Failed before streaming ever started; nothing to recover
            self.state = SessionState::Errored;
            self.send_error(&error.to_string()).await;
            return false;
        }

        self.send_error(&error.to_string()).await;
        true
    }

    async fn on_feed_closed(&mut self) {
        info!(session = %self.id, "Data socket connection closed");
        self.connected = false;
        let _ = self
            .send(&ServerEnvelope::ConnectionClosed {
                message: "Fyers data socket connection closed".to_string(),
            })
            .await;
        self.state = SessionState::Closing;
    }

    async fn handle_subscribe(&mut self, symbols: Vec<String>, data_type: DataType) -> bool {
        if symbols.is_empty() {
            self.send_error("Subscribe requires a non-empty symbols list")
                .await;
            return true;
        }

        let specs: Vec<SymbolSpec> = symbols
            .iter()
            .cloned()
            .map(|s| SymbolSpec::new(s, data_type))
            .collect();

        if let Err(e) = self.feed_subscribe(specs.clone()) {
            self.send_error(&format!("Subscription error: {}", e)).await;
            return true;
        }
        self.subscriptions.extend(specs);

        self.send(&ServerEnvelope::Subscribed { symbols, data_type })
            .await
    }

    async fn handle_unsubscribe(&mut self, symbols: Vec<String>, data_type: DataType) -> bool {
        if symbols.is_empty() {
            self.send_error("Unsubscribe requires a non-empty symbols list")
                .await;
            return true;
        }

        let specs: Vec<SymbolSpec> = symbols
            .iter()
            .cloned()
            .map(|s| SymbolSpec::new(s, data_type))
            .collect();

        let result = match &self.feed {
            Some(feed) => feed.unsubscribe(specs.clone()),
            None => Err(FeedError::NotConnected),
        };
        if let Err(e) = result {
            self.send_error(&format!("Unsubscription error: {}", e)).await;
            return true;
        }
        for spec in &specs {
            self.subscriptions.remove(spec);
        }

        self.send(&ServerEnvelope::Unsubscribed { symbols, data_type })
            .await
    }

    fn feed_subscribe(&self, specs: Vec<SymbolSpec>) -> Result<(), FeedError> {
        match &self.feed {
            Some(feed) => feed.subscribe(specs),
            None => Err(FeedError::NotConnected),
        }
    }

    async fn send(&mut self, envelope: &ServerEnvelope) -> bool {
        match self.sink.send_envelope(envelope).await {
            Ok(()) => true,
            Err(e) => {
                warn!(session = %self.id, "Client send failed: {}", e);
                false
            }
        }
    }

    async fn send_error(&mut self, message: &str) {
        // Best effort: a failure here means the client is already gone
        let _ = self
            .sink
            .send_envelope(&ServerEnvelope::error(message))
            .await;
    }
}
