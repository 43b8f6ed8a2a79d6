//! Fyers data socket adapter
//!
//! Owns the connection to the broker's push-streaming WebSocket. The
//! connection runs on its own spawned task - the only place that touches
//! the socket - and hands the four lifecycle events (opened, message,
//! error, closed) to the owning session through a thread-safe channel,
//! preserving feed order. Control commands flow the other way through a
//! command channel, so no session code ever blocks on socket I/O.
//!
//! A dropped connection is retried with exponential backoff and the
//! last-known subscription set is re-issued after reconnecting. A close
//! frame from the broker, or a close command from the session, is terminal.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::config::FyersConfig;
use super::messages::{frames_for, FeedEvent, SymbolSpec};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors surfaced to callers of the feed adapter
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    /// Command issued before the connection reported open
    #[error("Not connected to Fyers data socket")]
    NotConnected,

    /// Connection attempt failed
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Failure on an established stream
    #[error("Stream error: {0}")]
    Stream(String),

    /// The adapter has already been closed
    #[error("Data socket already closed")]
    Closed,
}

/// Handle to a live feed connection, owned by exactly one session
pub trait FeedHandle: Send + Sync {
    /// Whether the connection has completed its handshake and is usable
    fn is_open(&self) -> bool;

    /// Issue a subscribe control message; `NotConnected` before open
    fn subscribe(&self, specs: Vec<SymbolSpec>) -> Result<(), FeedError>;

    /// Issue an unsubscribe control message; `NotConnected` before open
    fn unsubscribe(&self, specs: Vec<SymbolSpec>) -> Result<(), FeedError>;

    /// Release the connection; idempotent, never fails
    fn close(&self);

    /// Last subscription set actually sent to the broker
    fn subscriptions(&self) -> HashSet<SymbolSpec>;
}

/// Factory for feed connections, injected into sessions
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Start a connection with the given credential
    ///
    /// Connection failures are delivered as `FeedEvent::Error` on the
    /// returned channel rather than as a synchronous error, mirroring the
    /// broker's own asynchronous handshake.
    async fn connect(
        &self,
        access_token: &str,
    ) -> Result<(Arc<dyn FeedHandle>, mpsc::UnboundedReceiver<FeedEvent>), FeedError>;
}

enum FeedCommand {
    Subscribe(Vec<SymbolSpec>),
    Unsubscribe(Vec<SymbolSpec>),
    Close,
}

/// Concrete adapter over the Fyers data socket
pub struct FyersFeedClient {
    cmd_tx: mpsc::UnboundedSender<FeedCommand>,
    open: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    subscriptions: Arc<Mutex<HashSet<SymbolSpec>>>,
}

impl FeedHandle for FyersFeedClient {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn subscribe(&self, specs: Vec<SymbolSpec>) -> Result<(), FeedError> {
        self.send_command(FeedCommand::Subscribe(specs))
    }

    fn unsubscribe(&self, specs: Vec<SymbolSpec>) -> Result<(), FeedError> {
        self.send_command(FeedCommand::Unsubscribe(specs))
    }

    fn close(&self) {
        // First close wins; later calls (session teardown racing an
        // upstream failure) are no-ops
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.cmd_tx.send(FeedCommand::Close).is_err() {
            tracing::debug!("Data socket task already finished at close");
        }
    }

    fn subscriptions(&self) -> HashSet<SymbolSpec> {
        self.subscriptions.lock().clone()
    }
}

impl FyersFeedClient {
    fn send_command(&self, command: FeedCommand) -> Result<(), FeedError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FeedError::Closed);
        }
        if !self.open.load(Ordering::SeqCst) {
            return Err(FeedError::NotConnected);
        }
        self.cmd_tx.send(command).map_err(|_| FeedError::Closed)
    }
}

/// Connector producing one data socket connection per session
pub struct FyersFeedConnector {
    config: Arc<FyersConfig>,
    reconnect: ReconnectConfig,
}

impl FyersFeedConnector {
    pub fn new(config: Arc<FyersConfig>) -> Self {
        Self {
            config,
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn with_reconnect(config: Arc<FyersConfig>, reconnect: ReconnectConfig) -> Self {
        Self { config, reconnect }
    }
}

#[async_trait]
impl FeedConnector for FyersFeedConnector {
    async fn connect(
        &self,
        access_token: &str,
    ) -> Result<(Arc<dyn FeedHandle>, mpsc::UnboundedReceiver<FeedEvent>), FeedError> {
        let url = self.config.feed_url_with_token(access_token);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let subscriptions = Arc::new(Mutex::new(HashSet::new()));

        tokio::spawn(run_connection(
            url,
            cmd_rx,
            event_tx,
            Arc::clone(&open),
            Arc::clone(&subscriptions),
            ReconnectPolicy::new(self.reconnect.clone()),
        ));

        let handle = FyersFeedClient {
            cmd_tx,
            open,
            closed: Arc::new(AtomicBool::new(false)),
            subscriptions,
        };

        Ok((Arc::new(handle), event_rx))
    }
}

enum Drive {
    /// Deliberate close (session command) or close frame from the broker
    Closed,
    /// Abnormal loss; eligible for reconnect
    Lost(FeedError),
}

/// Connection task body; the feed-owned execution context.
///
/// Never touches session state - every outcome is an event on `events`.
async fn run_connection(
    url: String,
    mut cmd_rx: mpsc::UnboundedReceiver<FeedCommand>,
    events: mpsc::UnboundedSender<FeedEvent>,
    open: Arc<AtomicBool>,
    subscriptions: Arc<Mutex<HashSet<SymbolSpec>>>,
    mut policy: ReconnectPolicy,
) {
    let mut announced_open = false;

    loop {
        let mut ws = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                tracing::warn!("Data socket connect failed: {}", e);
                match policy.next_delay() {
                    Some(delay) => {
                        if backoff_or_close(delay, &mut cmd_rx).await {
                            let _ = events.send(FeedEvent::Closed);
                            return;
                        }
                        continue;
                    }
                    None => {
                        let _ = events.send(FeedEvent::Error(FeedError::Connect(e.to_string())));
                        let _ = events.send(FeedEvent::Closed);
                        return;
                    }
                }
            }
        };

        let reconnected = announced_open;
        policy.reset();
        open.store(true, Ordering::SeqCst);

        if !announced_open {
            announced_open = true;
            if events.send(FeedEvent::Opened).is_err() {
                // Session is gone; nothing left to relay
                let _ = ws.close(None).await;
                return;
            }
        }

        let outcome = drive_socket(&mut ws, &mut cmd_rx, &events, &subscriptions, reconnected).await;
        open.store(false, Ordering::SeqCst);

        match outcome {
            Drive::Closed => {
                let _ = events.send(FeedEvent::Closed);
                return;
            }
            Drive::Lost(reason) => {
                tracing::warn!("Data socket lost: {}", reason);
                let _ = events.send(FeedEvent::Error(reason));
                match policy.next_delay() {
                    Some(delay) => {
                        if backoff_or_close(delay, &mut cmd_rx).await {
                            let _ = events.send(FeedEvent::Closed);
                            return;
                        }
                    }
                    None => {
                        let _ = events.send(FeedEvent::Closed);
                        return;
                    }
                }
            }
        }
    }
}

/// Pump one established connection until it closes or drops
async fn drive_socket(
    ws: &mut WsStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<FeedCommand>,
    events: &mpsc::UnboundedSender<FeedEvent>,
    subscriptions: &Mutex<HashSet<SymbolSpec>>,
    reconnected: bool,
) -> Drive {
    if reconnected {
        // Re-establish the broker-side subscription state
        let specs: Vec<SymbolSpec> = subscriptions.lock().iter().cloned().collect();
        if !specs.is_empty() {
            tracing::info!("Restoring {} subscription(s) after reconnect", specs.len());
            if let Err(reason) = send_frames(ws, frames_for(&specs, true)).await {
                return Drive::Lost(reason);
            }
        }
    }

    loop {
        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(WsFrame::Text(text))) => match serde_json::from_str(&text) {
                    Ok(value) => {
                        if events.send(FeedEvent::Message(value)).is_err() {
                            return Drive::Closed;
                        }
                    }
                    Err(e) => tracing::trace!("Discarding unparseable feed frame: {}", e),
                },
                Some(Ok(WsFrame::Ping(payload))) => {
                    if let Err(e) = ws.send(WsFrame::Pong(payload)).await {
                        return Drive::Lost(FeedError::Stream(e.to_string()));
                    }
                }
                Some(Ok(WsFrame::Close(_))) | None => return Drive::Closed,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Drive::Lost(FeedError::Stream(e.to_string())),
            },
            command = cmd_rx.recv() => match command {
                Some(FeedCommand::Subscribe(specs)) => {
                    if let Err(reason) = send_frames(ws, frames_for(&specs, true)).await {
                        return Drive::Lost(reason);
                    }
                    let mut acked = subscriptions.lock();
                    for spec in specs {
                        acked.insert(spec);
                    }
                }
                Some(FeedCommand::Unsubscribe(specs)) => {
                    if let Err(reason) = send_frames(ws, frames_for(&specs, false)).await {
                        return Drive::Lost(reason);
                    }
                    let mut acked = subscriptions.lock();
                    for spec in &specs {
                        acked.remove(spec);
                    }
                }
                Some(FeedCommand::Close) | None => {
                    let _ = ws.close(None).await;
                    return Drive::Closed;
                }
            },
        }
    }
}

async fn send_frames(ws: &mut WsStream, frames: Vec<String>) -> Result<(), FeedError> {
    for frame in frames {
        ws.send(WsFrame::Text(frame))
            .await
            .map_err(|e| FeedError::Stream(format!("Failed to send control frame: {}", e)))?;
    }
    Ok(())
}

/// Sleep out the backoff delay, aborting immediately on a close command.
/// Returns true when the adapter was closed while waiting.
async fn backoff_or_close(
    delay: Duration,
    cmd_rx: &mut mpsc::UnboundedReceiver<FeedCommand>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            command = cmd_rx.recv() => match command {
                Some(FeedCommand::Close) | None => return true,
                // Subscribe commands cannot arrive while the socket is down
                Some(_) => {}
            },
        }
    }
}
