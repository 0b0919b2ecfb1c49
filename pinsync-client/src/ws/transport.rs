//! Self-healing WebSocket transport
//!
//! 1. Mint a short-lived token and connect to `/ws/?token=...`
//! 2. Run the sender (queue drainer + keepalive pings) and the receiver
//!    (classify + dispatch) until either side fails or `stop()` is called
//! 3. On failure, wait for the backoff and reconnect, forever
//!
//! The outbound queue outlives individual connections: frames queued while
//! disconnected are sent after the next connect. A frame already taken off
//! the queue when the socket fails is lost (at-most-once delivery).

use super::backoff::{Backoff, FixedBackoff};
use super::dispatch::{DispatchTable, MessageHandler};
use crate::config::{ClientConfig, nonzero_interval};
use crate::error::{ClientError, ClientResult};
use crate::session::WsTokenSource;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use shared::api::WS_PATH;
use shared::message::{InboundMessage, OutboundFrame, WsCommand};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct Shared {
    config: ClientConfig,
    tokens: Arc<dyn WsTokenSource>,
    backoff: Arc<dyn Backoff>,
    queue: Mutex<VecDeque<OutboundFrame>>,
    dispatch: RwLock<DispatchTable>,
    pending: Mutex<HashMap<String, oneshot::Sender<InboundMessage>>>,
    state: watch::Sender<ConnectionState>,
    connections: AtomicU64,
}

struct Running {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct WsTransport {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl WsTransport {
    pub fn new(config: ClientConfig, tokens: Arc<dyn WsTokenSource>) -> Self {
        let backoff = Arc::new(FixedBackoff::new(config.ws_backoff));
        Self::with_backoff(config, tokens, backoff)
    }

    pub fn with_backoff(
        config: ClientConfig,
        tokens: Arc<dyn WsTokenSource>,
        backoff: Arc<dyn Backoff>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                tokens,
                backoff,
                queue: Mutex::new(VecDeque::new()),
                dispatch: RwLock::new(DispatchTable::new()),
                pending: Mutex::new(HashMap::new()),
                state,
                connections: AtomicU64::new(0),
            }),
            running: Mutex::new(None),
        }
    }

    // ========== Lifecycle ==========

    /// Spawn the connection loop. No-op if already running.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            tracing::debug!("WebSocket transport already running");
            return;
        }

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(self.shared.clone(), shutdown.clone()));
        *running = Some(Running { shutdown, handle });
        tracing::info!("WebSocket transport started");
    }

    /// Cancel both loops, close the socket and drop unsent frames
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        if let Some(Running { shutdown, handle }) = running {
            shutdown.cancel();
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "WebSocket task ended abnormally");
            }
            tracing::info!("WebSocket transport stopped");
        }

        let dropped = {
            let mut queue = self.shared.queue.lock();
            let n = queue.len();
            queue.clear();
            n
        };
        if dropped > 0 {
            tracing::info!(dropped, "Discarded unsent messages");
        }
        self.shared.fail_pending();
        self.shared.set_state(ConnectionState::Disconnected);
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Successful connects since creation
    pub fn connection_count(&self) -> u64 {
        self.shared.connections.load(Ordering::Relaxed)
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    // ========== Outbound ==========

    /// Enqueue a frame. Fire and forget.
    pub fn send(&self, command: impl Into<WsCommand>, data: Value) {
        let command = command.into();
        tracing::trace!(command = %command, "Queued message");
        self.shared
            .queue
            .lock()
            .push_back(OutboundFrame::new(&command, data));
    }

    /// Send a frame tagged with a fresh `id` and wait for the reply
    /// echoing it
    pub async fn request(
        &self,
        command: impl Into<WsCommand>,
        data: Value,
        timeout: Option<Duration>,
    ) -> ClientResult<InboundMessage> {
        let command = command.into();
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id.clone(), tx);
        self.shared
            .queue
            .lock()
            .push_back(OutboundFrame::new(&command, data).with_id(id.clone()));

        let timeout = timeout.unwrap_or(self.shared.config.ws_request_timeout);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ClientError::TransportLost),
            Err(_) => {
                self.shared.pending.lock().remove(&id);
                tracing::warn!(command = %command, request_id = %id, "WebSocket request timed out");
                Err(ClientError::Timeout)
            }
        }
    }

    // ========== Inbound ==========

    pub fn set_callback<F>(&self, command: impl Into<WsCommand>, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.shared
            .dispatch
            .write()
            .set(command.into(), Arc::new(handler));
    }

    pub fn remove_callback(&self, command: impl Into<WsCommand>) -> bool {
        self.shared.dispatch.write().remove(&command.into())
    }

    pub fn set_default_callback<F>(&self, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.shared.dispatch.write().set_default(Arc::new(handler));
    }

    pub fn set_background_callback<F>(&self, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.shared
            .dispatch
            .write()
            .set_background(Arc::new(handler));
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.shutdown.cancel();
        }
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("state", &self.state())
            .field("queued", &self.queue_len())
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

// ==================== Connection loop ====================

async fn run(shared: Arc<Shared>, shutdown: CancellationToken) {
    let mut attempt: u32 = 0;

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        shared.set_state(ConnectionState::Connecting);
        let connected = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = shared.connect() => result,
        };

        match connected {
            Ok(ws) => {
                attempt = 0;
                shared.connections.fetch_add(1, Ordering::Relaxed);
                shared.set_state(ConnectionState::Connected);
                let reason = shared.run_session(ws, &shutdown).await;
                shared.fail_pending();
                shared.set_state(ConnectionState::Disconnected);
                if shutdown.is_cancelled() {
                    break;
                }
                tracing::warn!(reason = %reason, "WebSocket session ended");
            }
            Err(e) => {
                shared.set_state(ConnectionState::Disconnected);
                tracing::warn!(error = %e, "WebSocket connection failed");
            }
        }

        attempt = attempt.saturating_add(1);
        let delay = shared.backoff.delay(attempt);
        tracing::info!(delay_ms = delay.as_millis() as u64, attempt, "Reconnecting after backoff");
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {},
        }
    }

    shared.set_state(ConnectionState::Disconnected);
    tracing::debug!("WebSocket loop exited");
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// Wake every waiting `request` with `TransportLost`
    fn fail_pending(&self) {
        let pending: Vec<_> = self.pending.lock().drain().collect();
        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "Failing pending requests");
        }
        // Dropping the senders closes the channels
        drop(pending);
    }

    async fn connect(&self) -> ClientResult<WsStream> {
        let token = self.tokens.ws_token().await?;

        let mut url = reqwest::Url::parse(&format!("{}{}", self.config.ws_base_url(), WS_PATH))
            .map_err(|e| ClientError::Config(format!("invalid WebSocket URL: {e}")))?;
        url.query_pairs_mut().append_pair("token", &token);

        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| {
                if let tungstenite::Error::Http(ref resp) = e {
                    let status = resp.status().as_u16();
                    if status == 401 || status == 403 {
                        return ClientError::AuthFailed(format!(
                            "WebSocket handshake rejected (HTTP {status})"
                        ));
                    }
                }
                ClientError::InvalidResponse(format!("WebSocket connect failed: {e}"))
            })?;

        tracing::info!(host = url.host_str().unwrap_or_default(), "WebSocket connected");
        Ok(ws)
    }

    /// Run one connection until it fails or shutdown; returns why it ended
    async fn run_session(&self, ws: WsStream, shutdown: &CancellationToken) -> String {
        let (mut sink, mut stream) = ws.split();
        let (control_tx, mut control_rx) = mpsc::unbounded_channel::<Message>();
        let poll = nonzero_interval("queue_poll_interval", self.config.queue_poll_interval);
        let ping_every = nonzero_interval("ws_ping_interval", self.config.ws_ping_interval);

        let sender = async {
            let mut ping = tokio::time::interval(ping_every);
            ping.tick().await; // skip immediate tick

            loop {
                if let Some(next) = self.next_outbound(&mut control_rx) {
                    if let Err(e) = sink.send(next).await {
                        return format!("send failed: {e}");
                    }
                    continue;
                }

                tokio::select! {
                    Some(control) = control_rx.recv() => {
                        if let Err(e) = sink.send(control).await {
                            return format!("control send failed: {e}");
                        }
                    }
                    _ = ping.tick() => {
                        if let Err(e) = sink.send(Message::Ping(Default::default())).await {
                            return format!("ping failed: {e}");
                        }
                    }
                    _ = tokio::time::sleep(poll) => {}
                }
            }
        };

        let receiver = async {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => self.handle_text(text.as_str()),
                    Ok(Message::Ping(data)) => {
                        let _ = control_tx.send(Message::Pong(data));
                    }
                    Ok(Message::Close(frame)) => {
                        return format!("closed by server: {:?}", frame);
                    }
                    Err(e) => return format!("read failed: {e}"),
                    _ => {} // Binary, Pong
                }
            }
            "stream ended".to_string()
        };

        let reason = tokio::select! {
            _ = shutdown.cancelled() => None,
            reason = sender => Some(reason),
            reason = receiver => Some(reason),
        };

        match reason {
            Some(reason) => reason,
            None => {
                let _ = sink.close().await;
                "shutdown".to_string()
            }
        }
    }

    /// Pending control replies go out before the oldest queued frame
    fn next_outbound(&self, control_rx: &mut mpsc::UnboundedReceiver<Message>) -> Option<Message> {
        if let Ok(control) = control_rx.try_recv() {
            return Some(control);
        }
        loop {
            let frame = self.queue.lock().pop_front()?;
            match frame.to_json() {
                Ok(text) => {
                    tracing::debug!(cmd = %frame.message.cmd, "Sending frame");
                    return Some(Message::Text(text.into()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, cmd = %frame.message.cmd, "Dropping unserializable frame");
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let msg = match InboundMessage::parse(text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring non-JSON frame");
                return;
            }
        };

        if let Some(id) = msg.id.as_deref() {
            let waiter = self.pending.lock().remove(id);
            if let Some(tx) = waiter {
                let _ = tx.send(msg);
                return;
            }
        }

        let handler: Option<MessageHandler> = self.dispatch.read().resolve(&msg);
        match handler {
            Some(handler) => handler(&msg),
            None => tracing::debug!(
                kind = ?msg.kind,
                command = ?msg.command,
                "No handler for inbound frame"
            ),
        }
    }
}
