//! In-process mock of the cloud API
//!
//! REST routes plus the `/ws/` endpoint, bound to `127.0.0.1:0`. Every
//! request is recorded in `MockState` so tests can assert on traffic.

#![allow(dead_code)]

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use pinsync_client::{ClientConfig, DeviceIdentity};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

pub const DEV_TOKEN: &str = "dev-token";
pub const KEY_HEX: &str = "c9afa9d845ba75166b5c215767b1d6934e50c3db36e89b127b8a622b120f6721";
pub const MACHINE_UUID: &str = "c7f1fd0b-82f7-5504-8fbe-740c09bc7dab";

pub struct MockState {
    pub stoken_requests: Mutex<Vec<Value>>,
    pub stoken_status: AtomicU16,
    pub installed_requests: Mutex<Vec<Value>>,
    pub heartbeats: AtomicUsize,
    pub heartbeat_status: AtomicU16,
    pub ws_tokens_minted: AtomicUsize,
    pub config_delay_ms: AtomicU64,
    pub session_logs: Mutex<Vec<String>>,

    /// Venue machine id and OPDB id; `None` answers the pairing check with 404
    pub paired: Mutex<Option<(i64, String)>>,
    pub pair_code_requests: AtomicUsize,
    pub top_score_queries: Mutex<Vec<(i64, HashMap<String, String>)>>,
    pub unpair_requests: AtomicUsize,

    pub ws_connections: AtomicUsize,
    pub ws_frames: Mutex<Vec<Value>>,
    /// Close the next connection after it delivered one frame
    pub close_after_first_frame: AtomicBool,
    /// Frames pushed to every connected client
    pub push: broadcast::Sender<String>,

    issued: Mutex<HashSet<String>>,
    token_seq: AtomicUsize,
}

impl Default for MockState {
    fn default() -> Self {
        let (push, _) = broadcast::channel(64);
        let mut issued = HashSet::new();
        issued.insert(DEV_TOKEN.to_string());
        Self {
            stoken_requests: Mutex::new(Vec::new()),
            stoken_status: AtomicU16::new(200),
            installed_requests: Mutex::new(Vec::new()),
            heartbeats: AtomicUsize::new(0),
            heartbeat_status: AtomicU16::new(200),
            ws_tokens_minted: AtomicUsize::new(0),
            config_delay_ms: AtomicU64::new(0),
            session_logs: Mutex::new(Vec::new()),
            paired: Mutex::new(None),
            pair_code_requests: AtomicUsize::new(0),
            top_score_queries: Mutex::new(Vec::new()),
            unpair_requests: AtomicUsize::new(0),
            ws_connections: AtomicUsize::new(0),
            ws_frames: Mutex::new(Vec::new()),
            close_after_first_frame: AtomicBool::new(false),
            push,
            issued: Mutex::new(issued),
            token_seq: AtomicUsize::new(0),
        }
    }
}

impl MockState {
    /// Make every session token issued so far invalid
    pub fn revoke_session_tokens(&self) {
        self.issued.lock().retain(|t| t == DEV_TOKEN);
    }

    pub fn frames(&self) -> Vec<Value> {
        self.ws_frames.lock().clone()
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("SToken "))
            .is_some_and(|token| self.issued.lock().contains(token))
    }
}

pub struct MockCloud {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockCloud {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/api/stoken/", post(stoken))
            .route("/api/installed/", post(installed))
            .route("/api/auth/ws/", get(ws_token))
            .route("/api/heartbeat/", post(heartbeat))
            .route("/api/config/", get(config))
            .route("/api/session_log/", post(session_log))
            .route("/api/scorbitron_paired/{uuid}/", get(paired).delete(unpair))
            .route("/api/scorbitron_pair_code/{uuid}/", get(pair_code))
            .route("/api/venuemachines/{id}/top_scores/", get(top_scores))
            .route("/ws/", get(ws_upgrade))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.base_url())
            .with_ws_backoff(Duration::from_millis(300))
            .with_queue_poll_interval(Duration::from_millis(10))
    }
}

pub fn identity() -> DeviceIdentity {
    DeviceIdentity::new("vpin", MACHINE_UUID, 12345, 4419, "1.0.0", KEY_HEX.as_bytes()).unwrap()
}

/// Poll `cond` until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ==================== Handlers ====================

fn status(code: &AtomicU16) -> StatusCode {
    StatusCode::from_u16(code.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK)
}

async fn stoken(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.stoken_requests.lock().push(body);
    let code = status(&state.stoken_status);
    if !code.is_success() {
        return (code, "stoken unavailable").into_response();
    }
    let n = state.token_seq.fetch_add(1, Ordering::SeqCst) + 1;
    let token = format!("session-{n}");
    state.issued.lock().insert(token.clone());
    Json(json!({ "stoken": token })).into_response()
}

async fn installed(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.installed_requests.lock().push(body);
    Json(json!({ "ok": true })).into_response()
}

async fn ws_token(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let n = state.ws_tokens_minted.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "token": format!("ws-{n}") })).into_response()
}

async fn heartbeat(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let code = status(&state.heartbeat_status);
    if code.is_success() {
        state.heartbeats.fetch_add(1, Ordering::SeqCst);
    }
    code.into_response()
}

async fn config(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let delay = state.config_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    Json(json!({ "machine": "mock", "leaderboard": true })).into_response()
}

async fn session_log(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.session_logs.lock().push(body);
    Json(json!({ "stored": true })).into_response()
}

async fn paired(
    State(state): State<Arc<MockState>>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match state.paired.lock().clone() {
        Some((id, opdb)) if uuid == MACHINE_UUID => {
            Json(json!({ "venuemachine_id": id, "opdb_id": opdb })).into_response()
        }
        _ => (StatusCode::NOT_FOUND, "not paired").into_response(),
    }
}

async fn unpair(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.unpair_requests.fetch_add(1, Ordering::SeqCst);
    *state.paired.lock() = None;
    Json(json!({ "unpaired": true })).into_response()
}

async fn pair_code(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.pair_code_requests.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "shortcode": "K7QX2M" })).into_response()
}

async fn top_scores(
    State(state): State<Arc<MockState>>,
    Path(id): Path<i64>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.top_score_queries.lock().push((id, params));
    Json(json!({ "scores": [{ "score": 125000, "initials": "AAA" }] })).into_response()
}

async fn ws_upgrade(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let valid = params
        .get("token")
        .is_some_and(|t| t.starts_with("ws-"));
    if !valid {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<MockState>) {
    state.ws_connections.fetch_add(1, Ordering::SeqCst);
    let close_after_one = state.close_after_first_frame.swap(false, Ordering::SeqCst);
    let mut push_rx = state.push.subscribe();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            pushed = push_rx.recv() => {
                if let Ok(text) = pushed
                    && sink.send(Message::Text(text.into())).await.is_err()
                {
                    return;
                }
            }
            incoming = stream.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                    _ => return,
                };
                let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                    continue;
                };
                state.ws_frames.lock().push(frame.clone());

                // Echo correlated requests
                if let Some(id) = frame["message"]["id"].as_str() {
                    let reply = json!({
                        "message": {
                            "cmd": frame["message"]["cmd"],
                            "id": id,
                            "data": { "ok": true },
                        }
                    });
                    if sink.send(Message::Text(reply.to_string().into())).await.is_err() {
                        return;
                    }
                }

                if close_after_one {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
            }
        }
    }
}
