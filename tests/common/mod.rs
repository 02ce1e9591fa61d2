//! Mock JetKVM appliance for integration tests
//!
//! Serves the local-login endpoint, the signaling socket and the legacy
//! session endpoint on an ephemeral localhost port, counting every request.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use jetkvm_bridge::ClientConfig;

pub const PASSWORD: &str = "hunter2";
pub const OFFER_SDP: &str = "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";
pub const ANSWER_SDP: &str = "v=0\r\no=- 1 2 IN IP4 192.168.1.178\r\ns=jetkvm\r\nt=0 0\r\n";

/// Signaling socket behaviour
#[derive(Debug, Clone)]
pub enum WsMode {
    /// Answer the offer, sending scripted frames around the answer
    Answer(WsScript),
    /// Handshake rejected with 404 (firmware without the socket)
    Unsupported,
    /// Only ever send keepalives after the offer
    PongFlood,
}

#[derive(Debug, Clone)]
pub struct WsScript {
    pub before: Vec<String>,
    pub answer: Value,
    pub after: Vec<String>,
    /// Close the socket right after the scripted frames
    pub close_after: bool,
}

impl Default for WsScript {
    fn default() -> Self {
        Self {
            before: Vec::new(),
            answer: Value::String(answer_envelope(ANSWER_SDP)),
            after: Vec::new(),
            close_after: false,
        }
    }
}

/// Legacy `/webrtc/session` behaviour
#[derive(Debug, Clone)]
pub enum HttpMode {
    Answer,
    Status(u16, String),
}

#[derive(Debug, Clone)]
pub struct MockOptions {
    pub ws: WsMode,
    pub http: HttpMode,
    /// Number of signaling handshakes rejected with 401
    pub reject_ws: usize,
    /// Number of legacy session posts rejected with 401
    pub reject_http: usize,
    /// Number of legacy session posts left hanging past any client timeout
    pub stall_http: usize,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            ws: WsMode::Answer(WsScript::default()),
            http: HttpMode::Answer,
            reject_ws: 0,
            reject_http: 0,
            stall_http: 0,
        }
    }
}

struct MockState {
    options: MockOptions,
    reject_ws: AtomicUsize,
    reject_http: AtomicUsize,
    stall_http: AtomicUsize,
    logins: AtomicUsize,
    ws_connections: AtomicUsize,
    session_posts: AtomicUsize,
    sockets_closed: AtomicUsize,
    candidates: Mutex<Vec<Value>>,
    offers: Mutex<Vec<String>>,
}

pub struct MockAppliance {
    pub addr: SocketAddr,
    state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockAppliance {
    pub async fn start(options: MockOptions) -> Self {
        let state = Arc::new(MockState {
            reject_ws: AtomicUsize::new(options.reject_ws),
            reject_http: AtomicUsize::new(options.reject_http),
            stall_http: AtomicUsize::new(options.stall_http),
            options,
            logins: AtomicUsize::new(0),
            ws_connections: AtomicUsize::new(0),
            session_posts: AtomicUsize::new(0),
            sockets_closed: AtomicUsize::new(0),
            candidates: Mutex::new(Vec::new()),
            offers: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/auth/login-local", post(login))
            .route("/webrtc/signaling/client", get(signaling))
            .route("/webrtc/session", post(legacy_session))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// Client configuration pointing at this appliance, with short timeouts
    pub fn config(&self) -> ClientConfig {
        test_config(self.addr.port()).with_password(PASSWORD)
    }

    pub fn logins(&self) -> usize {
        self.state.logins.load(Ordering::SeqCst)
    }

    pub fn ws_connections(&self) -> usize {
        self.state.ws_connections.load(Ordering::SeqCst)
    }

    pub fn session_posts(&self) -> usize {
        self.state.session_posts.load(Ordering::SeqCst)
    }

    pub fn sockets_closed(&self) -> usize {
        self.state.sockets_closed.load(Ordering::SeqCst)
    }

    /// Candidate payloads received on any signaling socket
    pub fn candidates(&self) -> Vec<Value> {
        self.state.candidates.lock().unwrap().clone()
    }

    /// Decoded offer SDPs received on either transport
    pub fn offers(&self) -> Vec<String> {
        self.state.offers.lock().unwrap().clone()
    }
}

impl Drop for MockAppliance {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Configuration with short timeouts for `127.0.0.1:port`
pub fn test_config(port: u16) -> ClientConfig {
    let mut config = ClientConfig::new("127.0.0.1").with_native_port(port);
    config.signaling.ws_connect_timeout_ms = 1000;
    config.signaling.ws_receive_timeout_ms = 100;
    config.signaling.ws_max_receive_attempts = 10;
    config.signaling.http_max_attempts = 3;
    config.signaling.retry_delay_ms = 10;
    config.signaling.request_timeout_ms = 2000;
    config
}

/// Port with nothing listening on it
pub async fn unused_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

pub fn answer_envelope(sdp: &str) -> String {
    BASE64.encode(json!({"type": "answer", "sdp": sdp}).to_string())
}

pub fn candidate_frame(candidate: &str) -> String {
    json!({
        "type": "new-ice-candidate",
        "data": {"candidate": candidate, "sdpMid": "0", "sdpMLineIndex": 0},
    })
    .to_string()
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn has_session_cookie(headers: &HeaderMap) -> bool {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|c| c.contains("authToken="))
}

fn decode_offer(sd: &str) -> Option<String> {
    let raw = BASE64.decode(sd).ok()?;
    let desc: Value = serde_json::from_slice(&raw).ok()?;
    if desc["type"] != "offer" {
        return None;
    }
    desc["sdp"].as_str().map(str::to_string)
}

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    let n = state.logins.fetch_add(1, Ordering::SeqCst) + 1;
    if body["password"] != PASSWORD {
        return (StatusCode::UNAUTHORIZED, "invalid password").into_response();
    }
    (
        [(
            header::SET_COOKIE,
            format!("authToken=token-{}; Path=/; HttpOnly; SameSite=Strict", n),
        )],
        Json(json!({"message": "Login successful"})),
    )
        .into_response()
}

async fn signaling(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    state.ws_connections.fetch_add(1, Ordering::SeqCst);

    if matches!(state.options.ws, WsMode::Unsupported) {
        return StatusCode::NOT_FOUND.into_response();
    }
    if take_one(&state.reject_ws) || !has_session_cookie(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    ws.on_upgrade(move |socket| run_socket(socket, state))
}

async fn run_socket(mut socket: WebSocket, state: Arc<MockState>) {
    // Wait for the offer
    while let Some(Ok(msg)) = socket.recv().await {
        if let Message::Text(text) = msg {
            let frame: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            if frame["type"] == "offer" {
                if let Some(sdp) = frame["data"]["sd"].as_str().and_then(decode_offer) {
                    state.offers.lock().unwrap().push(sdp);
                }
                break;
            }
        }
    }

    match &state.options.ws {
        WsMode::Answer(script) => {
            for frame in &script.before {
                let _ = socket.send(Message::Text(frame.clone())).await;
            }
            let answer = json!({"type": "answer", "data": script.answer}).to_string();
            let _ = socket.send(Message::Text(answer)).await;
            for frame in &script.after {
                let _ = socket.send(Message::Text(frame.clone())).await;
            }

            if script.close_after {
                let _ = socket.send(Message::Close(None)).await;
            } else {
                while let Some(Ok(msg)) = socket.recv().await {
                    match msg {
                        Message::Text(text) => {
                            let frame: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
                            if frame["type"] == "new-ice-candidate" {
                                state.candidates.lock().unwrap().push(frame["data"].clone());
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            }
        }
        WsMode::PongFlood => loop {
            if socket.send(Message::Text("pong".to_string())).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        },
        WsMode::Unsupported => {}
    }

    state.sockets_closed.fetch_add(1, Ordering::SeqCst);
}

async fn legacy_session(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.session_posts.fetch_add(1, Ordering::SeqCst);

    if take_one(&state.stall_http) {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    if take_one(&state.reject_http) || !has_session_cookie(&headers) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    match &state.options.http {
        HttpMode::Answer => {
            if let Some(sdp) = body["sd"].as_str().and_then(decode_offer) {
                state.offers.lock().unwrap().push(sdp);
            }
            Json(json!({"sd": answer_envelope(ANSWER_SDP)})).into_response()
        }
        HttpMode::Status(code, text) => {
            let status = StatusCode::from_u16(*code).unwrap();
            (status, text.clone()).into_response()
        }
    }
}
