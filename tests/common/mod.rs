//! In-process stand-in for the document backend: the REST endpoints the
//! client calls and a STOMP-over-WebSocket broker that echoes every publish
//! to all subscribers of the topic.
#![allow(dead_code)]

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use inlyne_client::clients::ApiClient;
use inlyne_client::models::DocHandle;
use inlyne_client::stomp::{Command, Frame};
use inlyne_client::sync::{EditingSession, HtmlBuffer};
use inlyne_client::ws::ChannelConfig;

pub const PASSWORD: &str = "correct-horse";

#[derive(Clone, Debug)]
pub struct FakeDoc {
    pub content: Option<String>,
    pub title: String,
    pub is_public: bool,
    pub access_level: &'static str,
}

impl FakeDoc {
    pub fn public(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
            title: String::new(),
            is_public: true,
            access_level: "public",
        }
    }

    pub fn private(content: &str, access_level: &'static str) -> Self {
        Self {
            content: Some(content.to_string()),
            title: "Private".to_string(),
            is_public: false,
            access_level,
        }
    }
}

#[derive(Default)]
pub struct BackendState {
    docs: Mutex<HashMap<String, FakeDoc>>,
    /// email -> username
    users: Mutex<HashMap<String, String>>,
    fetch_error: Mutex<Option<String>>,
    saves: Mutex<Vec<(String, String)>>,
    docs_requests: Mutex<Vec<Value>>,
    publishes: Mutex<Vec<(String, String)>>,
    connects: AtomicUsize,
    connect_times: Mutex<Vec<Instant>>,
    /// Heart-beat interval the broker advertises in CONNECTED but never honours
    silent_heartbeat_ms: AtomicU64,
    fetches: AtomicUsize,
    topic: Mutex<Option<broadcast::Sender<(String, String)>>>,
    kick: Mutex<Option<broadcast::Sender<()>>>,
}

impl BackendState {
    fn topic(&self) -> broadcast::Sender<(String, String)> {
        self.topic
            .lock()
            .unwrap()
            .get_or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }

    fn kick_sender(&self) -> broadcast::Sender<()> {
        self.kick
            .lock()
            .unwrap()
            .get_or_insert_with(|| broadcast::channel(4).0)
            .clone()
    }
}

pub struct Backend {
    pub addr: SocketAddr,
    pub state: Arc<BackendState>,
}

impl Backend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::default());
        state
            .users
            .lock()
            .unwrap()
            .insert("ann@x.io".to_string(), "ann".to_string());

        let app = Router::new()
            .route("/ws/websocket", get(broker_upgrade))
            .route("/docs", get(list_docs).post(post_docs))
            .route("/docs/:handle", axum::routing::put(save_doc))
            .route("/user", get(get_user).post(post_user))
            .route("/:handle", get(fetch_doc))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn api_base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn api(&self, token: Option<&str>) -> ApiClient {
        ApiClient::new(self.api_base(), token.map(str::to_string)).unwrap()
    }

    pub fn channel_config(&self, token: Option<&str>) -> ChannelConfig {
        ChannelConfig {
            url: format!("ws://{}/ws/websocket", self.addr),
            token: token.map(str::to_string),
            reconnect_delay: Duration::from_millis(50),
            heartbeat_outgoing: Duration::from_secs(20),
            heartbeat_incoming: Duration::ZERO,
        }
    }

    pub fn session(&self, token: Option<&str>) -> EditingSession<HtmlBuffer> {
        self.session_with(token, self.channel_config(token))
    }

    pub fn session_with(&self, token: Option<&str>, channel: ChannelConfig) -> EditingSession<HtmlBuffer> {
        EditingSession::new(Arc::new(self.api(token)), HtmlBuffer::default(), channel, true)
    }

    pub fn add_doc(&self, key: &str, doc: FakeDoc) -> DocHandle {
        self.state.docs.lock().unwrap().insert(key.to_string(), doc);
        DocHandle::parse(key).unwrap()
    }

    pub fn doc(&self, key: &str) -> Option<FakeDoc> {
        self.state.docs.lock().unwrap().get(key).cloned()
    }

    /// Every document fetch answers `{status: error, message}` from now on
    pub fn fail_fetches(&self, message: &str) {
        *self.state.fetch_error.lock().unwrap() = Some(message.to_string());
    }

    /// Advertise `ms` outgoing heart-beats to new sessions without sending any
    pub fn promise_heartbeats(&self, ms: u64) {
        self.state.silent_heartbeat_ms.store(ms, Ordering::SeqCst);
    }

    /// Drop every open broker socket
    pub fn kick_all(&self) {
        let _ = self.state.kick_sender().send(());
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// When each CONNECT frame arrived, oldest first
    pub fn connect_times(&self) -> Vec<Instant> {
        self.state.connect_times.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }

    pub fn publishes(&self) -> Vec<(String, String)> {
        self.state.publishes.lock().unwrap().clone()
    }

    pub fn saves(&self) -> Vec<(String, String)> {
        self.state.saves.lock().unwrap().clone()
    }

    pub fn docs_requests(&self) -> Vec<Value> {
        self.state.docs_requests.lock().unwrap().clone()
    }
}

pub fn token_for(email: &str) -> String {
    format!("tok-{}", email)
}

fn caller(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer tok-"))
        .map(str::to_string)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"status": "error", "message": "auth token missing"})),
    )
        .into_response()
}

async fn fetch_doc(
    State(state): State<Arc<BackendState>>,
    Path(handle): Path<String>,
) -> Response {
    state.fetches.fetch_add(1, Ordering::SeqCst);
    if let Some(message) = state.fetch_error.lock().unwrap().clone() {
        return Json(json!({"status": "error", "message": message})).into_response();
    }
    let Some(doc) = state.docs.lock().unwrap().get(&handle).cloned() else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "error", "message": "document not found"})),
        )
            .into_response();
    };
    Json(json!({
        "status": "success",
        "accessLevel": doc.access_level,
        "doc": {
            "content": doc.content,
            "title": doc.title,
            "isPublic": doc.is_public,
            "owner": {"username": "ann", "email": "ann@x.io"},
            "admins": [],
            "writers": [],
            "readers": []
        }
    }))
    .into_response()
}

async fn save_doc(
    State(state): State<Arc<BackendState>>,
    Path(handle): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if caller(&headers).is_none() {
        return unauthorized();
    }
    let content = body["content"].as_str().unwrap_or_default().to_string();
    let mut docs = state.docs.lock().unwrap();
    let Some(doc) = docs.get_mut(&handle) else {
        return Json(json!({"status": "error", "message": "document not found"})).into_response();
    };
    doc.content = Some(content.clone());
    state.saves.lock().unwrap().push((handle, content));
    Json(json!({"status": "success", "message": "saved"})).into_response()
}

async fn post_docs(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if caller(&headers).is_none() {
        return unauthorized();
    }
    state.docs_requests.lock().unwrap().push(body.clone());
    let doc_id = body["docId"].as_str().unwrap_or_default().to_string();
    let mut docs = state.docs.lock().unwrap();
    match body["type"].as_str() {
        Some("create") => {
            let key = "new00001".to_string();
            docs.insert(key.clone(), FakeDoc::private("<p></p>", "owner"));
            Json(json!({"url": format!("https://inlyne.link/doc/{}", key)})).into_response()
        }
        Some("setPublic") => {
            let public = body["public"].as_bool().unwrap_or(false);
            match docs.get_mut(&doc_id) {
                Some(doc) => {
                    doc.is_public = public;
                    Json(json!({"status": "success", "isPublic": public})).into_response()
                }
                None => Json(json!({"status": "error", "message": "document not found"})).into_response(),
            }
        }
        Some("updateTitle") => match docs.get_mut(&doc_id) {
            Some(doc) => {
                doc.title = body["title"].as_str().unwrap_or_default().to_string();
                Json(json!({"status": "success"})).into_response()
            }
            None => Json(json!({"status": "error", "message": "document not found"})).into_response(),
        },
        Some("updateDocPermissions") => {
            if body["updates"].as_array().is_some_and(|u| !u.is_empty()) {
                Json(json!({"status": "success"})).into_response()
            } else {
                Json(json!({"status": "error", "details": "no updates"})).into_response()
            }
        }
        _ => (StatusCode::BAD_REQUEST, "unknown request type").into_response(),
    }
}

async fn list_docs(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if caller(&headers).is_none() {
        return unauthorized();
    }
    let mut docs: Vec<Value> = state
        .docs
        .lock()
        .unwrap()
        .iter()
        .map(|(key, doc)| json!({"docKey": key, "title": doc.title}))
        .collect();
    docs.sort_by(|a, b| a["docKey"].as_str().cmp(&b["docKey"].as_str()));
    Json(json!({"status": "success", "docs": docs})).into_response()
}

async fn post_user(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut users = state.users.lock().unwrap();
    match body["type"].as_str() {
        Some("userLogin") => {
            let email = body["email"].as_str().unwrap_or_default();
            if users.contains_key(email) && body["password"] == PASSWORD {
                Json(json!({"status": "success", "token": token_for(email), "pfpUrl": "/pfp/ann.png"}))
                    .into_response()
            } else {
                Json(json!({"status": "error", "message": "Invalid credentials"})).into_response()
            }
        }
        Some("userSignup") => {
            let email = body["email"].as_str().unwrap_or_default().to_string();
            let username = body["username"].as_str().unwrap_or_default().to_string();
            if users.values().any(|u| *u == username) {
                return Json(json!({"status": "error", "details": "Username already taken"})).into_response();
            }
            users.insert(email, username);
            Json(json!({"status": "success"})).into_response()
        }
        Some("updateUsername") => {
            let Some(email) = caller(&headers) else {
                return unauthorized();
            };
            let name = body["newUsername"].as_str().unwrap_or_default().to_string();
            users.insert(email, name);
            Json(json!({"status": "success"})).into_response()
        }
        Some("updateEmail") | Some("updatePassword") => {
            if caller(&headers).is_none() {
                return unauthorized();
            }
            Json(json!({"status": "success"})).into_response()
        }
        _ => (StatusCode::BAD_REQUEST, "unknown request type").into_response(),
    }
}

async fn get_user(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let Some(email) = caller(&headers) else {
        return unauthorized();
    };
    if query.get("requestType").map(String::as_str) != Some("getUserData") {
        return (StatusCode::BAD_REQUEST, "unknown request type").into_response();
    }
    let username = state.users.lock().unwrap().get(&email).cloned().unwrap_or_default();
    Json(json!({"username": username, "email": email, "pfpUrl": "/pfp/ann.png"})).into_response()
}

async fn broker_upgrade(State(state): State<Arc<BackendState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| broker(socket, state))
}

/// One broker session: answers CONNECT, records subscriptions and relays
/// every SEND on `/app/edit/{key}` to `/topic/docs/{key}` subscribers,
/// the sender included.
async fn broker(socket: WebSocket, state: Arc<BackendState>) {
    let (mut sink, mut stream) = socket.split();
    let topic = state.topic();
    let mut topic_rx = topic.subscribe();
    let mut kick_rx = state.kick_sender().subscribe();
    let mut subscriptions: Vec<(String, String)> = Vec::new();
    let mut message_id = 0u64;

    loop {
        tokio::select! {
            msg = stream.next() => {
                let Some(Ok(msg)) = msg else { break };
                let Message::Text(text) = msg else { continue };
                let Ok(frames) = Frame::decode_all(&text) else { continue };
                for frame in frames {
                    match frame.command {
                        Command::Connect => {
                            state.connect_times.lock().unwrap().push(Instant::now());
                            state.connects.fetch_add(1, Ordering::SeqCst);
                            let connected = Frame::new(Command::Connected)
                                .header("version", "1.2")
                                .header(
                                    "heart-beat",
                                    format!("{},0", state.silent_heartbeat_ms.load(Ordering::SeqCst)),
                                );
                            if sink.send(Message::Text(connected.encode())).await.is_err() {
                                return;
                            }
                        }
                        Command::Subscribe => {
                            if let (Some(id), Some(dest)) = (frame.get("id"), frame.get("destination")) {
                                subscriptions.push((id.to_string(), dest.to_string()));
                            }
                        }
                        Command::Send => {
                            let Some(dest) = frame.get("destination").map(str::to_string) else { continue };
                            state.publishes.lock().unwrap().push((dest.clone(), frame.body.clone()));
                            if let Some(key) = dest.strip_prefix("/app/edit/") {
                                let _ = topic.send((format!("/topic/docs/{}", key), frame.body));
                            }
                        }
                        Command::Disconnect => return,
                        _ => {}
                    }
                }
            }
            Ok((dest, body)) = topic_rx.recv() => {
                let Some((id, _)) = subscriptions.iter().find(|(_, d)| *d == dest) else { continue };
                message_id += 1;
                let frame = Frame::new(Command::Message)
                    .header("subscription", id.as_str())
                    .header("destination", dest.as_str())
                    .header("message-id", message_id.to_string())
                    .header("content-type", "application/json")
                    .body(body);
                if sink.send(Message::Text(frame.encode())).await.is_err() {
                    break;
                }
            }
            _ = kick_rx.recv() => break,
        }
    }
}

/// Run `f` against a deadline so a broken channel fails the test instead of hanging it
pub async fn within<T>(f: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("timed out")
}
