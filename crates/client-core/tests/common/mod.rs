//! In-process fake of the workspace backend
//!
//! Serves the token, session, notification and voice endpoints on a random
//! local port. Tests steer it through [`BackendState`] and push notifications
//! with [`FakeBackend::push`]; the next long poll delivers them.

#![allow(dead_code)]

use agentdesk_client_core::{ClientBuilder, ClientEvent, ClientResult, EventSubscription};
use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;

pub const API_KEY: &str = "test-key";
pub const TOKEN: &str = "tok-123";
pub const PASSWORD: &str = "secret-pw";
pub const SESSION_COOKIE: &str = "WORKSPACE_SESSIONID=sess-42";
pub const CLIENT_ID: &str = "fake-client";

/// How long a connect is held open when nothing is queued
const POLL_HOLD: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub body: Value,
    pub cookie: Option<String>,
    pub api_key: Option<String>,
}

pub struct BackendState {
    pub issue_session_cookie: AtomicBool,
    pub accept_handshake: AtomicBool,
    pub reject_connect: AtomicBool,
    pub voice_status_code: AtomicI64,

    pub token_requests: AtomicUsize,
    pub session_requests: AtomicUsize,
    pub handshake_requests: AtomicUsize,
    pub subscribe_requests: AtomicUsize,
    pub connect_requests: AtomicUsize,
    pub disconnect_requests: AtomicUsize,
    pub logout_requests: AtomicUsize,

    pub token_form: Mutex<Option<HashMap<String, String>>>,
    pub subscriptions: Mutex<Vec<String>>,
    pub connect_cookies: Mutex<Vec<Option<String>>>,
    pub requests: Mutex<Vec<RecordedRequest>>,

    queue: Mutex<VecDeque<(String, Value)>>,
    queued: Notify,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            issue_session_cookie: AtomicBool::new(true),
            accept_handshake: AtomicBool::new(true),
            reject_connect: AtomicBool::new(false),
            voice_status_code: AtomicI64::new(1),
            token_requests: AtomicUsize::new(0),
            session_requests: AtomicUsize::new(0),
            handshake_requests: AtomicUsize::new(0),
            subscribe_requests: AtomicUsize::new(0),
            connect_requests: AtomicUsize::new(0),
            disconnect_requests: AtomicUsize::new(0),
            logout_requests: AtomicUsize::new(0),
            token_form: Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
            connect_cookies: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            queued: Notify::new(),
        }
    }
}

impl BackendState {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Requests recorded for a path suffix, e.g. `calls/C1/answer`
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}

pub struct FakeBackend {
    pub url: String,
    pub state: Arc<BackendState>,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl FakeBackend {
    /// Queue a notification for the next poll
    pub fn push(&self, channel: &str, data: Value) {
        self.state.queue.lock().push_back((channel.to_string(), data));
        self.state.queued.notify_one();
    }

    pub fn push_init_complete(&self, employee_id: &str) {
        self.push(
            "/workspace/v3/initialization",
            json!({
                "messageType": "WorkspaceInitializationComplete",
                "state": "Complete",
                "data": {
                    "user": {
                        "employeeId": employee_id,
                        "agentId": "A1",
                        "defaultPlace": "Place_1000",
                        "userProperties": [{ "key": "team", "type": "str", "value": "billing" }]
                    }
                }
            }),
        );
    }

    pub fn push_call(&self, id: &str, state: &str) {
        self.push(
            "/workspace/v3/voice",
            json!({
                "messageType": "CallStateChanged",
                "notificationType": "StatusChange",
                "call": { "id": id, "state": state, "callType": "Inbound", "participants": [{ "number": "5001" }] }
            }),
        );
    }

    pub fn push_dn(&self, dn: Value) {
        self.push("/workspace/v3/voice", json!({ "messageType": "DnStateChanged", "dn": dn }));
    }

    pub fn client_builder(&self) -> ClientBuilder {
        ClientBuilder::new(&self.url, API_KEY)
            .client_credentials("desktop", "client-secret")
            .user("agent1", PASSWORD)
            .request_timeout_secs(5)
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

pub async fn start_backend() -> anyhow::Result<FakeBackend> {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter("agentdesk_client_core=debug")
        .with_test_writer()
        .try_init();

    let state = Arc::new(BackendState::default());

    let app = Router::new()
        .route("/auth/v3/oauth/token", post(token))
        .route("/workspace/v3/initialize-workspace", get(initialize_workspace))
        .route("/workspace/v3/logout", post(logout))
        .route("/workspace/v3/activate-channels", post(activate_channels))
        .route("/workspace/v3/notifications/:segment", post(notifications))
        .route("/workspace/v3/voice/*op", post(voice))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}", listener.local_addr()?);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        if let Err(e) = server.await {
            tracing::error!("Fake backend error: {}", e);
        }
    });

    Ok(FakeBackend {
        url,
        state,
        shutdown_tx,
    })
}

/// Next event from a subscription, failing the test after two seconds
pub async fn next_event(events: &mut EventSubscription) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event bus closed")
}

/// Wait for a pending initialization with a test-side deadline
pub async fn resolve<F>(pending: F) -> ClientResult<agentdesk_client_core::User>
where
    F: std::future::IntoFuture<Output = ClientResult<agentdesk_client_core::User>>,
{
    tokio::time::timeout(Duration::from_secs(3), pending.into_future())
        .await
        .expect("initialization never resolved")
}

fn header(headers: &HeaderMap, name: impl axum::http::header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn token(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_requests.fetch_add(1, Ordering::SeqCst);
    let password_ok = form.get("password").map(String::as_str) == Some(PASSWORD);
    let basic_ok = header(&headers, AUTHORIZATION).is_some_and(|v| v.starts_with("Basic "));
    *state.token_form.lock() = Some(form);

    if !password_ok || !basic_ok {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid_grant" }))).into_response();
    }
    Json(json!({ "access_token": TOKEN, "token_type": "bearer", "expires_in": 3600, "scope": "*" }))
        .into_response()
}

async fn initialize_workspace(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.session_requests.fetch_add(1, Ordering::SeqCst);
    let expected = format!("Bearer {}", TOKEN);
    if header(&headers, AUTHORIZATION).as_deref() != Some(expected.as_str()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let body = Json(json!({ "status": { "code": 1 } }));
    if state.issue_session_cookie.load(Ordering::SeqCst) {
        (
            AppendHeaders([
                (SET_COOKIE, "AWSELB=lb-1; Path=/"),
                (SET_COOKIE, "WORKSPACE_SESSIONID=sess-42; Path=/; HttpOnly"),
            ]),
            body,
        )
            .into_response()
    } else {
        (AppendHeaders([(SET_COOKIE, "AWSELB=lb-1; Path=/")]), body).into_response()
    }
}

async fn logout(State(state): State<Arc<BackendState>>) -> Json<Value> {
    state.logout_requests.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "status": { "code": 0 } }))
}

async fn activate_channels(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    record(&state, "activate-channels", &headers, body);
    Json(json!({ "status": { "code": 0 } }))
}

async fn voice(
    State(state): State<Arc<BackendState>>,
    Path(op): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    record(&state, op.trim_start_matches('/'), &headers, body);
    let code = state.voice_status_code.load(Ordering::SeqCst);
    Json(json!({ "status": { "code": code } }))
}

fn record(state: &BackendState, path: &str, headers: &HeaderMap, body: Value) {
    state.requests.lock().push(RecordedRequest {
        path: path.to_string(),
        body,
        cookie: header(headers, COOKIE),
        api_key: header(headers, "x-api-key"),
    });
}

async fn notifications(
    State(state): State<Arc<BackendState>>,
    Path(segment): Path<String>,
    headers: HeaderMap,
    Json(messages): Json<Vec<Value>>,
) -> Response {
    match segment.as_str() {
        "handshake" => {
            state.handshake_requests.fetch_add(1, Ordering::SeqCst);
            let reply = if state.accept_handshake.load(Ordering::SeqCst) {
                json!([{
                    "channel": "/meta/handshake",
                    "successful": true,
                    "clientId": CLIENT_ID,
                    "version": "1.0",
                    "supportedConnectionTypes": ["long-polling"],
                    "advice": { "reconnect": "retry", "interval": 0, "timeout": POLL_HOLD.as_millis() as u64 }
                }])
            } else {
                json!([{ "channel": "/meta/handshake", "successful": false, "error": "403::Handshake denied" }])
            };
            Json(reply).into_response()
        }
        "subscribe" => {
            state.subscribe_requests.fetch_add(1, Ordering::SeqCst);
            let replies: Vec<Value> = messages
                .iter()
                .map(|m| {
                    let subscription = m.get("subscription").cloned().unwrap_or(Value::Null);
                    if let Some(name) = subscription.as_str() {
                        state.subscriptions.lock().push(name.to_string());
                    }
                    json!({ "channel": "/meta/subscribe", "successful": true, "subscription": subscription })
                })
                .collect();
            Json(replies).into_response()
        }
        "connect" => {
            state.connect_requests.fetch_add(1, Ordering::SeqCst);
            state.connect_cookies.lock().push(header(&headers, COOKIE));

            if state.reject_connect.load(Ordering::SeqCst) {
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }

            if state.queue.lock().is_empty() {
                let _ = tokio::time::timeout(POLL_HOLD, state.queued.notified()).await;
            }

            let mut replies: Vec<Value> = state
                .queue
                .lock()
                .drain(..)
                .map(|(channel, data)| json!({ "channel": channel, "data": data }))
                .collect();
            replies.push(json!({
                "channel": "/meta/connect",
                "successful": true,
                "advice": { "interval": 0, "timeout": POLL_HOLD.as_millis() as u64 }
            }));
            Json(replies).into_response()
        }
        "disconnect" => {
            state.disconnect_requests.fetch_add(1, Ordering::SeqCst);
            Json(json!([{ "channel": "/meta/disconnect", "successful": true }])).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
