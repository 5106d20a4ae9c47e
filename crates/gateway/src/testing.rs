//! In-process mock of the developer-site API for gateway tests

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use session::{AuthState, Identity};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::client::{Gateway, GatewayConfig};
use crate::events::{ExpiryReason, SessionExpired, SessionListener};

pub(crate) const GOOD_PASSWORD: &str = "correct-horse";

/// Mutable server-side behavior, shared with the test body.
pub(crate) struct MockState {
    /// Access token the API currently accepts. Empty means none.
    valid_token: Mutex<String>,
    /// Token the refresh endpoint hands out.
    issued_token: Mutex<String>,
    refresh_delay: Mutex<Duration>,
    pub refresh_status: AtomicU16,
    pub logout_status: AtomicU16,
    /// Refresh only succeeds when the refresh cookie is presented.
    pub require_cookie: AtomicBool,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    /// (path, Authorization header, Origin header) per request, in arrival order.
    seen: Mutex<Vec<(String, Option<String>, Option<String>)>>,
}

impl MockState {
    fn record(&self, path: &str, headers: &HeaderMap) {
        let value = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let entry = (
            path.to_string(),
            value(header::AUTHORIZATION),
            value(header::ORIGIN),
        );
        self.seen.lock().unwrap().push(entry);
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let valid = self.valid_token.lock().unwrap().clone();
        if valid.is_empty() {
            return false;
        }
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("Bearer {valid}"))
    }
}

pub(crate) struct MockApi {
    pub url: String,
    pub state: Arc<MockState>,
}

impl MockApi {
    /// Start the mock on an ephemeral port. The API initially accepts `T1`
    /// and the refresh endpoint issues `T2`.
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            valid_token: Mutex::new("T1".into()),
            issued_token: Mutex::new("T2".into()),
            refresh_delay: Mutex::new(Duration::ZERO),
            refresh_status: AtomicU16::new(200),
            logout_status: AtomicU16::new(204),
            require_cookie: AtomicBool::new(false),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/register", post(register))
            .route("/auth/refresh", post(refresh))
            .route("/auth/logout", post(logout))
            .route("/auth/me", get(me))
            .route("/items/{name}", get(item).delete(remove_item))
            .route("/reject/{name}", get(reject))
            .route("/revoked/{name}", get(revoked))
            .route("/delayed/{name}", get(delayed))
            .route("/slow", get(slow))
            .route("/broken", get(broken))
            .route("/echo", post(echo))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            state,
        }
    }

    /// Invalidate every access token until the next refresh.
    pub fn expire_tokens(&self) {
        self.state.valid_token.lock().unwrap().clear();
    }

    pub fn set_issued_token(&self, token: &str) {
        *self.state.issued_token.lock().unwrap() = token.to_string();
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.state.refresh_delay.lock().unwrap() = delay;
    }

    /// Authorization headers seen for `path`, in arrival order.
    pub fn auth_for(&self, path: &str) -> Vec<Option<String>> {
        self.state
            .seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _, _)| p == path)
            .map(|(_, auth, _)| auth.clone())
            .collect()
    }

    /// Origin headers seen for `path`, in arrival order.
    pub fn origin_for(&self, path: &str) -> Vec<Option<String>> {
        self.state
            .seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _, _)| p == path)
            .map(|(_, _, origin)| origin.clone())
            .collect()
    }
}

/// Listener that keeps every event for assertions.
#[derive(Default)]
pub(crate) struct RecordingListener {
    events: Mutex<Vec<SessionExpired>>,
}

impl RecordingListener {
    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn reasons(&self) -> Vec<ExpiryReason> {
        self.events.lock().unwrap().iter().map(|e| e.reason).collect()
    }
}

impl SessionListener for RecordingListener {
    fn session_expired(&self, event: &SessionExpired) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Gateway pointed at `api`, with a recording listener and the given queue timeout.
pub(crate) fn gateway_with(
    api: &MockApi,
    state: Arc<AuthState>,
    queue_timeout: Duration,
) -> (Gateway, Arc<RecordingListener>) {
    gateway_at(&api.url, state, queue_timeout)
}

pub(crate) fn gateway_at(
    url: &str,
    state: Arc<AuthState>,
    queue_timeout: Duration,
) -> (Gateway, Arc<RecordingListener>) {
    let listener = Arc::new(RecordingListener::default());
    let mut config = GatewayConfig::new(url);
    config.timeout = Duration::from_secs(10);
    config.queue_timeout = queue_timeout;
    let gateway = Gateway::new(config, state)
        .unwrap()
        .with_listener(listener.clone());
    (gateway, listener)
}

pub(crate) fn user_identity() -> Identity {
    serde_json::from_value(user_json()).unwrap()
}

fn user_json() -> Value {
    json!({"id": 7, "email": "ada@example.com", "nickname": "Ada", "role": "ROLE_USER"})
}

fn problem(status: StatusCode, detail: &str) -> Response {
    (
        status,
        Json(json!({
            "type": "about:blank",
            "title": status.canonical_reason().unwrap_or(""),
            "status": status.as_u16(),
            "detail": detail,
        })),
    )
        .into_response()
}

fn unauthorized() -> Response {
    problem(StatusCode::UNAUTHORIZED, "Access token expired")
}

fn grant(state: &MockState, token: &str) -> Response {
    *state.valid_token.lock().unwrap() = token.to_string();
    (
        [(header::SET_COOKIE, "refreshToken=rt_1; Path=/; HttpOnly")],
        Json(json!({"accessToken": token, "tokenType": "Bearer", "user": user_json()})),
    )
        .into_response()
}

async fn login(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record("/auth/login", &headers);
    if body["password"] == GOOD_PASSWORD {
        grant(&state, "T1")
    } else {
        problem(StatusCode::UNAUTHORIZED, "Invalid email or password")
    }
}

async fn register(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record("/auth/register", &headers);
    match body["email"].as_str() {
        Some(email) if email.contains('@') => grant(&state, "T1"),
        _ => problem(StatusCode::BAD_REQUEST, "Email must be valid"),
    }
}

async fn refresh(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.record("/auth/refresh", &headers);
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *state.refresh_delay.lock().unwrap();
    tokio::time::sleep(delay).await;

    let status = StatusCode::from_u16(state.refresh_status.load(Ordering::SeqCst)).unwrap();
    if !status.is_success() {
        return problem(status, "refresh unavailable");
    }
    let has_cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("refreshToken="));
    if state.require_cookie.load(Ordering::SeqCst) && !has_cookie {
        return problem(StatusCode::UNAUTHORIZED, "Refresh token missing");
    }

    let token = state.issued_token.lock().unwrap().clone();
    *state.valid_token.lock().unwrap() = token.clone();
    (
        [(header::SET_COOKIE, "refreshToken=rt_2; Path=/; HttpOnly")],
        Json(json!({"accessToken": token})),
    )
        .into_response()
}

async fn logout(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.record("/auth/logout", &headers);
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::from_u16(state.logout_status.load(Ordering::SeqCst))
        .unwrap()
        .into_response()
}

async fn me(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.record("/auth/me", &headers);
    if !state.authorized(&headers) {
        return unauthorized();
    }
    Json(user_json()).into_response()
}

async fn item(
    State(state): State<Arc<MockState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.record(&format!("/items/{name}"), &headers);
    if !state.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"name": name})).into_response()
}

async fn remove_item(
    State(state): State<Arc<MockState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.record(&format!("/items/{name}"), &headers);
    if !state.authorized(&headers) {
        return unauthorized();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn reject(
    State(state): State<Arc<MockState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.record(&format!("/reject/{name}"), &headers);
    problem(StatusCode::UNAUTHORIZED, "Token revoked")
}

/// Always 401, answered late enough for the session to change meanwhile.
async fn revoked(
    State(state): State<Arc<MockState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.record(&format!("/revoked/{name}"), &headers);
    tokio::time::sleep(Duration::from_millis(150)).await;
    problem(StatusCode::UNAUTHORIZED, "Token revoked")
}

/// Checks the token only after a delay, so a refresh can complete meanwhile.
async fn delayed(
    State(state): State<Arc<MockState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.record(&format!("/delayed/{name}"), &headers);
    tokio::time::sleep(Duration::from_millis(100)).await;
    if !state.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"name": name})).into_response()
}

/// Public and slow; never answers 401.
async fn slow(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.record("/slow", &headers);
    tokio::time::sleep(Duration::from_millis(150)).await;
    Json(json!({"slow": true})).into_response()
}

async fn broken(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.record("/broken", &headers);
    problem(StatusCode::INTERNAL_SERVER_ERROR, "database unavailable")
}

async fn echo(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record("/echo", &headers);
    if !state.authorized(&headers) {
        return unauthorized();
    }
    Json(body).into_response()
}

/// Bare HTTP/1.1 API whose 401 on `/slow-body` sends its headers at once and
/// its body 300 ms later. Nothing is accepted until `/auth/refresh` issues `T2`.
pub(crate) struct SlowBodyApi {
    pub url: String,
    pub refresh_calls: Arc<AtomicUsize>,
}

impl SlowBodyApi {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let refresh_calls = Arc::new(AtomicUsize::new(0));
        let valid = Arc::new(Mutex::new(String::new()));

        let calls = refresh_calls.clone();
        tokio::spawn(async move {
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                tokio::spawn(serve_raw(socket, calls.clone(), valid.clone()));
            }
        });

        Self {
            url: format!("http://{addr}"),
            refresh_calls,
        }
    }
}

async fn serve_raw(
    mut socket: TcpStream,
    refresh_calls: Arc<AtomicUsize>,
    valid: Arc<Mutex<String>>,
) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    let head = String::from_utf8_lossy(&head).into_owned();
    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    let auth = head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.eq_ignore_ascii_case("authorization")
            .then(|| value.trim().to_string())
    });

    if path == "/auth/refresh" {
        refresh_calls.fetch_add(1, Ordering::SeqCst);
        *valid.lock().unwrap() = "T2".into();
        write_raw(&mut socket, "200 OK", r#"{"accessToken":"T2"}"#, Duration::ZERO).await;
        return;
    }

    let accepted = {
        let valid = valid.lock().unwrap();
        !valid.is_empty() && auth.as_deref() == Some(format!("Bearer {valid}").as_str())
    };
    let expired = r#"{"status":401,"detail":"Access token expired"}"#;
    if accepted {
        write_raw(&mut socket, "200 OK", r#"{"ok":true}"#, Duration::ZERO).await;
    } else if path == "/slow-body" {
        write_raw(&mut socket, "401 Unauthorized", expired, Duration::from_millis(300)).await;
    } else {
        write_raw(&mut socket, "401 Unauthorized", expired, Duration::ZERO).await;
    }
}

/// Write headers, flush, then the body after `body_delay`. The client may
/// hang up before reading the body.
async fn write_raw(socket: &mut TcpStream, status: &str, body: &str, body_delay: Duration) {
    let head = format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
        body.len()
    );
    if socket.write_all(head.as_bytes()).await.is_err() || socket.flush().await.is_err() {
        return;
    }
    tokio::time::sleep(body_delay).await;
    let _ = socket.write_all(body.as_bytes()).await;
}
