// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: token builders and a scripted backend.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::codec::epoch_ms;
use crate::session::ensure_crypto;

/// Build a `header.payload.sig` token around a raw JSON payload.
pub fn token_with_payload(payload: &str) -> String {
    format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", URL_SAFE_NO_PAD.encode(payload))
}

/// A token whose `exp` lies `secs` seconds from now (negative for the past).
pub fn token_expiring_in(secs: i64) -> String {
    let exp = epoch_ms() / 1000 + secs;
    let nonce = NONCE.fetch_add(1, Ordering::Relaxed);
    token_with_payload(&format!(r#"{{"exp": {exp}, "sub": 1, "jti": {nonce}}}"#))
}

static NONCE: AtomicU64 = AtomicU64::new(0);

/// A reqwest client with the crypto provider installed.
pub fn http_client() -> reqwest::Client {
    ensure_crypto();
    reqwest::Client::new()
}

pub const REFRESH_TOKEN: &str = "refresh-1";
pub const VALID_OTP: &str = "123456";

/// Knobs and counters behind [`MockBackend`].
pub struct MockState {
    /// Bearer token accepted by protected routes.
    pub valid_token: Mutex<String>,
    /// Token handed out by the next successful `/auth/refresh`.
    pub next_token: Mutex<String>,
    /// Status `/auth/refresh` answers with.
    pub refresh_status: AtomicU16,
    pub refresh_delay_ms: AtomicU64,
    pub refresh_calls: AtomicU32,
    pub refresh_bodies: Mutex<Vec<Value>>,
    pub refresh_bearers: Mutex<Vec<Option<String>>>,
    /// Authorization header of every `/projects/` call, in order.
    pub project_auth: Mutex<Vec<Option<String>>>,
    /// Raw query string of every `/projects/` call, in order.
    pub project_queries: Mutex<Vec<Option<String>>>,
    /// Delay before `GET /projects/` checks its bearer token.
    pub project_delay_ms: AtomicU64,
    /// Protected routes reject every token.
    pub reject_all: AtomicBool,
    pub logout_calls: AtomicU32,
    pub logout_status: AtomicU16,
}

/// A real HTTP server on `127.0.0.1:0` speaking the backend's auth and
/// resource routes.
pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockBackend {
    /// Start a backend whose currently valid token is `valid_token`.
    pub async fn start(valid_token: &str) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            valid_token: Mutex::new(valid_token.to_owned()),
            next_token: Mutex::new(token_expiring_in(3600)),
            refresh_status: AtomicU16::new(200),
            refresh_delay_ms: AtomicU64::new(0),
            refresh_calls: AtomicU32::new(0),
            refresh_bodies: Mutex::new(Vec::new()),
            refresh_bearers: Mutex::new(Vec::new()),
            project_auth: Mutex::new(Vec::new()),
            project_queries: Mutex::new(Vec::new()),
            project_delay_ms: AtomicU64::new(0),
            reject_all: AtomicBool::new(false),
            logout_calls: AtomicU32::new(0),
            logout_status: AtomicU16::new(200),
        });

        let app = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/register", post(register))
            .route("/auth/send-otp", post(message_ok))
            .route("/auth/verify-otp", post(verify_otp))
            .route("/auth/forgot-password", post(message_ok))
            .route("/auth/reset-password", post(message_ok))
            .route("/auth/refresh", post(refresh))
            .route("/auth/logout", get(logout))
            .route("/user/profile", get(profile))
            .route("/user/update-profile", put(update_profile))
            .route("/user/subscribe", post(message_ok))
            .route("/user/profiles", get(profiles))
            .route("/projects/", get(projects).post(create_project))
            .route("/projects/user", get(projects))
            .route("/projects/{id}", delete(delete_project))
            .route("/tasks/", get(tasks))
            .route("/tasks/user-tasks", get(tasks))
            .route("/tasks/team-tasks", get(tasks))
            .route("/tasks/{id}/assign", put(assign_task))
            .route("/tasks/{id}/archive", delete(archive_task))
            .route("/analytics/stats", get(stats))
            .route("/boom", get(boom))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { addr, state })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn refresh_calls(&self) -> u32 {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn project_auth(&self) -> Vec<Option<String>> {
        self.state.project_auth.lock().clone()
    }

    pub fn set_next_token(&self, token: &str) {
        *self.state.next_token.lock() = token.to_owned();
    }

    pub fn set_valid_token(&self, token: &str) {
        *self.state.valid_token.lock() = token.to_owned();
    }

    pub fn set_refresh_status(&self, status: u16) {
        self.state.refresh_status.store(status, Ordering::SeqCst);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.state.refresh_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_project_delay(&self, delay: Duration) {
        self.state.project_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_reject_all(&self, reject: bool) {
        self.state.reject_all.store(reject, Ordering::SeqCst);
    }
}

type Reply = (StatusCode, Json<Value>);

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers.get("authorization").and_then(|v| v.to_str().ok()).map(str::to_owned)
}

fn authorized(state: &MockState, headers: &HeaderMap) -> bool {
    if state.reject_all.load(Ordering::SeqCst) {
        return false;
    }
    let expected = format!("Bearer {}", state.valid_token.lock());
    bearer(headers).as_deref() == Some(expected.as_str())
}

fn unauthorized() -> Reply {
    (StatusCode::UNAUTHORIZED, Json(json!({ "msg": "Token has expired" })))
}

fn user_json(email: &str) -> Value {
    json!({
        "username": "ada",
        "email": email,
        "role": "user",
        "phone": null,
        "location": null,
        "gender": null,
        "primary_email": null,
        "verified": false,
    })
}

async fn login(State(s): State<Arc<MockState>>, Json(body): Json<Value>) -> Reply {
    let email = body["email"].as_str().unwrap_or_default().to_owned();
    if body["password"].as_str() == Some("wrong") {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid credentials" })));
    }
    let token = s.valid_token.lock().clone();
    (
        StatusCode::OK,
        Json(json!({
            "message": "OTP sent",
            "access_token": token,
            "refresh_token": REFRESH_TOKEN,
            "user": user_json(&email),
        })),
    )
}

async fn register(State(s): State<Arc<MockState>>, Json(body): Json<Value>) -> Reply {
    if body["username"].as_str() == Some("taken") {
        return (StatusCode::BAD_REQUEST, Json(json!({ "username": "Username already exists" })));
    }
    if body["password"] != body["confirmPassword"] {
        return (StatusCode::BAD_REQUEST, Json(json!({ "confirmPassword": "Passwords do not match" })));
    }
    let email = body["email"].as_str().unwrap_or_default().to_owned();
    let token = s.valid_token.lock().clone();
    (
        StatusCode::OK,
        Json(json!({
            "message": "User registered successfully",
            "access_token": token,
            "refresh_token": REFRESH_TOKEN,
            "user": user_json(&email),
        })),
    )
}

async fn verify_otp(State(s): State<Arc<MockState>>, Json(body): Json<Value>) -> Reply {
    if body["otp"].as_str() != Some(VALID_OTP) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid OTP" })));
    }
    let token = s.valid_token.lock().clone();
    (
        StatusCode::OK,
        Json(json!({
            "message": "Verification success",
            "access_token": token,
            "refresh_token": "refresh-verified",
            "role": "admin",
        })),
    )
}

async fn message_ok() -> Reply {
    (StatusCode::OK, Json(json!({ "message": "ok" })))
}

async fn refresh(State(s): State<Arc<MockState>>, headers: HeaderMap, body: Option<Json<Value>>) -> Reply {
    s.refresh_calls.fetch_add(1, Ordering::SeqCst);
    s.refresh_bodies.lock().push(body.map(|Json(v)| v).unwrap_or(Value::Null));
    s.refresh_bearers.lock().push(bearer(&headers));

    let delay = s.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let status = s.refresh_status.load(Ordering::SeqCst);
    if status != 200 {
        let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (code, Json(json!({ "error": "refresh rejected" })));
    }
    let next = s.next_token.lock().clone();
    *s.valid_token.lock() = next.clone();
    (StatusCode::OK, Json(json!({ "access_token": next })))
}

async fn logout(State(s): State<Arc<MockState>>) -> Reply {
    s.logout_calls.fetch_add(1, Ordering::SeqCst);
    let status = s.logout_status.load(Ordering::SeqCst);
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    (code, Json(json!({ "message": "Successfully logged out" })))
}

async fn profile(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Reply {
    if !authorized(&s, &headers) {
        return unauthorized();
    }
    (StatusCode::OK, Json(json!({ "user": user_json("ada@example.com") })))
}

async fn update_profile(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    if !authorized(&s, &headers) {
        return unauthorized();
    }
    let mut user = user_json("ada@example.com");
    if let (Some(user), Some(changes)) = (user.as_object_mut(), body.as_object()) {
        for (k, v) in changes {
            user.insert(k.clone(), v.clone());
        }
    }
    (StatusCode::OK, Json(json!({ "user": user })))
}

async fn profiles(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Reply {
    if !authorized(&s, &headers) {
        return unauthorized();
    }
    (StatusCode::OK, Json(json!([user_json("ada@example.com"), user_json("bob@example.com")])))
}

async fn projects(
    State(s): State<Arc<MockState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Reply {
    s.project_auth.lock().push(bearer(&headers));
    s.project_queries.lock().push(query);
    let delay = s.project_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if !authorized(&s, &headers) {
        return unauthorized();
    }
    (StatusCode::OK, Json(json!([{ "id": 1, "name": "Apollo", "description": "moonshot" }])))
}

async fn create_project(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    if !authorized(&s, &headers) {
        return unauthorized();
    }
    (StatusCode::CREATED, Json(json!({ "id": 2, "name": body["name"], "description": body["description"] })))
}

async fn delete_project(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Reply {
    if !authorized(&s, &headers) {
        return unauthorized();
    }
    if id != 1 {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "Project not found" })));
    }
    (StatusCode::OK, Json(json!({ "message": "Project deleted" })))
}

async fn tasks(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Reply {
    if !authorized(&s, &headers) {
        return unauthorized();
    }
    (StatusCode::OK, Json(json!([{ "id": 7, "title": "Write report", "status": "pending" }])))
}

async fn assign_task(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Reply {
    if !authorized(&s, &headers) {
        return unauthorized();
    }
    (StatusCode::OK, Json(json!({ "id": id, "assigned_to": body["user_id"] })))
}

async fn archive_task(
    State(s): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Reply {
    if !authorized(&s, &headers) {
        return unauthorized();
    }
    (StatusCode::OK, Json(json!({ "message": format!("Task {id} archived") })))
}

async fn stats(State(s): State<Arc<MockState>>, headers: HeaderMap) -> Reply {
    if !authorized(&s, &headers) {
        return unauthorized();
    }
    (StatusCode::OK, Json(json!({ "total_tasks": 3, "completed": 1 })))
}

async fn boom() -> Reply {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "kaboom" })))
}
