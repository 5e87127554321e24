// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;

use super::*;
use crate::event::SessionEvent;
use crate::persist::MemoryStorage;
use crate::store::CredentialUpdate;
use crate::test_support::{http_client, token_expiring_in, MockBackend, REFRESH_TOKEN};

struct Fixture {
    backend: MockBackend,
    store: Arc<CredentialStore>,
    gateway: Arc<Gateway>,
    events: broadcast::Receiver<SessionEvent>,
}

/// Backend accepts `server_token`; the store holds `access` and `refresh`.
async fn fixture(
    server_token: &str,
    access: Option<&str>,
    refresh: Option<&str>,
) -> anyhow::Result<Fixture> {
    let backend = MockBackend::start(server_token).await?;
    let (event_tx, events) = broadcast::channel(16);
    let store = Arc::new(CredentialStore::new(Arc::new(MemoryStorage::new()), event_tx));
    store.set(CredentialUpdate {
        access_token: access.map(str::to_owned),
        refresh_token: refresh.map(str::to_owned),
        ..Default::default()
    });
    let http = http_client();
    let refresher =
        Arc::new(RefreshCoordinator::new(Arc::clone(&store), http.clone(), &backend.url()));
    let gateway = Arc::new(Gateway::new(Arc::clone(&store), refresher, http, &backend.url()));
    Ok(Fixture { backend, store, gateway, events })
}

fn bearer(token: &str) -> Option<String> {
    Some(format!("Bearer {token}"))
}

#[tokio::test]
async fn attaches_current_token() -> anyhow::Result<()> {
    let token = token_expiring_in(3600);
    let f = fixture(&token, Some(&token), Some(REFRESH_TOKEN)).await?;

    let projects: Vec<Value> = f.gateway.get("/projects/").await?;
    assert_eq!(projects[0]["name"], "Apollo");
    assert_eq!(f.backend.project_auth(), vec![bearer(&token)]);
    assert_eq!(f.backend.refresh_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn query_parameters_are_sent() -> anyhow::Result<()> {
    let token = token_expiring_in(3600);
    let f = fixture(&token, Some(&token), Some(REFRESH_TOKEN)).await?;

    let req = ApiRequest::get("/projects/").with_query("page", "2");
    let projects = f.gateway.send(&req).await?;
    assert_eq!(projects[0]["id"], 1);
    assert_eq!(*f.backend.state.project_queries.lock(), vec![Some("page=2".to_owned())]);
    Ok(())
}

#[tokio::test]
async fn unauthorized_without_refresh_token_fails_fast() -> anyhow::Result<()> {
    let stale = token_expiring_in(-60);
    let f = fixture("server-side", Some(&stale), None).await?;

    let err = f.gateway.send(&ApiRequest::get("/projects/")).await.err();
    let err = err.ok_or_else(|| anyhow::anyhow!("expected an error"))?;
    assert!(err.is_unauthorized());
    assert_eq!(err.message, "Token has expired");
    assert_eq!(f.backend.refresh_calls(), 0);
    assert_eq!(f.backend.project_auth().len(), 1);
    Ok(())
}

#[tokio::test]
async fn unauthorized_refreshes_once_and_replays_once() -> anyhow::Result<()> {
    let stale = token_expiring_in(-60);
    let fresh = token_expiring_in(3600);
    let f = fixture("server-side", Some(&stale), Some(REFRESH_TOKEN)).await?;
    f.backend.set_next_token(&fresh);

    let body = f.gateway.send(&ApiRequest::get("/projects/")).await?;
    assert_eq!(body[0]["id"], 1);
    assert_eq!(f.backend.refresh_calls(), 1);
    assert_eq!(f.backend.project_auth(), vec![bearer(&stale), bearer(&fresh)]);
    assert_eq!(f.store.access_token().as_deref(), Some(fresh.as_str()));
    Ok(())
}

#[tokio::test]
async fn second_unauthorized_is_not_retried() -> anyhow::Result<()> {
    let stale = token_expiring_in(-60);
    let f = fixture("server-side", Some(&stale), Some(REFRESH_TOKEN)).await?;
    f.backend.set_reject_all(true);

    let err = f.gateway.send(&ApiRequest::get("/projects/")).await.err();
    assert!(err.is_some_and(|e| e.is_unauthorized()));
    assert_eq!(f.backend.refresh_calls(), 1);
    assert_eq!(f.backend.project_auth().len(), 2);
    // The refresh itself succeeded, so the session survives.
    assert!(f.store.get().has_tokens());
    Ok(())
}

#[tokio::test]
async fn failed_refresh_forces_logout_and_returns_original_error() -> anyhow::Result<()> {
    let stale = token_expiring_in(-60);
    let mut f = fixture("server-side", Some(&stale), Some(REFRESH_TOKEN)).await?;
    f.backend.set_refresh_status(500);

    let err = f.gateway.send(&ApiRequest::get("/projects/")).await.err();
    let err = err.ok_or_else(|| anyhow::anyhow!("expected an error"))?;
    assert_eq!(err.status, Some(401));
    assert_eq!(f.backend.project_auth().len(), 1);
    assert!(!f.store.get().has_tokens());
    assert_eq!(
        f.events.try_recv().ok(),
        Some(SessionEvent::LoginRequired { reason: "token refresh failed".into() })
    );
    Ok(())
}

#[tokio::test]
async fn concurrent_unauthorized_requests_share_one_refresh() -> anyhow::Result<()> {
    let stale = token_expiring_in(-60);
    let fresh = token_expiring_in(3600);
    let f = fixture("server-side", Some(&stale), Some(REFRESH_TOKEN)).await?;
    f.backend.set_next_token(&fresh);
    f.backend.set_refresh_delay(Duration::from_millis(150));

    let calls = (0..5).map(|_| {
        let gateway = Arc::clone(&f.gateway);
        async move { gateway.send(&ApiRequest::get("/projects/")).await }
    });
    let results = futures_util::future::join_all(calls).await;

    assert!(results.iter().all(Result::is_ok), "got {results:?}");
    assert_eq!(f.backend.refresh_calls(), 1);
    let retried = f.backend.project_auth().into_iter().filter(|a| *a == bearer(&fresh)).count();
    assert_eq!(retried, 5);
    Ok(())
}

#[tokio::test]
async fn concurrent_failures_log_out_once() -> anyhow::Result<()> {
    let stale = token_expiring_in(-60);
    let mut f = fixture("server-side", Some(&stale), Some(REFRESH_TOKEN)).await?;
    f.backend.set_refresh_status(401);
    f.backend.set_refresh_delay(Duration::from_millis(100));

    let calls = (0..4).map(|_| {
        let gateway = Arc::clone(&f.gateway);
        async move { gateway.send(&ApiRequest::get("/projects/")).await }
    });
    let results = futures_util::future::join_all(calls).await;

    assert!(results.iter().all(|r| r.as_ref().is_err_and(ApiError::is_unauthorized)));
    assert_eq!(f.backend.refresh_calls(), 1);
    assert!(matches!(f.events.try_recv(), Ok(SessionEvent::LoginRequired { .. })));
    assert!(f.events.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn token_renewed_in_flight_is_reused_for_replay() -> anyhow::Result<()> {
    let stale = token_expiring_in(-60);
    let fresh = token_expiring_in(3600);
    let f = fixture(&fresh, Some(&stale), Some(REFRESH_TOKEN)).await?;
    f.backend.set_project_delay(Duration::from_millis(200));

    let pending = {
        let gateway = Arc::clone(&f.gateway);
        tokio::spawn(async move { gateway.send(&ApiRequest::get("/projects/")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    // Another caller renewed while the first attempt was out.
    f.store.set_access_token(fresh.clone());

    pending.await??;
    assert_eq!(f.backend.refresh_calls(), 0);
    assert_eq!(f.backend.project_auth(), vec![bearer(&stale), bearer(&fresh)]);
    Ok(())
}

#[tokio::test]
async fn failed_refresh_spares_a_session_signed_in_meanwhile() -> anyhow::Result<()> {
    let stale = token_expiring_in(-60);
    let mut f = fixture("server-side", Some(&stale), Some(REFRESH_TOKEN)).await?;
    f.backend.set_refresh_status(500);
    f.backend.set_refresh_delay(Duration::from_millis(200));

    let pending = {
        let gateway = Arc::clone(&f.gateway);
        tokio::spawn(async move { gateway.send(&ApiRequest::get("/projects/")).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    f.store.begin_session("bob-access".into(), Some("bob-refresh".into()), Default::default());

    assert!(pending.await?.is_err_and(|e| e.is_unauthorized()));
    assert_eq!(f.store.refresh_token().as_deref(), Some("bob-refresh"));
    assert!(f.events.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn missing_access_token_refreshes_before_sending() -> anyhow::Result<()> {
    let fresh = token_expiring_in(3600);
    let f = fixture("server-side", None, Some(REFRESH_TOKEN)).await?;
    f.backend.set_next_token(&fresh);

    f.gateway.send(&ApiRequest::get("/projects/")).await?;
    assert_eq!(f.backend.refresh_calls(), 1);
    assert_eq!(f.backend.project_auth(), vec![bearer(&fresh)]);
    Ok(())
}

#[tokio::test]
async fn other_errors_pass_through() -> anyhow::Result<()> {
    let token = token_expiring_in(3600);
    let f = fixture(&token, Some(&token), Some(REFRESH_TOKEN)).await?;

    let err = f.gateway.send(&ApiRequest::get("/boom")).await.err();
    let err = err.ok_or_else(|| anyhow::anyhow!("expected an error"))?;
    assert_eq!(err.code, ErrorCode::Upstream);
    assert_eq!(err.status, Some(500));
    assert_eq!(err.message, "kaboom");

    let err = f.gateway.delete::<Value>("/projects/9").await.err();
    assert!(err.is_some_and(|e| e.code == ErrorCode::NotFound));
    assert_eq!(f.backend.refresh_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn typed_helpers_round_trip_bodies() -> anyhow::Result<()> {
    let token = token_expiring_in(3600);
    let f = fixture(&token, Some(&token), None).await?;

    let created: Value =
        f.gateway.post("/projects/", &json!({ "name": "Gemini", "description": "two" })).await?;
    assert_eq!(created["name"], "Gemini");

    let assigned: Value = f.gateway.put("/tasks/7/assign", &json!({ "user_id": 3 })).await?;
    assert_eq!(assigned, json!({ "id": 7, "assigned_to": 3 }));
    Ok(())
}

#[tokio::test]
async fn transport_failure_maps_to_transport_error() -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let (event_tx, _rx) = broadcast::channel(16);
    let store = Arc::new(CredentialStore::new(Arc::new(MemoryStorage::new()), event_tx));
    store.set_access_token("token".into());
    let base = format!("http://{addr}");
    let http = http_client();
    let refresher = Arc::new(RefreshCoordinator::new(Arc::clone(&store), http.clone(), &base));
    let gateway = Gateway::new(store, refresher, http, &base);

    let err = gateway.send(&ApiRequest::get("/projects/")).await.err();
    assert!(err.is_some_and(|e| e.code == ErrorCode::Transport && e.status.is_none()));
    Ok(())
}
