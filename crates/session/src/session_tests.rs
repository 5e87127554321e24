// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use serde_json::Value;

use super::*;
use crate::persist::MemoryStorage;
use crate::test_support::{token_expiring_in, MockBackend};

fn config_for(backend: &MockBackend, dir: &std::path::Path) -> ClientConfig {
    let mut config = ClientConfig::new(backend.url());
    config.state_dir = Some(dir.to_path_buf());
    config
}

#[test]
fn rejects_invalid_config() {
    let err = Session::new(&ClientConfig::new("ftp://example.com")).err();
    assert!(err.is_some_and(|e| e.to_string().contains("http://")));
}

#[tokio::test]
async fn restart_restores_persisted_session() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let token = token_expiring_in(3600);
    let backend = MockBackend::start(&token).await?;
    let config = config_for(&backend, dir.path());

    {
        let session = Session::new(&config)?;
        assert_eq!(session.hydrate(), Hydrated::Empty);
        session.auth().login("ada@example.com", "pw").await?;
    }

    let session = Session::new(&config)?;
    assert_eq!(session.hydrate(), Hydrated::Restored);
    assert!(session.is_authenticated());
    assert_eq!(session.store().access_token().as_deref(), Some(token.as_str()));

    let projects: Vec<Value> = session.gateway().get("/projects/").await?;
    assert_eq!(projects.len(), 1);
    assert_eq!(backend.refresh_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn logout_survives_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let backend = MockBackend::start(&token_expiring_in(3600)).await?;
    let config = config_for(&backend, dir.path());

    let session = Session::new(&config)?;
    session.auth().login("ada@example.com", "pw").await?;
    session.auth().logout().await;
    drop(session);

    let session = Session::new(&config)?;
    assert_eq!(session.hydrate(), Hydrated::Empty);
    assert!(!session.is_authenticated());
    Ok(())
}

#[tokio::test]
async fn rotated_server_token_is_renewed_transparently() -> anyhow::Result<()> {
    let backend = MockBackend::start(&token_expiring_in(3600)).await?;
    let session =
        Session::with_storage(&ClientConfig::new(backend.url()), Arc::new(MemoryStorage::new()))?;
    session.auth().login("ada@example.com", "pw").await?;

    // The server stops accepting the issued token.
    backend.set_valid_token("revoked-elsewhere");
    let fresh = token_expiring_in(3600);
    backend.set_next_token(&fresh);

    let stats: Value = session.gateway().get("/analytics/stats").await?;
    assert_eq!(stats["total_tasks"], 3);
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(session.store().access_token().as_deref(), Some(fresh.as_str()));
    Ok(())
}

#[tokio::test]
async fn shutdown_stops_monitor() -> anyhow::Result<()> {
    let backend = MockBackend::start("server-side").await?;
    let session =
        Session::with_storage(&ClientConfig::new(backend.url()), Arc::new(MemoryStorage::new()))?;

    let handle = session.start_monitor();
    assert!(handle.is_running());
    session.shutdown();
    tokio::time::timeout(Duration::from_secs(1), async {
        while handle.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn request_timeout_bounds_token_exchange() -> anyhow::Result<()> {
    let backend = MockBackend::start("server-side").await?;
    backend.set_refresh_delay(Duration::from_secs(5));
    let mut config = ClientConfig::new(backend.url());
    config.request_timeout_ms = 200;
    let session = Session::with_storage(&config, Arc::new(MemoryStorage::new()))?;
    session.store().set(crate::store::CredentialUpdate {
        refresh_token: Some("refresh-1".into()),
        ..Default::default()
    });

    let started = std::time::Instant::now();
    assert_eq!(session.refresher().refresh().await, None);
    assert!(started.elapsed() < Duration::from_secs(2));
    Ok(())
}
