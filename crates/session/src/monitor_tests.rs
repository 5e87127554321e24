// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::event::SessionEvent;
use crate::persist::MemoryStorage;
use crate::store::CredentialUpdate;
use crate::test_support::{http_client, token_expiring_in, MockBackend, REFRESH_TOKEN};

const BUFFER: Duration = Duration::from_secs(120);

struct Fixture {
    backend: MockBackend,
    store: Arc<CredentialStore>,
    monitor: Arc<SessionMonitor>,
    events: broadcast::Receiver<SessionEvent>,
    shutdown: CancellationToken,
}

async fn fixture(access: Option<String>) -> anyhow::Result<Fixture> {
    let backend = MockBackend::start("server-side").await?;
    let (event_tx, events) = broadcast::channel(16);
    let store = Arc::new(CredentialStore::new(Arc::new(MemoryStorage::new()), event_tx));
    store.set(CredentialUpdate {
        access_token: access,
        refresh_token: Some(REFRESH_TOKEN.into()),
        ..Default::default()
    });
    let refresher =
        Arc::new(RefreshCoordinator::new(Arc::clone(&store), http_client(), &backend.url()));
    let monitor = Arc::new(SessionMonitor::new(Arc::clone(&store), refresher, BUFFER));
    Ok(Fixture { backend, store, monitor, events, shutdown: CancellationToken::new() })
}

async fn wait_for_refreshes(backend: &MockBackend, n: u32) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while backend.refresh_calls() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn token_inside_buffer_is_checked_immediately() -> anyhow::Result<()> {
    let f = fixture(Some(token_expiring_in(90))).await?;
    let fresh = token_expiring_in(3600);
    f.backend.set_next_token(&fresh);

    let handle = Arc::clone(&f.monitor).start(&f.shutdown);
    wait_for_refreshes(&f.backend, 1).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(f.store.access_token().as_deref(), Some(fresh.as_str()));
    // The renewed token re-arms far in the future; no second check.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(f.backend.refresh_calls(), 1);
    assert!(handle.is_running());
    handle.stop().await;
    Ok(())
}

#[tokio::test]
async fn armed_timer_fires_at_expiry_minus_buffer() -> anyhow::Result<()> {
    // `exp` has whole-second resolution, so this fires 1-2s from now.
    let f = fixture(Some(token_expiring_in(122))).await?;
    let handle = Arc::clone(&f.monitor).start(&f.shutdown);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(f.backend.refresh_calls(), 0, "fired before expiry - buffer");

    wait_for_refreshes(&f.backend, 1).await?;
    handle.stop().await;
    Ok(())
}

#[tokio::test]
async fn token_change_rearms_pending_timer() -> anyhow::Result<()> {
    let f = fixture(Some(token_expiring_in(123))).await?;
    let handle = Arc::clone(&f.monitor).start(&f.shutdown);
    tokio::time::sleep(Duration::from_millis(100)).await;

    f.store.set_access_token(token_expiring_in(3600));
    tokio::time::sleep(Duration::from_millis(3200)).await;

    assert_eq!(f.backend.refresh_calls(), 0);
    handle.stop().await;
    Ok(())
}

#[tokio::test]
async fn idle_without_token() -> anyhow::Result<()> {
    let f = fixture(None).await?;
    let handle = Arc::clone(&f.monitor).start(&f.shutdown);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(f.backend.refresh_calls(), 0);

    // Signing in arms the monitor.
    f.store.set_access_token(token_expiring_in(30));
    wait_for_refreshes(&f.backend, 1).await?;
    handle.stop().await;
    Ok(())
}

#[tokio::test]
async fn failed_renewal_forces_logout_once() -> anyhow::Result<()> {
    let mut f = fixture(Some(token_expiring_in(60))).await?;
    f.backend.set_refresh_status(401);

    let handle = Arc::clone(&f.monitor).start(&f.shutdown);
    wait_for_refreshes(&f.backend, 1).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!f.store.get().has_tokens());
    assert_eq!(
        f.events.try_recv().ok(),
        Some(SessionEvent::LoginRequired { reason: "session expired".into() })
    );
    assert!(f.events.try_recv().is_err());
    assert_eq!(f.backend.refresh_calls(), 1);
    handle.stop().await;
    Ok(())
}

#[tokio::test]
async fn concurrent_checks_are_skipped() -> anyhow::Result<()> {
    let f = fixture(Some(token_expiring_in(3600))).await?;
    f.backend.set_refresh_delay(Duration::from_millis(200));

    let (a, b) = tokio::join!(f.monitor.check(), f.monitor.check());
    assert_eq!((a, b), (CheckOutcome::Renewed, CheckOutcome::Skipped));
    assert_eq!(f.backend.refresh_calls(), 1);

    // The guard is released once the check settles.
    f.backend.set_refresh_delay(Duration::ZERO);
    assert_eq!(f.monitor.check().await, CheckOutcome::Renewed);
    Ok(())
}

#[tokio::test]
async fn check_now_through_handle() -> anyhow::Result<()> {
    let f = fixture(Some(token_expiring_in(3600))).await?;
    let handle = Arc::clone(&f.monitor).start(&f.shutdown);

    assert_eq!(handle.check_now().await, CheckOutcome::Renewed);
    assert_eq!(f.backend.refresh_calls(), 1);
    handle.stop().await;
    Ok(())
}

#[tokio::test]
async fn stop_cancels_pending_timer() -> anyhow::Result<()> {
    let f = fixture(Some(token_expiring_in(122))).await?;
    let handle = Arc::clone(&f.monitor).start(&f.shutdown);
    tokio::time::sleep(Duration::from_millis(100)).await;

    handle.stop().await;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(f.backend.refresh_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn dropping_handle_or_shutdown_stops_loop() -> anyhow::Result<()> {
    let f = fixture(None).await?;

    let handle = Arc::clone(&f.monitor).start(&f.shutdown);
    f.shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), async {
        while handle.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    let shutdown = CancellationToken::new();
    let handle = Arc::clone(&f.monitor).start(&shutdown);
    drop(handle);
    tokio::time::sleep(Duration::from_millis(50)).await;
    f.store.set_access_token(token_expiring_in(10));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(f.backend.refresh_calls(), 0);
    Ok(())
}
