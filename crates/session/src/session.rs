// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session context: one explicit owner for the store, the refresh
//! coordinator, the gateway and the auth client.

use std::sync::{Arc, Once};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::auth::AuthClient;
use crate::config::ClientConfig;
use crate::event::SessionEvent;
use crate::gateway::Gateway;
use crate::monitor::{MonitorHandle, SessionMonitor};
use crate::persist::{FileStorage, SessionStorage};
use crate::refresh::RefreshCoordinator;
use crate::store::{CredentialStore, Hydrated};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls. Only the first call
/// has an effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Build the HTTP client shared by the gateway and the refresh coordinator.
pub fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    ensure_crypto();
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

pub struct Session {
    store: Arc<CredentialStore>,
    refresher: Arc<RefreshCoordinator>,
    gateway: Arc<Gateway>,
    auth: AuthClient,
    renewal_buffer: Duration,
    shutdown: CancellationToken,
}

impl Session {
    /// Open a session persisted under the configured state directory.
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let storage = Arc::new(FileStorage::new(config.resolved_state_dir()));
        Self::with_storage(config, storage)
    }

    pub fn with_storage(
        config: &ClientConfig,
        storage: Arc<dyn SessionStorage>,
    ) -> anyhow::Result<Self> {
        let http = http_client(config.request_timeout())?;
        let (event_tx, _) = broadcast::channel(64);
        let base = config.base();

        let store = Arc::new(CredentialStore::new(storage, event_tx));
        let refresher = Arc::new(RefreshCoordinator::new(Arc::clone(&store), http.clone(), base));
        let gateway =
            Arc::new(Gateway::new(Arc::clone(&store), Arc::clone(&refresher), http, base));
        let auth = AuthClient::new(Arc::clone(&store), Arc::clone(&gateway));
        debug!(base_url = base, "session context created");

        Ok(Self {
            store,
            refresher,
            gateway,
            auth,
            renewal_buffer: config.renewal_buffer(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Load the previous process's credentials into memory.
    pub fn hydrate(&self) -> Hydrated {
        self.store.hydrate()
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn refresher(&self) -> &Arc<RefreshCoordinator> {
        &self.refresher
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.store.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.get().has_tokens()
    }

    /// Start the expiry monitor. It stops when the handle is dropped or the
    /// session shuts down.
    pub fn start_monitor(&self) -> MonitorHandle {
        let monitor = Arc::new(SessionMonitor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.refresher),
            self.renewal_buffer,
        ));
        monitor.start(&self.shutdown)
    }

    /// Stop every background task tied to this session.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
