// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access token renewal with single-flight coalescing.
//!
//! At most one token exchange is outstanding at any instant. Callers that
//! arrive while an exchange is in flight are parked as waiters and released
//! with the leader's result.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::event::SessionEvent;
use crate::store::CredentialStore;

type Waiter = oneshot::Sender<Option<String>>;

enum Flight {
    Idle,
    Refreshing { waiters: Vec<Waiter> },
}

/// Outcome of trying to become the leader of a refresh.
enum Role {
    Leader,
    Follower(oneshot::Receiver<Option<String>>),
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
}

pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    http: reqwest::Client,
    endpoint: String,
    flight: Mutex<Flight>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<CredentialStore>, http: reqwest::Client, base_url: &str) -> Self {
        Self {
            store,
            http,
            endpoint: format!("{}/auth/refresh", base_url.trim_end_matches('/')),
            flight: Mutex::new(Flight::Idle),
        }
    }

    /// Whether a token exchange is currently outstanding.
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.flight.lock(), Flight::Refreshing { .. })
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Returns `None` without touching the network when there is no refresh
    /// token, and `None` when the exchange fails. A failure never clears
    /// credentials; the caller decides whether it is terminal.
    pub async fn refresh(&self) -> Option<String> {
        let Some(refresh_token) = self.store.refresh_token() else {
            debug!("no refresh token, skipping refresh");
            return None;
        };

        match self.claim() {
            Role::Follower(rx) => {
                debug!("joining in-flight refresh");
                rx.await.unwrap_or(None)
            }
            Role::Leader => {
                let guard = FlightGuard { flight: &self.flight, settled: false };
                let token = match self.exchange(&refresh_token).await {
                    Ok(token) if self.store.renew_access_token(&refresh_token, token.clone()) => {
                        self.store.emit(SessionEvent::TokenRenewed);
                        info!("access token renewed");
                        Some(token)
                    }
                    Ok(_) => {
                        debug!("session changed during refresh, discarding renewed token");
                        None
                    }
                    Err(e) => {
                        warn!("token refresh failed: {e:#}");
                        None
                    }
                };
                guard.settle(token.clone());
                token
            }
        }
    }

    /// Idle -> Refreshing transition, or registration as a waiter.
    fn claim(&self) -> Role {
        let mut flight = self.flight.lock();
        match &mut *flight {
            Flight::Refreshing { waiters } => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Role::Follower(rx)
            }
            Flight::Idle => {
                *flight = Flight::Refreshing { waiters: Vec::new() };
                Role::Leader
            }
        }
    }

    async fn exchange(&self, refresh_token: &str) -> anyhow::Result<String> {
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(refresh_token)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("refresh failed ({status}): {text}");
        }

        let body: RefreshResponse = resp.json().await?;
        if body.access_token.is_empty() {
            anyhow::bail!("refresh response carried an empty access token");
        }
        Ok(body.access_token)
    }
}

/// Returns the flight to `Idle` and releases waiters, even when the leading
/// future is dropped mid-exchange.
struct FlightGuard<'a> {
    flight: &'a Mutex<Flight>,
    settled: bool,
}

impl FlightGuard<'_> {
    fn settle(mut self, token: Option<String>) {
        self.release(token);
        self.settled = true;
    }

    fn release(&self, token: Option<String>) {
        let waiters = match std::mem::replace(&mut *self.flight.lock(), Flight::Idle) {
            Flight::Refreshing { waiters } => waiters,
            Flight::Idle => Vec::new(),
        };
        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), "releasing refresh waiters");
        }
        for waiter in waiters {
            let _ = waiter.send(token.clone());
        }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.release(None);
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
