// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session expiry monitor.
//!
//! Watches the stored access token and renews it `buffer` before it
//! expires, independent of request traffic. A token that is already inside
//! the buffer is checked immediately. A failed renewal ends the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::codec;
use crate::refresh::RefreshCoordinator;
use crate::store::CredentialStore;

/// Floor on the re-arm delay when a freshly renewed token is already due.
const MIN_REARM: Duration = Duration::from_secs(1);

/// Result of one renewal check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// A new access token was stored.
    Renewed,
    /// Renewal failed and the session was cleared.
    LoggedOut,
    /// Another check was already running.
    Skipped,
}

pub struct SessionMonitor {
    store: Arc<CredentialStore>,
    refresher: Arc<RefreshCoordinator>,
    buffer: Duration,
    checking: AtomicBool,
}

impl SessionMonitor {
    pub fn new(
        store: Arc<CredentialStore>,
        refresher: Arc<RefreshCoordinator>,
        buffer: Duration,
    ) -> Self {
        Self { store, refresher, buffer, checking: AtomicBool::new(false) }
    }

    /// Spawn the monitor loop. It runs until `shutdown` is cancelled or the
    /// returned handle is stopped or dropped.
    pub fn start(self: Arc<Self>, shutdown: &CancellationToken) -> MonitorHandle {
        let cancel = shutdown.child_token();
        let task = tokio::spawn(Arc::clone(&self).run(cancel.clone()));
        MonitorHandle { monitor: self, cancel, task }
    }

    /// Run one renewal check. Concurrent calls while a check is in progress
    /// return [`CheckOutcome::Skipped`] without touching the network.
    pub async fn check(&self) -> CheckOutcome {
        if self.checking.swap(true, Ordering::AcqRel) {
            debug!("renewal check already in progress");
            return CheckOutcome::Skipped;
        }
        let _guard = CheckingGuard(&self.checking);

        let owner = self.store.refresh_token();
        match self.refresher.refresh().await {
            Some(_) => CheckOutcome::Renewed,
            None => {
                self.store.force_logout_session(owner.as_deref(), "session expired");
                CheckOutcome::LoggedOut
            }
        }
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut token_rx = self.store.subscribe_token();
        let mut renewed: Option<String> = None;
        debug!(buffer_secs = self.buffer.as_secs(), "session monitor started");

        loop {
            let token = token_rx.borrow_and_update().clone();

            if let Some(token) = token {
                let remaining = codec::time_remaining(&token, codec::epoch_ms());
                let delay = if remaining > self.buffer {
                    remaining - self.buffer
                } else if renewed.as_deref() == Some(token.as_str()) {
                    // The backend handed out a token shorter than the buffer.
                    remaining.max(MIN_REARM)
                } else {
                    Duration::ZERO
                };

                if delay.is_zero() {
                    debug!(remaining_ms = remaining.as_millis() as u64, "token inside renewal buffer, checking now");
                } else {
                    debug!(delay_ms = delay.as_millis() as u64, "renewal armed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        changed = token_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            debug!("token changed, re-arming");
                            continue;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }

                let outcome = tokio::select! {
                    _ = cancel.cancelled() => break,
                    outcome = self.check() => outcome,
                };
                match outcome {
                    CheckOutcome::Renewed => {
                        renewed = self.store.access_token();
                        continue;
                    }
                    CheckOutcome::LoggedOut => {
                        info!("session monitor ended the session");
                        renewed = None;
                        continue;
                    }
                    // The running check will change or clear the token.
                    CheckOutcome::Skipped => {}
                }
            } else {
                debug!("no access token, monitor idle");
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = token_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("session monitor stopped");
    }
}

struct CheckingGuard<'a>(&'a AtomicBool);

impl Drop for CheckingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owner of a running monitor. Dropping it stops the loop.
pub struct MonitorHandle {
    monitor: Arc<SessionMonitor>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Trigger a check outside the timer, e.g. on resume.
    pub async fn check_now(&self) -> CheckOutcome {
        self.monitor.check().await
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        let _ = (&mut self.task).await;
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
