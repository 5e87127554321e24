// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential store: the one shared, mutable view of the session.
//!
//! All mutations are synchronous and persist before the lock is released, so
//! a reader never sees an in-memory state that disk does not also hold. The
//! lock is never held across an `.await`.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::event::SessionEvent;
use crate::persist::{PersistedSession, SessionStorage, TokenJar};

/// Profile of the signed-in user, as returned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub primary_email: Option<String>,
    #[serde(default)]
    pub verified: Option<bool>,
}

/// In-memory credential record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialRecord {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<UserProfile>,
    pub otp_verified: bool,
    pub role: Option<String>,
    /// An auth action is in flight. Never persisted.
    pub loading: bool,
    /// Last auth action failure. Never persisted.
    pub error: Option<String>,
}

impl CredentialRecord {
    pub fn has_tokens(&self) -> bool {
        self.access_token.is_some() || self.refresh_token.is_some()
    }

    fn has_session(&self) -> bool {
        self.has_tokens() || self.user.is_some() || self.otp_verified || self.role.is_some()
    }
}

/// Partial update applied by [`CredentialStore::set`]. `None` leaves a field
/// untouched; fields are only ever nulled by [`CredentialStore::clear`].
#[derive(Debug, Clone, Default)]
pub struct CredentialUpdate {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<UserProfile>,
    pub otp_verified: Option<bool>,
    pub role: Option<String>,
}

/// What [`CredentialStore::hydrate`] found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hydrated {
    /// The session blob was present and loaded.
    Restored,
    /// No session blob, but the token jar still held tokens.
    Reconciled,
    /// Nothing persisted.
    Empty,
}

pub struct CredentialStore {
    record: RwLock<CredentialRecord>,
    storage: Arc<dyn SessionStorage>,
    token_tx: watch::Sender<Option<String>>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn SessionStorage>, event_tx: broadcast::Sender<SessionEvent>) -> Self {
        let (token_tx, _) = watch::channel(None);
        Self { record: RwLock::new(CredentialRecord::default()), storage, token_tx, event_tx }
    }

    pub fn get(&self) -> CredentialRecord {
        self.record.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.record.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.record.read().refresh_token.clone()
    }

    /// Apply a partial update and persist it.
    pub fn set(&self, update: CredentialUpdate) {
        let mut record = self.record.write();
        let token_changed = update.access_token.is_some();
        if let Some(token) = update.access_token {
            record.access_token = Some(token);
        }
        if let Some(token) = update.refresh_token {
            record.refresh_token = Some(token);
        }
        if let Some(user) = update.user {
            record.user = Some(user);
        }
        if let Some(verified) = update.otp_verified {
            record.otp_verified = verified;
        }
        if let Some(role) = update.role {
            record.role = Some(role);
        }
        self.persist(&record);
        if token_changed {
            self.token_tx.send_replace(record.access_token.clone());
        }
    }

    /// Replace only the access token (refresh path).
    pub fn set_access_token(&self, token: String) {
        self.set(CredentialUpdate { access_token: Some(token), ..Default::default() });
    }

    /// Install a renewed access token, but only if the session that owned
    /// `exchanged` is still the current one.
    ///
    /// Returns `false` when the store was cleared or signed into another
    /// session while the exchange was in flight.
    pub fn renew_access_token(&self, exchanged: &str, token: String) -> bool {
        let mut record = self.record.write();
        if record.refresh_token.as_deref() != Some(exchanged) {
            return false;
        }
        record.access_token = Some(token);
        self.persist(&record);
        self.token_tx.send_replace(record.access_token.clone());
        true
    }

    /// Replace the whole credential record with a freshly issued session.
    ///
    /// Verification state and tokens of any previous session are dropped.
    pub fn begin_session(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        user: UserProfile,
    ) {
        let mut record = self.record.write();
        *record = CredentialRecord {
            access_token: Some(access_token),
            refresh_token,
            user: Some(user),
            loading: record.loading,
            error: record.error.take(),
            ..Default::default()
        };
        self.persist(&record);
        self.token_tx.send_replace(record.access_token.clone());
    }

    pub fn set_loading(&self, loading: bool) {
        self.record.write().loading = loading;
    }

    pub fn set_error(&self, error: Option<String>) {
        self.record.write().error = error;
    }

    /// Null every field and remove the durable copy before returning.
    ///
    /// Returns `true` if there was a session to clear.
    pub fn clear(&self) -> bool {
        let mut record = self.record.write();
        self.clear_locked(&mut record)
    }

    /// Terminal failure: clear everything and ask for a fresh login.
    ///
    /// Idempotent. `LoginRequired` is emitted only by the call that actually
    /// cleared a session.
    pub fn force_logout(&self, reason: &str) -> bool {
        let mut record = self.record.write();
        let cleared = self.clear_locked(&mut record);
        drop(record);
        self.announce_logout(cleared, reason);
        cleared
    }

    /// [`force_logout`](Self::force_logout) scoped to the session that owned
    /// `refresh_token`. A session signed in since then is left alone.
    pub fn force_logout_session(&self, refresh_token: Option<&str>, reason: &str) -> bool {
        let mut record = self.record.write();
        if record.refresh_token.as_deref() != refresh_token {
            debug!(reason, "session replaced since the failure, not logging out");
            return false;
        }
        let cleared = self.clear_locked(&mut record);
        drop(record);
        self.announce_logout(cleared, reason);
        cleared
    }

    fn clear_locked(&self, record: &mut CredentialRecord) -> bool {
        let had_session = record.has_session();
        *record = CredentialRecord::default();
        if let Err(e) = self.storage.clear() {
            warn!("failed to clear persisted session: {e:#}");
        }
        self.token_tx.send_replace(None);
        had_session
    }

    fn announce_logout(&self, cleared: bool, reason: &str) {
        if cleared {
            info!(reason, "session ended, login required");
            self.emit(SessionEvent::LoginRequired { reason: reason.to_owned() });
        } else {
            debug!(reason, "forced logout on an already empty session");
        }
    }

    /// Load whatever a previous process persisted.
    pub fn hydrate(&self) -> Hydrated {
        let session = match self.storage.load_session() {
            Ok(s) => s,
            Err(e) => {
                warn!("ignoring persisted session: {e:#}");
                None
            }
        };
        let jar = match self.storage.load_tokens() {
            Ok(j) => j,
            Err(e) => {
                warn!("ignoring persisted tokens: {e:#}");
                TokenJar::default()
            }
        };

        let mut record = self.record.write();
        let outcome = match session {
            Some(session) => {
                record.access_token = session.token.or(jar.access_token);
                record.refresh_token = jar.refresh_token;
                record.user = session.user;
                record.otp_verified = session.otp_verified;
                record.role = session.role;
                Hydrated::Restored
            }
            None if !jar.is_empty() => {
                record.access_token = jar.access_token;
                record.refresh_token = jar.refresh_token;
                Hydrated::Reconciled
            }
            None => Hydrated::Empty,
        };

        // Verification flags never outlive the tokens that earned them.
        if !record.has_tokens() {
            record.otp_verified = false;
            record.role = None;
        }
        if outcome == Hydrated::Reconciled {
            self.persist(&record);
        }
        self.token_tx.send_replace(record.access_token.clone());
        debug!(?outcome, authenticated = record.has_tokens(), "hydrated credential store");
        outcome
    }

    /// Watch the current access token. Fires on every change.
    pub fn subscribe_token(&self) -> watch::Receiver<Option<String>> {
        self.token_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    fn persist(&self, record: &CredentialRecord) {
        let session = PersistedSession {
            token: record.access_token.clone(),
            user: record.user.clone(),
            otp_verified: record.otp_verified,
            role: record.role.clone(),
            ..Default::default()
        };
        let jar = TokenJar {
            access_token: record.access_token.clone(),
            refresh_token: record.refresh_token.clone(),
        };
        if let Err(e) = self.storage.save_session(&session) {
            warn!("failed to persist session: {e:#}");
        }
        if let Err(e) = self.storage.save_tokens(&jar) {
            warn!("failed to persist tokens: {e:#}");
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
