// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable session storage: versioned JSON blobs with atomic writes.
//!
//! Two files live in the state directory:
//!
//! - `session.json` holds the access token, user profile and verification
//!   flags under an explicit schema version.
//! - `tokens.json` is the cookie-equivalent jar holding the access and
//!   refresh tokens. The refresh token is only ever written here.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::UserProfile;

/// Current `session.json` schema version.
pub const SCHEMA_VERSION: u32 = 2;

const SESSION_FILE: &str = "session.json";
const TOKENS_FILE: &str = "tokens.json";

/// Persisted session blob (schema v2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub otp_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Default for PersistedSession {
    fn default() -> Self {
        Self { version: SCHEMA_VERSION, token: None, user: None, otp_verified: false, role: None }
    }
}

/// Schema v1: the unversioned camelCase blob written by the web client.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySession {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
    #[serde(default)]
    otp_verified: bool,
    #[serde(default)]
    role: Option<String>,
}

impl From<LegacySession> for PersistedSession {
    fn from(old: LegacySession) -> Self {
        Self {
            version: SCHEMA_VERSION,
            token: old.token,
            user: old.user,
            otp_verified: old.otp_verified,
            role: old.role,
        }
    }
}

/// Result of reading a session blob of any known version.
#[derive(Debug, Clone, PartialEq)]
pub enum Migration {
    /// Already at [`SCHEMA_VERSION`].
    Current(PersistedSession),
    /// Read from an older schema; should be rewritten.
    Upgraded { from: u32, session: PersistedSession },
}

impl Migration {
    pub fn into_session(self) -> PersistedSession {
        match self {
            Self::Current(s) | Self::Upgraded { session: s, .. } => s,
        }
    }
}

/// Bring a raw session blob up to the current schema.
///
/// A blob without a `version` field is schema v1. Versions newer than
/// [`SCHEMA_VERSION`] are rejected rather than guessed at.
pub fn migrate(raw: serde_json::Value) -> anyhow::Result<Migration> {
    let version = match raw.get("version") {
        None => 1,
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| anyhow::anyhow!("invalid session schema version: {v}"))?,
    };

    match version {
        1 => {
            let legacy: LegacySession = serde_json::from_value(raw)?;
            Ok(Migration::Upgraded { from: 1, session: legacy.into() })
        }
        SCHEMA_VERSION => Ok(Migration::Current(serde_json::from_value(raw)?)),
        v if v > SCHEMA_VERSION => {
            anyhow::bail!("session schema version {v} is newer than supported {SCHEMA_VERSION}")
        }
        v => anyhow::bail!("unknown session schema version: {v}"),
    }
}

/// Cookie-equivalent token jar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenJar {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenJar {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// Durable backing for the credential store.
///
/// Implementations must make `clear` take effect before returning, so a
/// restart right after a logout never resurrects the old session.
pub trait SessionStorage: Send + Sync {
    fn load_session(&self) -> anyhow::Result<Option<PersistedSession>>;
    fn save_session(&self, session: &PersistedSession) -> anyhow::Result<()>;
    fn load_tokens(&self) -> anyhow::Result<TokenJar>;
    fn save_tokens(&self, jar: &TokenJar) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// File-backed storage rooted at a state directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    fn tokens_path(&self) -> PathBuf {
        self.dir.join(TOKENS_FILE)
    }
}

impl SessionStorage for FileStorage {
    fn load_session(&self) -> anyhow::Result<Option<PersistedSession>> {
        let path = self.session_path();
        let Some(contents) = read_optional(&path)? else {
            return Ok(None);
        };
        let raw: serde_json::Value = serde_json::from_str(&contents)?;
        match migrate(raw)? {
            Migration::Current(session) => Ok(Some(session)),
            Migration::Upgraded { from, session } => {
                save_json(&path, &session)?;
                info!(path = %path.display(), from, to = SCHEMA_VERSION, "migrated session file");
                Ok(Some(session))
            }
        }
    }

    fn save_session(&self, session: &PersistedSession) -> anyhow::Result<()> {
        save_json(&self.session_path(), session)
    }

    fn load_tokens(&self) -> anyhow::Result<TokenJar> {
        match read_optional(&self.tokens_path())? {
            Some(contents) => Ok(serde_json::from_str(&contents)?),
            None => Ok(TokenJar::default()),
        }
    }

    fn save_tokens(&self, jar: &TokenJar) -> anyhow::Result<()> {
        save_json(&self.tokens_path(), jar)
    }

    fn clear(&self) -> anyhow::Result<()> {
        for path in [self.session_path(), self.tokens_path()] {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// In-memory storage for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<(Option<PersistedSession>, TokenJar)>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate as if a previous process had written these values.
    pub fn with_contents(session: Option<PersistedSession>, jar: TokenJar) -> Self {
        Self { inner: Mutex::new((session, jar)) }
    }

    pub fn snapshot(&self) -> (Option<PersistedSession>, TokenJar) {
        self.inner.lock().clone()
    }
}

impl SessionStorage for MemoryStorage {
    fn load_session(&self) -> anyhow::Result<Option<PersistedSession>> {
        Ok(self.inner.lock().0.clone())
    }

    fn save_session(&self, session: &PersistedSession) -> anyhow::Result<()> {
        self.inner.lock().0 = Some(session.clone());
        Ok(())
    }

    fn load_tokens(&self) -> anyhow::Result<TokenJar> {
        Ok(self.inner.lock().1.clone())
    }

    fn save_tokens(&self, jar: &TokenJar) -> anyhow::Result<()> {
        self.inner.lock().1 = jar.clone();
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        *self.inner.lock() = (None, TokenJar::default());
        Ok(())
    }
}

fn read_optional(path: &Path) -> anyhow::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write JSON atomically (unique tmp file + rename), owner-only on unix.
///
/// The tmp name carries PID and a counter so concurrent saves of the same
/// file never share a tmp path.
fn save_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
