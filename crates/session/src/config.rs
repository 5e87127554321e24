// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Default time before expiry at which the monitor renews a token.
pub const DEFAULT_RENEWAL_BUFFER_SECS: u64 = 120;

/// Configuration for a session against one backend.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Backend origin, e.g. `https://taskhorizon.onrender.com`.
    #[arg(long, default_value = "http://127.0.0.1:5000", env = "HORIZON_API_BASE_URL")]
    pub base_url: String,

    /// Directory holding the persisted session. Resolved from the
    /// environment when unset.
    #[arg(long, env = "HORIZON_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Per-request timeout in milliseconds (applies to the token exchange too).
    #[arg(long, default_value_t = 30_000, env = "HORIZON_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Seconds before expiry at which the session monitor renews the token.
    #[arg(long, default_value_t = DEFAULT_RENEWAL_BUFFER_SECS, env = "HORIZON_RENEWAL_BUFFER_SECS")]
    pub renewal_buffer_secs: u64,
}

impl ClientConfig {
    /// Build a config for `base_url` with every other knob at its default.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            state_dir: None,
            request_timeout_ms: 30_000,
            renewal_buffer_secs: DEFAULT_RENEWAL_BUFFER_SECS,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let base = self.base_url.trim();
        if base.is_empty() {
            anyhow::bail!("base URL must not be empty");
        }
        if !base.starts_with("http://") && !base.starts_with("https://") {
            anyhow::bail!("base URL must start with http:// or https://: {base}");
        }
        if self.request_timeout_ms == 0 {
            anyhow::bail!("request timeout must be greater than zero");
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn renewal_buffer(&self) -> Duration {
        Duration::from_secs(self.renewal_buffer_secs)
    }

    pub fn resolved_state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(state_dir)
    }
}

/// Resolve the state directory for persisted sessions.
///
/// Checks `HORIZON_STATE_DIR`, then `$XDG_STATE_HOME/horizon`,
/// then `$HOME/.local/state/horizon`.
pub fn state_dir() -> PathBuf {
    state_dir_with(|name| std::env::var(name).ok())
}

fn state_dir_with(get_env: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = get_env("HORIZON_STATE_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    if let Some(xdg) = get_env("XDG_STATE_HOME").filter(|d| !d.is_empty()) {
        return PathBuf::from(xdg).join("horizon");
    }
    if let Some(home) = get_env("HOME").filter(|d| !d.is_empty()) {
        return PathBuf::from(home).join(".local/state/horizon");
    }
    PathBuf::from(".horizon")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
