// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access token claim decoding.
//!
//! Reads the payload segment of a `header.payload.signature` token without
//! verifying the signature. Every failure degrades to `None`, and callers
//! treat `None` as expired.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Deserialize;

/// Claims read from a token payload. Only `exp` is required.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Claims {
    /// Expiry as seconds since the Unix epoch.
    pub exp: i64,
    #[serde(default)]
    pub sub: Option<serde_json::Value>,
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Decode a token's claims. Returns `None` on any malformed input.
pub fn decode(token: &str) -> Option<Claims> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let payload = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD.decode(payload).or_else(|_| STANDARD_NO_PAD.decode(payload)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Expiry of `token` in epoch milliseconds.
pub fn expiry_epoch_millis(token: &str) -> Option<i64> {
    decode(token).map(|c| c.exp.saturating_mul(1000))
}

/// Whether `token` is expired at `now_ms`. Undecodable tokens are expired.
pub fn is_expired(token: &str, now_ms: i64) -> bool {
    match expiry_epoch_millis(token) {
        Some(expiry) => expiry <= now_ms,
        None => true,
    }
}

/// Time left before `token` expires. Zero when expired or undecodable.
pub fn time_remaining(token: &str, now_ms: i64) -> Duration {
    match expiry_epoch_millis(token) {
        Some(expiry) if expiry > now_ms => Duration::from_millis((expiry - now_ms) as u64),
        _ => Duration::ZERO,
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
