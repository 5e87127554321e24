// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for failed API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Unauthorized,
    BadRequest,
    Forbidden,
    NotFound,
    Conflict,
    Upstream,
    Timeout,
    Transport,
    Decode,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Upstream => 502,
            Self::Timeout => 504,
            Self::Transport => 503,
            Self::Decode => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Upstream => "UPSTREAM_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Transport => "TRANSPORT",
            Self::Decode => "DECODE",
            Self::Internal => "INTERNAL",
        }
    }

    /// Classify a non-success HTTP status returned by the backend.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict,
            400..=499 => Self::BadRequest,
            _ => Self::Upstream,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed call through the gateway.
///
/// `message` carries the backend's error text when there is one, so a
/// caller's error path still sees what the server said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: ErrorCode,
    /// HTTP status, if the request got as far as a response.
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, status: None, message: message.into() }
    }

    /// Build an error from a non-success response and its body.
    pub fn from_response(status: u16, body: &str) -> Self {
        Self {
            code: ErrorCode::from_status(status),
            status: Some(status),
            message: extract_message(body).unwrap_or_else(|| format!("HTTP {status}")),
        }
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            ErrorCode::Timeout
        } else if err.is_decode() {
            ErrorCode::Decode
        } else {
            ErrorCode::Transport
        };
        Self { code, status: err.status().map(|s| s.as_u16()), message: err.to_string() }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code == ErrorCode::Unauthorized
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({status}): {}", self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Pull a human-readable message out of a backend error body.
///
/// The backend answers with either `{"error": "..."}`, `{"message": "..."}`
/// or a per-field map such as `{"email": "Email already exists"}`.
fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return Some(trimmed.to_owned());
    };
    let obj = value.as_object()?;
    for key in ["error", "message", "msg"] {
        if let Some(s) = obj.get(key).and_then(|v| v.as_str()) {
            return Some(s.to_owned());
        }
    }
    let fields: Vec<String> = obj
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| format!("{k}: {s}")))
        .collect();
    if fields.is_empty() {
        Some(trimmed.to_owned())
    } else {
        Some(fields.join("; "))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
