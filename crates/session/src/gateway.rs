// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated request gateway.
//!
//! Every resource call goes through [`Gateway::send`]. The current access
//! token is attached as a bearer credential; a 401 triggers one coalesced
//! refresh and one replay of the request, never more.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ApiError, ErrorCode};
use crate::refresh::RefreshCoordinator;
use crate::store::CredentialStore;

/// A replayable request description. Built once, dispatched per attempt.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, query: Vec::new() }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

pub struct Gateway {
    store: Arc<CredentialStore>,
    refresher: Arc<RefreshCoordinator>,
    http: reqwest::Client,
    base_url: String,
}

impl Gateway {
    pub fn new(
        store: Arc<CredentialStore>,
        refresher: Arc<RefreshCoordinator>,
        http: reqwest::Client,
        base_url: &str,
    ) -> Self {
        Self { store, refresher, http, base_url: base_url.trim_end_matches('/').to_owned() }
    }

    /// Send an authenticated request and return its JSON body.
    ///
    /// On a 401 with a refresh token present, the request is replayed once
    /// with the renewed token. If another caller renewed the token while this
    /// request was out, the replay uses that token without a new exchange. A
    /// failed refresh forces logout and the original 401 is returned. A 401
    /// on the replay is returned as-is.
    pub async fn send(&self, req: &ApiRequest) -> Result<Value, ApiError> {
        let sent = match self.store.access_token() {
            Some(token) => Some(token),
            None => self.refresher.refresh().await,
        };

        let resp = self.dispatch(req, sent.as_deref()).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return read_body(resp).await;
        }
        let original = read_body(resp).await.err().unwrap_or_else(|| {
            ApiError::from_response(StatusCode::UNAUTHORIZED.as_u16(), "")
        });

        let Some(owner) = self.store.refresh_token() else {
            debug!(path = %req.path, "401 without a refresh token, not retrying");
            return Err(original);
        };

        let current = self.store.access_token();
        let token = match current {
            Some(current) if sent.as_deref() != Some(current.as_str()) => {
                debug!(path = %req.path, "token renewed while in flight, replaying");
                current
            }
            _ => {
                debug!(path = %req.path, in_flight = self.refresher.is_refreshing(), "401, refreshing before replay");
                let Some(token) = self.refresher.refresh().await else {
                    warn!(path = %req.path, "refresh failed after 401, ending session");
                    self.store.force_logout_session(Some(&owner), "token refresh failed");
                    return Err(original);
                };
                token
            }
        };

        let resp = self.dispatch(req, Some(&token)).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            debug!(path = %req.path, "replayed request rejected again");
        }
        read_body(resp).await
    }

    /// Send a request with the current access token, if any, and no refresh
    /// handling. A 401 is returned to the caller untouched.
    pub async fn send_once(&self, req: &ApiRequest) -> Result<Value, ApiError> {
        let token = self.store.access_token();
        let resp = self.dispatch(req, token.as_deref()).await?;
        read_body(resp).await
    }

    /// Send a request without credentials or refresh handling.
    ///
    /// Used for the credential-issuing endpoints, where a 401 means bad
    /// credentials rather than an expired session.
    pub async fn send_anonymous(&self, req: &ApiRequest) -> Result<Value, ApiError> {
        let resp = self.dispatch(req, None).await?;
        read_body(resp).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        decode(self.send(&ApiRequest::get(path)).await?)
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        decode(self.send(&ApiRequest::post(path, encode(body)?)).await?)
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        decode(self.send(&ApiRequest::put(path, encode(body)?)).await?)
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        decode(self.send(&ApiRequest::delete(path)).await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn dispatch(
        &self,
        req: &ApiRequest,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut builder = self.http.request(req.method.clone(), self.url(&req.path));
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(ref body) = req.body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        builder.send().await.map_err(|e| ApiError::from_reqwest(&e))
    }
}

/// Read a response into JSON, mapping non-success statuses to [`ApiError`].
async fn read_body(resp: reqwest::Response) -> Result<Value, ApiError> {
    let status = resp.status();
    let text = resp.text().await.map_err(|e| ApiError::from_reqwest(&e))?;
    if !status.is_success() {
        return Err(ApiError::from_response(status.as_u16(), &text));
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|e| ApiError::new(ErrorCode::Decode, format!("invalid JSON response: {e}")))
}

fn encode<B: Serialize>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body)
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("unserializable request body: {e}")))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value)
        .map_err(|e| ApiError::new(ErrorCode::Decode, format!("unexpected response shape: {e}")))
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
