// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth actions: the only callers besides the refresh path that write
//! credentials into the store.
//!
//! Every action flips the store's `loading` flag while in flight and records
//! the server's message in `error` when it fails.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{ApiError, ErrorCode};
use crate::event::SessionEvent;
use crate::gateway::{ApiRequest, Gateway};
use crate::store::{CredentialRecord, CredentialStore, CredentialUpdate, UserProfile};

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "confirmPassword")]
    pub confirm_password: String,
}

/// Body of `PUT /user/update-profile`. Unset fields are left alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_email: Option<String>,
}

/// Tokens issued by login, register and verify-otp.
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: UserProfile,
}

pub struct AuthClient {
    store: Arc<CredentialStore>,
    gateway: Arc<Gateway>,
}

impl AuthClient {
    pub fn new(store: Arc<CredentialStore>, gateway: Arc<Gateway>) -> Self {
        Self { store, gateway }
    }

    /// Exchange credentials for a token pair and store it.
    pub async fn login(&self, email: &str, password: &str) -> Result<CredentialRecord, ApiError> {
        self.tracked(async {
            let body = json!({ "email": email, "password": password });
            let value = self.gateway.send_anonymous(&ApiRequest::post("/auth/login", body)).await?;
            self.sign_in(value, email)
        })
        .await
    }

    pub async fn register(&self, registration: &Registration) -> Result<CredentialRecord, ApiError> {
        self.tracked(async {
            let body = to_value(registration)?;
            let value =
                self.gateway.send_anonymous(&ApiRequest::post("/auth/register", body)).await?;
            self.sign_in(value, &registration.email)
        })
        .await
    }

    /// Ask the backend to mail a one-time code. Returns the server's message.
    pub async fn send_otp(&self, email: &str) -> Result<String, ApiError> {
        self.message_action("/auth/send-otp", json!({ "email": email })).await
    }

    /// Confirm the second factor. The backend answers with a fresh token pair
    /// and the user's role.
    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<CredentialRecord, ApiError> {
        self.tracked(async {
            let body = json!({ "email": email, "otp": otp });
            let value =
                self.gateway.send_anonymous(&ApiRequest::post("/auth/verify-otp", body)).await?;
            let grant = grant(value)?;
            let role = grant.role.clone();
            self.store.set(CredentialUpdate {
                access_token: Some(grant.access_token),
                refresh_token: grant.refresh_token,
                otp_verified: Some(true),
                role: grant.role,
                ..Default::default()
            });
            info!(role = role.as_deref().unwrap_or("none"), "second factor verified");
            self.store.emit(SessionEvent::Verified { role });
            Ok(self.store.get())
        })
        .await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<String, ApiError> {
        self.message_action("/auth/forgot-password", json!({ "email": email })).await
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> Result<String, ApiError> {
        self.message_action("/auth/reset-password", json!({ "token": token, "password": password }))
            .await
    }

    /// End the session. Local state is cleared whatever the server answers.
    pub async fn logout(&self) {
        if self.store.access_token().is_some() {
            if let Err(e) = self.gateway.send_once(&ApiRequest::get("/auth/logout")).await {
                warn!("server logout failed: {e}");
            }
        }
        self.store.clear();
        info!("signed out");
        self.store.emit(SessionEvent::SignedOut);
    }

    pub async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        self.tracked(async {
            let value = self.gateway.send(&ApiRequest::get("/user/profile")).await?;
            self.store_user(value)
        })
        .await
    }

    pub async fn update_profile(&self, changes: &ProfileChanges) -> Result<UserProfile, ApiError> {
        self.tracked(async {
            let body = to_value(changes)?;
            let value = self.gateway.send(&ApiRequest::put("/user/update-profile", body)).await?;
            self.store_user(value)
        })
        .await
    }

    /// Subscribe `email` to the newsletter.
    pub async fn subscribe(&self, email: &str) -> Result<String, ApiError> {
        self.tracked(async {
            let body = json!({ "email": email });
            let value = self.gateway.send(&ApiRequest::post("/user/subscribe", body)).await?;
            Ok(message(&value))
        })
        .await
    }

    async fn message_action(&self, path: &str, body: Value) -> Result<String, ApiError> {
        self.tracked(async {
            let value = self.gateway.send_anonymous(&ApiRequest::post(path, body)).await?;
            Ok(message(&value))
        })
        .await
    }

    fn sign_in(&self, value: Value, email: &str) -> Result<CredentialRecord, ApiError> {
        let grant = grant(value)?;
        let user = grant
            .user
            .unwrap_or_else(|| UserProfile { email: Some(email.to_owned()), ..Default::default() });
        self.store.begin_session(grant.access_token, grant.refresh_token, user);
        info!("signed in");
        self.store.emit(SessionEvent::SignedIn { email: Some(email.to_owned()) });
        Ok(self.store.get())
    }

    fn store_user(&self, value: Value) -> Result<UserProfile, ApiError> {
        let UserEnvelope { user } = serde_json::from_value(value)
            .map_err(|e| ApiError::new(ErrorCode::Decode, format!("unexpected profile shape: {e}")))?;
        self.store.set(CredentialUpdate { user: Some(user.clone()), ..Default::default() });
        Ok(user)
    }

    /// Run an action with `loading` set, recording its failure in `error`.
    async fn tracked<T>(
        &self,
        action: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        self.store.set_loading(true);
        self.store.set_error(None);
        let result = action.await;
        self.store.set_loading(false);
        if let Err(ref e) = result {
            self.store.set_error(Some(e.message.clone()));
        }
        result
    }
}

fn grant(value: Value) -> Result<TokenGrant, ApiError> {
    let grant: TokenGrant = serde_json::from_value(value)
        .map_err(|e| ApiError::new(ErrorCode::Decode, format!("unexpected token response: {e}")))?;
    if grant.access_token.is_empty() {
        return Err(ApiError::new(ErrorCode::Decode, "token response carried an empty access token"));
    }
    Ok(grant)
}

fn message(value: &Value) -> String {
    value.get("message").and_then(Value::as_str).unwrap_or("ok").to_owned()
}

fn to_value<T: Serialize>(body: &T) -> Result<Value, ApiError> {
    serde_json::to_value(body)
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("unserializable request body: {e}")))
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
