// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource clients for projects, tasks, users and analytics.
//!
//! These only know how to make an authenticated request; token handling is
//! entirely the gateway's business. Payloads pass through as JSON.

use std::sync::Arc;

use horizon_session::{ApiError, Gateway};
use serde_json::{json, Value};

/// Which task list to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TaskScope {
    /// Every task visible to the user.
    #[default]
    All,
    /// Tasks assigned to the user.
    Mine,
    /// Tasks of the user's team.
    Team,
}

impl TaskScope {
    fn path(self) -> &'static str {
        match self {
            Self::All => "/tasks/",
            Self::Mine => "/tasks/user-tasks",
            Self::Team => "/tasks/team-tasks",
        }
    }
}

pub struct Projects {
    gateway: Arc<Gateway>,
}

impl Projects {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub async fn list(&self) -> Result<Vec<Value>, ApiError> {
        self.gateway.get("/projects/").await
    }

    /// Projects the signed-in user belongs to.
    pub async fn mine(&self) -> Result<Vec<Value>, ApiError> {
        self.gateway.get("/projects/user").await
    }

    pub async fn create(&self, name: &str, description: Option<&str>) -> Result<Value, ApiError> {
        self.gateway.post("/projects/", &json!({ "name": name, "description": description })).await
    }

    pub async fn delete(&self, id: i64) -> Result<Value, ApiError> {
        self.gateway.delete(&format!("/projects/{id}")).await
    }
}

pub struct Tasks {
    gateway: Arc<Gateway>,
}

impl Tasks {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub async fn list(&self, scope: TaskScope) -> Result<Vec<Value>, ApiError> {
        self.gateway.get(scope.path()).await
    }

    pub async fn assign(&self, id: i64, user_id: i64) -> Result<Value, ApiError> {
        self.gateway.put(&format!("/tasks/{id}/assign"), &json!({ "user_id": user_id })).await
    }

    pub async fn archive(&self, id: i64) -> Result<Value, ApiError> {
        self.gateway.delete(&format!("/tasks/{id}/archive")).await
    }
}

pub struct Users {
    gateway: Arc<Gateway>,
}

impl Users {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub async fn profiles(&self) -> Result<Vec<Value>, ApiError> {
        self.gateway.get("/user/profiles").await
    }
}

pub struct Analytics {
    gateway: Arc<Gateway>,
}

impl Analytics {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub async fn stats(&self) -> Result<Value, ApiError> {
        self.gateway.get("/analytics/stats").await
    }
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
