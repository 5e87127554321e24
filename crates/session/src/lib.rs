// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session and credential lifecycle for the TaskHorizon API.
//!
//! [`Session`] owns the credential store and wires the refresh coordinator,
//! the authenticated request gateway and the auth client around it. The
//! expiry monitor is started on demand with [`Session::start_monitor`].

pub mod auth;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod gateway;
pub mod monitor;
pub mod persist;
pub mod refresh;
pub mod session;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use auth::{AuthClient, ProfileChanges, Registration};
pub use config::ClientConfig;
pub use error::{ApiError, ErrorCode};
pub use event::SessionEvent;
pub use gateway::{ApiRequest, Gateway};
pub use monitor::{CheckOutcome, MonitorHandle, SessionMonitor};
pub use persist::{FileStorage, MemoryStorage, SessionStorage};
pub use refresh::RefreshCoordinator;
pub use session::Session;
pub use store::{CredentialRecord, CredentialStore, CredentialUpdate, Hydrated, UserProfile};
