// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::Serialize;

/// Session lifecycle events, broadcast to whoever renders the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Login or registration succeeded; tokens are stored.
    SignedIn { email: Option<String> },
    /// Second-factor verification succeeded.
    Verified { role: Option<String> },
    /// A refresh minted a new access token.
    TokenRenewed,
    /// The session is gone and the user must log in again.
    ///
    /// Emitted once per forced logout, however many requests observed it.
    LoginRequired { reason: String },
    /// Explicit logout.
    SignedOut,
}
