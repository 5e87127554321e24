// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `horizon watch`: run the expiry monitor in the foreground and print each
//! session event as a JSON line.

use std::io::Write;

use horizon_session::{Session, SessionEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::account;

pub async fn run(
    session: &Session,
    shutdown: &CancellationToken,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    if !session.is_authenticated() {
        anyhow::bail!("not signed in");
    }

    let mut events = session.subscribe();
    let monitor = session.start_monitor();
    account::status(session, out)?;
    out.flush()?;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("watch interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    writeln!(out, "{}", serde_json::to_string(&event)?)?;
                    out.flush()?;
                    if matches!(event, SessionEvent::LoginRequired { .. } | SessionEvent::SignedOut) {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "watch fell behind session events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    monitor.stop().await;
    Ok(())
}
