// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;

use horizon_session::{ApiError, Hydrated, Session};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::command::{self, Command};
use crate::config::Cli;

/// Exit code for a session that needs a fresh login.
pub const EXIT_LOGIN_REQUIRED: i32 = 3;

/// Initialize tracing on stderr so command output stays clean on stdout.
pub fn init_tracing(cli: &Cli) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match cli.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init(),
    };
    drop(result);
}

/// Open the persisted session and run the requested subcommand.
///
/// Returns a process exit code.
pub async fn run(cli: Cli) -> i32 {
    let session = match Session::new(&cli.client) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e:#}");
            return 2;
        }
    };
    let hydrated = session.hydrate();
    debug!(?hydrated, "session loaded");
    if hydrated == Hydrated::Reconciled {
        info!("recovered session from token jar");
    }

    let shutdown = CancellationToken::new();
    if matches!(cli.command, Command::Watch) {
        spawn_signal_handler(shutdown.clone());
    }

    let mut stdout = std::io::stdout().lock();
    let result = command::execute(&session, &cli.command, &shutdown, &mut stdout).await;
    let _ = stdout.flush();
    session.shutdown();

    match result {
        Err(e) => report(&e),
        // Watch ended because the session did.
        Ok(()) if matches!(cli.command, Command::Watch) && !session.is_authenticated() => {
            EXIT_LOGIN_REQUIRED
        }
        Ok(()) => 0,
    }
}

fn report(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ApiError>() {
        Some(api) if api.is_unauthorized() => {
            eprintln!("error: {api}");
            eprintln!("hint: run `horizon login`");
            EXIT_LOGIN_REQUIRED
        }
        _ => {
            eprintln!("error: {err:#}");
            1
        }
    }
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
                shutdown.cancel();
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
                shutdown.cancel();
            }
        }
    });
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
