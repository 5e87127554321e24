// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI subcommands. Every handler writes its human-readable output to the
//! writer it is given.

pub mod account;
pub mod resources;
pub mod watch;

use std::io::Write;

use clap::{Args, Subcommand};
use horizon_session::Session;
use tokio_util::sync::CancellationToken;

use crate::resource::TaskScope;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in with email and password.
    Login(LoginArgs),
    /// Create an account and sign in.
    Register(RegisterArgs),
    /// Mail a one-time verification code.
    SendOtp {
        #[arg(long)]
        email: String,
    },
    /// Confirm the one-time code sent after login.
    VerifyOtp {
        /// The code from the email.
        otp: String,
        /// Defaults to the signed-in user's email.
        #[arg(long)]
        email: Option<String>,
    },
    /// Mail a password reset link.
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    /// Set a new password using a reset token.
    ResetPassword {
        #[arg(long)]
        token: String,
        #[arg(long, env = "HORIZON_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the stored session.
    Logout,
    /// Show the signed-in user's profile.
    Whoami,
    /// Show the local session state without contacting the server.
    Status,
    /// List, create or delete projects.
    Projects(ProjectsArgs),
    /// List or assign tasks.
    Tasks(TasksArgs),
    /// Archive a task.
    ArchiveTask { id: i64 },
    /// List user profiles.
    Users,
    /// Show dashboard statistics.
    Stats,
    /// Keep the session renewed until Ctrl-C or the session ends.
    Watch,
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    #[arg(long)]
    pub email: String,
    #[arg(long, env = "HORIZON_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Debug, Args)]
pub struct RegisterArgs {
    #[arg(long)]
    pub username: String,
    #[arg(long)]
    pub email: String,
    #[arg(long, env = "HORIZON_PASSWORD", hide_env_values = true)]
    pub password: String,
    /// Defaults to `--password`.
    #[arg(long)]
    pub confirm_password: Option<String>,
}

#[derive(Debug, Args)]
pub struct ProjectsArgs {
    #[command(subcommand)]
    pub command: Option<ProjectsCommand>,
}

#[derive(Debug, Subcommand)]
pub enum ProjectsCommand {
    /// List projects (the default).
    List {
        /// Only projects the signed-in user belongs to.
        #[arg(long)]
        mine: bool,
    },
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Delete { id: i64 },
}

#[derive(Debug, Args)]
pub struct TasksArgs {
    #[command(subcommand)]
    pub command: Option<TasksCommand>,
}

#[derive(Debug, Subcommand)]
pub enum TasksCommand {
    /// List tasks (the default).
    List {
        #[arg(long, value_enum, default_value_t)]
        scope: TaskScope,
    },
    /// Assign a task to a user.
    Assign {
        id: i64,
        #[arg(long)]
        user: i64,
    },
}

/// Run one subcommand against `session`.
pub async fn execute(
    session: &Session,
    command: &Command,
    shutdown: &CancellationToken,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match command {
        Command::Login(args) => account::login(session, args, out).await,
        Command::Register(args) => account::register(session, args, out).await,
        Command::SendOtp { email } => {
            let message = session.auth().send_otp(email).await?;
            writeln!(out, "{message}")?;
            Ok(())
        }
        Command::VerifyOtp { otp, email } => {
            account::verify_otp(session, otp, email.as_deref(), out).await
        }
        Command::ForgotPassword { email } => {
            let message = session.auth().forgot_password(email).await?;
            writeln!(out, "{message}")?;
            Ok(())
        }
        Command::ResetPassword { token, password } => {
            let message = session.auth().reset_password(token, password).await?;
            writeln!(out, "{message}")?;
            Ok(())
        }
        Command::Logout => account::logout(session, out).await,
        Command::Whoami => account::whoami(session, out).await,
        Command::Status => account::status(session, out),
        Command::Projects(args) => resources::projects(session, args, out).await,
        Command::Tasks(args) => resources::tasks(session, args, out).await,
        Command::ArchiveTask { id } => resources::archive_task(session, *id, out).await,
        Command::Users => resources::users(session, out).await,
        Command::Stats => resources::stats(session, out).await,
        Command::Watch => watch::run(session, shutdown, out).await,
    }
}

/// String field of a JSON object, or `-`.
fn field<'a>(value: &'a serde_json::Value, key: &str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or("-")
}

/// Display form of a scalar JSON field, or `-`.
fn scalar(value: &serde_json::Value, key: &str) -> String {
    match value.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => "-".to_owned(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
