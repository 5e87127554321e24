// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Account subcommands: sign-in, verification, logout and session status.

use std::io::Write;
use std::time::Duration;

use horizon_session::codec;
use horizon_session::{Registration, Session};

use super::{LoginArgs, RegisterArgs};

pub async fn login(session: &Session, args: &LoginArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    let record = session.auth().login(&args.email, &args.password).await?;
    writeln!(out, "Signed in as {}.", args.email)?;
    if !record.otp_verified {
        writeln!(out, "Verification pending: run `horizon verify-otp <code>`.")?;
    }
    Ok(())
}

pub async fn register(
    session: &Session,
    args: &RegisterArgs,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let registration = Registration {
        username: args.username.clone(),
        email: args.email.clone(),
        password: args.password.clone(),
        confirm_password: args.confirm_password.clone().unwrap_or_else(|| args.password.clone()),
    };
    session.auth().register(&registration).await?;
    writeln!(out, "Registered and signed in as {}.", args.username)?;
    Ok(())
}

pub async fn verify_otp(
    session: &Session,
    otp: &str,
    email: Option<&str>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let email = match email {
        Some(email) => email.to_owned(),
        None => session
            .store()
            .get()
            .user
            .and_then(|u| u.email)
            .ok_or_else(|| anyhow::anyhow!("no signed-in user; pass --email"))?,
    };
    let record = session.auth().verify_otp(&email, otp).await?;
    writeln!(out, "Verified {email} (role: {}).", record.role.as_deref().unwrap_or("none"))?;
    Ok(())
}

pub async fn logout(session: &Session, out: &mut dyn Write) -> anyhow::Result<()> {
    session.auth().logout().await;
    writeln!(out, "Signed out.")?;
    Ok(())
}

pub async fn whoami(session: &Session, out: &mut dyn Write) -> anyhow::Result<()> {
    if !session.is_authenticated() {
        anyhow::bail!("not signed in");
    }
    let user = session.auth().fetch_profile().await?;
    let show = |v: Option<String>| v.unwrap_or_else(|| "-".to_owned());
    writeln!(out, "username: {}", show(user.username))?;
    writeln!(out, "email:    {}", show(user.email))?;
    writeln!(out, "role:     {}", show(user.role))?;
    writeln!(out, "phone:    {}", show(user.phone))?;
    writeln!(out, "location: {}", show(user.location))?;
    Ok(())
}

/// Print the local session state. Never touches the network.
pub fn status(session: &Session, out: &mut dyn Write) -> anyhow::Result<()> {
    let record = session.store().get();
    if !record.has_tokens() {
        writeln!(out, "signed in:     no")?;
        return Ok(());
    }

    let email = record.user.as_ref().and_then(|u| u.email.as_deref()).unwrap_or("unknown user");
    let expiry = match record.access_token.as_deref() {
        Some(token) if codec::decode(token).is_none() => "unknown".to_owned(),
        Some(token) => {
            let remaining = codec::time_remaining(token, codec::epoch_ms());
            if remaining.is_zero() {
                "expired".to_owned()
            } else {
                format!("in {}", format_duration(remaining))
            }
        }
        None => "no access token".to_owned(),
    };
    let yes_no = |b: bool| if b { "yes" } else { "no" };

    writeln!(out, "signed in:     yes ({email})")?;
    writeln!(out, "verified:      {}", yes_no(record.otp_verified))?;
    writeln!(out, "role:          {}", record.role.as_deref().unwrap_or("-"))?;
    writeln!(out, "token expires: {expiry}")?;
    writeln!(out, "refresh token: {}", if record.refresh_token.is_some() { "present" } else { "absent" })?;
    Ok(())
}

/// `1h 2m 3s` style rendering, dropping leading zero units.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}
