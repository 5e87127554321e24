// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource subcommands: projects, tasks, users and stats.

use std::io::Write;

use horizon_session::Session;
use serde_json::Value;

use super::{field, scalar, ProjectsArgs, ProjectsCommand, TasksArgs, TasksCommand};
use crate::resource::{Analytics, Projects, TaskScope, Tasks, Users};

pub async fn projects(
    session: &Session,
    args: &ProjectsArgs,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let projects = Projects::new(session.gateway().clone());
    match args.command {
        None => print_projects(&projects.list().await?, out),
        Some(ProjectsCommand::List { mine }) => {
            let list = if mine { projects.mine().await? } else { projects.list().await? };
            print_projects(&list, out)
        }
        Some(ProjectsCommand::Create { ref name, ref description }) => {
            let created = projects.create(name, description.as_deref()).await?;
            writeln!(out, "Created project {} ({}).", scalar(&created, "id"), field(&created, "name"))?;
            Ok(())
        }
        Some(ProjectsCommand::Delete { id }) => {
            projects.delete(id).await?;
            writeln!(out, "Deleted project {id}.")?;
            Ok(())
        }
    }
}

fn print_projects(projects: &[Value], out: &mut dyn Write) -> anyhow::Result<()> {
    if projects.is_empty() {
        writeln!(out, "No projects.")?;
        return Ok(());
    }
    writeln!(out, "{:<6} {:<24} {}", "ID", "NAME", "DESCRIPTION")?;
    writeln!(out, "{}", "-".repeat(50))?;
    for p in projects {
        writeln!(out, "{:<6} {:<24} {}", scalar(p, "id"), field(p, "name"), field(p, "description"))?;
    }
    Ok(())
}

pub async fn tasks(session: &Session, args: &TasksArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    let tasks = Tasks::new(session.gateway().clone());
    match args.command {
        None => print_tasks(&tasks.list(TaskScope::All).await?, out),
        Some(TasksCommand::List { scope }) => print_tasks(&tasks.list(scope).await?, out),
        Some(TasksCommand::Assign { id, user }) => {
            tasks.assign(id, user).await?;
            writeln!(out, "Assigned task {id} to user {user}.")?;
            Ok(())
        }
    }
}

fn print_tasks(tasks: &[Value], out: &mut dyn Write) -> anyhow::Result<()> {
    if tasks.is_empty() {
        writeln!(out, "No tasks.")?;
        return Ok(());
    }
    writeln!(out, "{:<6} {:<12} {}", "ID", "STATUS", "TITLE")?;
    writeln!(out, "{}", "-".repeat(50))?;
    for t in tasks {
        writeln!(out, "{:<6} {:<12} {}", scalar(t, "id"), field(t, "status"), field(t, "title"))?;
    }
    Ok(())
}

pub async fn archive_task(session: &Session, id: i64, out: &mut dyn Write) -> anyhow::Result<()> {
    Tasks::new(session.gateway().clone()).archive(id).await?;
    writeln!(out, "Archived task {id}.")?;
    Ok(())
}

pub async fn users(session: &Session, out: &mut dyn Write) -> anyhow::Result<()> {
    let users = Users::new(session.gateway().clone()).profiles().await?;
    writeln!(out, "{:<16} {:<28} {}", "USERNAME", "EMAIL", "ROLE")?;
    writeln!(out, "{}", "-".repeat(52))?;
    for u in &users {
        writeln!(out, "{:<16} {:<28} {}", field(u, "username"), field(u, "email"), field(u, "role"))?;
    }
    Ok(())
}

pub async fn stats(session: &Session, out: &mut dyn Write) -> anyhow::Result<()> {
    let stats = Analytics::new(session.gateway().clone()).stats().await?;
    writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?;
    Ok(())
}
