// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Line-based interactive front-end.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError};

use anyhow::Context;
use tracing::debug;

use meto_core::commands::{parse_invocation, BUILTIN_COMMANDS};
use meto_core::context::{self, ExportFormat};
use meto_core::{Mode, ModeController, PlanMode, Runtime, Session};
use meto_tools::AgentContext;

use crate::interaction::read_line;
use crate::output::{run_streaming, write_stderr, write_stdout};
use crate::trace::TraceFile;

/// What the loop does after a slash command.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Send this text to the agent
    Prompt(String),
    Quit,
}

pub async fn run(runtime: Arc<Runtime>, mut session: Session, ctx: AgentContext, trace: TraceFile) -> anyhow::Result<()> {
    write_stderr(&format!(
        "meto {} | session {} | /help for commands, /quit or Ctrl-D to exit",
        env!("CARGO_PKG_VERSION"),
        session.id
    ));

    let mut current_id = session.id.clone();
    loop {
        follow_session(&trace, &runtime, &session, &mut current_id);
        let prefix = session.mode().map(Mode::prompt_prefix).unwrap_or("> ");
        let Some(line) = read_line(prefix.to_string()).await else {
            break;
        };
        if line.is_empty() {
            continue;
        }

        let prompt = match parse_invocation(&line) {
            Some((name, args)) => match handle_command(&runtime, &mut session, &ctx, name, args).await {
                Ok(Flow::Continue) => continue,
                Ok(Flow::Quit) => break,
                Ok(Flow::Prompt(p)) => p,
                Err(e) => {
                    write_stderr(&format!("[meto:error] {e:#}"));
                    continue;
                }
            },
            None => line,
        };

        follow_session(&trace, &runtime, &session, &mut current_id);
        // A failed exchange ends that exchange, not the session.
        if let Err(e) = run_streaming(&runtime, &mut session, &ctx, &prompt).await {
            write_stderr(&format!("[meto:error] {e:#}"));
        }
    }

    if let Some(path) = session.log_path() {
        write_stderr(&format!("Session {} saved to {}", session.id, path.display()));
    }
    Ok(())
}

async fn handle_command(
    runtime: &Arc<Runtime>,
    session: &mut Session,
    ctx: &AgentContext,
    name: &str,
    args: &str,
) -> anyhow::Result<Flow> {
    debug!(command = %name, args = %args, "slash command");
    match name {
        "help" => {
            write_stdout(&help_text(runtime));
            Ok(Flow::Continue)
        }
        "quit" | "exit" => Ok(Flow::Quit),
        "plan" => {
            let mode = Mode::Plan(PlanMode::new(&runtime.config().paths.plan_dir));
            if let Some(previous) = ModeController::enter(session, mode)? {
                debug!(artifact = ?previous.artifact_path, "previous mode exited");
            }
            if let Some(Mode::Plan(p)) = session.mode() {
                write_stderr(&format!("Plan mode on. Plan file: {}", p.plan_path().display()));
            }
            Ok(if args.is_empty() { Flow::Continue } else { Flow::Prompt(args.to_string()) })
        }
        "done" => match ModeController::exit(session)? {
            None => {
                write_stderr("No mode is active.");
                Ok(Flow::Continue)
            }
            Some(result) => match result.followup {
                Some(followup) => {
                    if let Some(path) = &result.artifact_path {
                        write_stderr(&format!("Plan saved to {}", path.display()));
                    }
                    Ok(Flow::Prompt(followup))
                }
                None => {
                    write_stderr("The plan is empty; left plan mode without follow-up.");
                    Ok(Flow::Continue)
                }
            },
        },
        "todos" => {
            let rendered = session.todos().lock().unwrap_or_else(PoisonError::into_inner).render();
            write_stdout(&format!("{rendered}\n"));
            Ok(Flow::Continue)
        }
        "context" if args.starts_with("export") => {
            export_to_file(runtime, session, args.trim_start_matches("export").trim())?;
            Ok(Flow::Continue)
        }
        "context" => {
            write_stdout(&format!("Session {}\n{}\n", session.id, context::summary(session.messages())));
            Ok(Flow::Continue)
        }
        "export" => {
            export_to_file(runtime, session, args)?;
            Ok(Flow::Continue)
        }
        "compact" => {
            match runtime.compact(session).await? {
                Some(report) => write_stderr(&format!(
                    "History compacted ({} chars -> {} chars). New session {}",
                    report.before_chars, report.after_chars, session.id
                )),
                None => write_stderr("No history to compact."),
            }
            Ok(Flow::Continue)
        }
        "clear" => {
            session.renew().context("starting a new session")?;
            runtime.start_session(session).await;
            write_stderr(&format!("New session {}", session.id));
            Ok(Flow::Continue)
        }
        custom => {
            let Some(cmd) = runtime.commands().get(custom) else {
                write_stderr(&format!("Unknown command /{custom}. Type /help for the list."));
                return Ok(Flow::Continue);
            };
            if cmd.fork {
                let answer = runtime.run_forked_command(cmd, args, ctx).await?;
                write_stdout(&format!("{}\n", answer.trim_end()));
                Ok(Flow::Continue)
            } else {
                Ok(Flow::Prompt(cmd.render(args)))
            }
        }
    }
}

/// Re-point the trace file when a command moved the session to a new id.
fn follow_session(trace: &TraceFile, runtime: &Runtime, session: &Session, current_id: &mut String) {
    if session.id != *current_id {
        crate::open_trace(trace, &runtime.config().paths.session_dir, &session.id);
        *current_id = session.id.clone();
    }
}

fn help_text(runtime: &Runtime) -> String {
    let mut out = String::from("Commands:\n");
    for (name, desc) in BUILTIN_COMMANDS {
        out.push_str(&format!("  /{name:<10} {desc}\n"));
    }
    let custom: Vec<_> = runtime.commands().iter().collect();
    if !custom.is_empty() {
        out.push_str("\nCustom commands:\n");
        for cmd in custom {
            let marker = if cmd.fork { " (fork)" } else { "" };
            out.push_str(&format!("  /{:<10} {}{marker}\n", cmd.name, cmd.description));
        }
    }
    out
}

/// `[format] [path]`, either part optional.
fn parse_export_args(args: &str, session_id: &str) -> anyhow::Result<(ExportFormat, PathBuf)> {
    let mut parts = args.split_whitespace();
    let mut format = ExportFormat::default();
    let mut path = None;
    if let Some(first) = parts.next() {
        match first.parse::<ExportFormat>() {
            Ok(f) => {
                format = f;
                path = parts.next().map(PathBuf::from);
            }
            Err(_) => path = Some(PathBuf::from(first)),
        }
    }
    if let Some(extra) = parts.next() {
        anyhow::bail!("unexpected argument '{extra}'. Usage: /export [json|markdown|text] [path]");
    }
    let path = path.unwrap_or_else(|| PathBuf::from(format!("meto-{session_id}.{}", format.extension())));
    Ok((format, path))
}

fn export_to_file(runtime: &Runtime, session: &Session, args: &str) -> anyhow::Result<()> {
    let (format, path) = parse_export_args(args, &session.id)?;
    let path = if path.is_relative() { runtime.cwd().join(path) } else { path };
    std::fs::write(&path, context::export(session.messages(), format))
        .with_context(|| format!("writing {}", path.display()))?;
    write_stderr(&format!("Exported {} messages as {format} to {}", session.messages().len(), path.display()));
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
