// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::debug;

use meto_core::{list_sessions, AgentEvent, LoopOutcome, LoopState, Runtime, Session};
use meto_tools::AgentContext;

const PREVIEW_CHARS: usize = 200;

/// Write clean output to stdout, suitable for piping.
pub fn write_stdout(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

/// Diagnostics go to stderr so stdout stays pipeable.
pub fn write_stderr(msg: &str) {
    eprintln!("{msg}");
}

fn preview(s: &str) -> String {
    if s.chars().count() > PREVIEW_CHARS {
        format!("{}…", s.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}

/// Tracks whether stdout currently ends mid-line.
#[derive(Default)]
struct Printer {
    mid_line: bool,
}

impl Printer {
    fn break_line(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }

    fn render(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::TextDelta(delta) => {
                write_stdout(&delta);
                self.mid_line = !delta.ends_with('\n');
            }
            AgentEvent::TextComplete(_) => {}
            AgentEvent::ToolCallStarted { tool_name, args, .. } => {
                self.break_line();
                let args = serde_json::to_string(&args).unwrap_or_default();
                write_stderr(&format!("[meto:tool:call] name=\"{tool_name}\" args={}", preview(&args)));
            }
            AgentEvent::ToolCallFinished { tool_name, output, is_error, .. } => {
                if is_error {
                    write_stderr(&format!("[meto:tool:error] name=\"{tool_name}\" output={:?}", preview(&output)));
                } else {
                    write_stderr(&format!("[meto:tool:ok] name=\"{tool_name}\""));
                }
            }
            AgentEvent::TokenUsage { input, output } => debug!(input, output, "token usage"),
            AgentEvent::TurnComplete { turns } => debug!(turns, "turn complete"),
        }
    }
}

/// Run `prompt`, streaming the reply to stdout and tool activity to stderr.
pub async fn run_streaming(
    runtime: &Arc<Runtime>,
    session: &mut Session,
    ctx: &AgentContext,
    prompt: &str,
) -> anyhow::Result<LoopOutcome> {
    let (tx, mut rx) = mpsc::channel::<AgentEvent>(256);
    let printer = tokio::spawn(async move {
        let mut p = Printer::default();
        while let Some(event) = rx.recv().await {
            p.render(event);
        }
        p.break_line();
    });

    let result = runtime.run(session, ctx, prompt, Some(tx)).await;
    let _ = printer.await;
    let outcome = result.context("agent run failed")?;

    if outcome.state == LoopState::MaxTurnsReached {
        write_stderr(&format!(
            "[meto:max-turns] stopped after {} turns; the task may be unfinished",
            outcome.turns
        ));
    }
    Ok(outcome)
}

fn human_size(bytes: u64) -> String {
    match bytes {
        b if b >= 1 << 20 => format!("{:.1}M", b as f64 / (1 << 20) as f64),
        b if b >= 1 << 10 => format!("{:.1}K", b as f64 / (1 << 10) as f64),
        b => format!("{b}B"),
    }
}

pub fn print_sessions(dir: &Path, limit: usize) -> anyhow::Result<()> {
    let sessions = list_sessions(dir)?;
    if sessions.is_empty() {
        println!("No saved sessions found.");
        println!("Sessions are stored in: {}", dir.display());
        return Ok(());
    }
    println!("{:<24}  {:<16}  {:>5}  {:>7}  TITLE", "ID (use with --session)", "CREATED", "MSGS", "SIZE");
    println!("{}", "-".repeat(95));
    for s in sessions.iter().take(limit) {
        let title = if s.title.chars().count() > 40 {
            format!("{}…", s.title.chars().take(39).collect::<String>())
        } else {
            s.title.clone()
        };
        println!(
            "{:<24}  {:<16}  {:>5}  {:>7}  {}",
            s.id,
            s.created.format("%Y-%m-%d %H:%M"),
            s.message_count,
            human_size(s.size_bytes),
            title
        );
    }
    println!("\nTotal: {} session(s)", sessions.len());
    println!("Session dir: {}", dir.display());
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_humanised() {
        assert_eq!(human_size(512), "512B");
        assert_eq!(human_size(2048), "2.0K");
        assert_eq!(human_size(3 << 20), "3.0M");
    }

    #[test]
    fn long_previews_are_cut() {
        let long = "x".repeat(PREVIEW_CHARS + 10);
        assert_eq!(preview(&long).chars().count(), PREVIEW_CHARS + 1);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn printer_tracks_line_state() {
        let mut p = Printer::default();
        p.render(AgentEvent::TextDelta("partial".into()));
        assert!(p.mid_line);
        p.render(AgentEvent::TextDelta(" done\n".into()));
        assert!(!p.mid_line);
    }
}
