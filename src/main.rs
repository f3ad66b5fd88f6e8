// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod interaction;
mod output;
mod repl;
mod trace;

use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use interaction::TerminalInteraction;
use meto_config::Config;
use meto_core::context::{self, ExportFormat};
use meto_core::{JsonlSessionLog, Runtime, Session};
use meto_tools::{DenyAll, UserInteraction};
use trace::TraceFile;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let trace = init_logging(cli.verbose);

    // Handle subcommands first
    if let Some(cmd) = &cli.command {
        match cmd {
            Commands::Completions { shell } => {
                cli::print_completions(*shell);
                return Ok(());
            }
            Commands::ShowConfig => {
                let mut config = meto_config::load(cli.config.as_deref())?;
                if config.model.api_key.is_some() {
                    config.model.api_key = Some("<redacted>".into());
                }
                println!("{}", toml::to_string_pretty(&config).context("rendering configuration")?);
                return Ok(());
            }
            Commands::Sessions { limit } => {
                let config = meto_config::load(cli.config.as_deref())?;
                return output::print_sessions(&config.paths.session_dir, *limit);
            }
            Commands::Export { id, format, output } => {
                let config = meto_config::load(cli.config.as_deref())?;
                return export_session(&config, id, *format, output.as_deref());
            }
        }
    }

    let mut config = meto_config::load(cli.config.as_deref())?;
    if cli.yolo {
        config.agent.yolo = true;
    }
    if let Some(n) = cli.max_turns {
        config.agent.main_max_turns = n;
    }
    let config = Arc::new(config);

    // A prompt read from stdin leaves nobody to answer confirmations.
    let interactive = is_stdin_tty() && !cli.one_shot;
    let interaction: Arc<dyn UserInteraction> = if interactive {
        Arc::new(TerminalInteraction)
    } else {
        Arc::new(DenyAll)
    };

    let cwd = std::env::current_dir().context("determining working directory")?;
    let model = meto_model::from_config(&config.model);
    let runtime = Runtime::new(config.clone(), model, interaction, cwd)?;

    let mut session = match &cli.session {
        Some(id) => Session::resume(&config.paths.session_dir, id)
            .with_context(|| format!("resuming session '{id}'"))?,
        None => Session::create(&config.paths.session_dir).context("creating session log")?,
    };
    open_trace(&trace, &config.paths.session_dir, &session.id);
    info!(session_id = %session.id, messages = session.messages().len(), "session ready");
    runtime.start_session(&session).await;
    let ctx = runtime.main_context();

    let prompt = if cli.one_shot {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).context("reading stdin")?;
        Some(strip_one_newline(buf))
    } else {
        cli.prompt.clone()
    };

    match prompt {
        Some(prompt) => output::run_streaming(&runtime, &mut session, &ctx, &prompt).await.map(|_| ()),
        None => repl::run(runtime, session, ctx, trace).await,
    }
}

/// Drop exactly one trailing line ending.
fn strip_one_newline(mut s: String) -> String {
    if s.ends_with('\n') {
        s.pop();
        if s.ends_with('\r') {
            s.pop();
        }
    }
    s
}

fn export_session(config: &Config, id: &str, format: ExportFormat, out: Option<&Path>) -> anyhow::Result<()> {
    let path = config.paths.session_dir.join(format!("session-{id}.jsonl"));
    if !path.exists() {
        anyhow::bail!(
            "no session '{id}' in {}.\nUse 'meto sessions' to list available sessions.",
            config.paths.session_dir.display()
        );
    }
    let messages = JsonlSessionLog::replay(&path)?;
    let rendered = context::export(&messages, format);
    match out {
        Some(p) => std::fs::write(p, rendered).with_context(|| format!("writing {}", p.display())),
        None => {
            output::write_stdout(&rendered);
            if !rendered.ends_with('\n') {
                println!();
            }
            Ok(())
        }
    }
}

/// What the per-session trace file records, independent of `-v`.
const TRACE_FILE_FILTER: &str = "warn,meto=debug,meto_core=debug,meto_tools=debug,meto_model=debug,meto_config=debug";

/// Stderr gets the human format at the `-v` level; the session trace file
/// gets JSON lines carrying the enclosing span fields (session id, agent,
/// turn).
fn init_logging(verbosity: u8) -> TraceFile {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let trace = TraceFile::default();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr).with_filter(filter))
        .with(
            fmt::layer()
                .json()
                .with_span_list(true)
                .with_current_span(false)
                .with_writer(trace.clone())
                .with_filter(EnvFilter::new(TRACE_FILE_FILTER)),
        )
        .init();
    trace
}

/// Point the trace file at `session_id`.  A failure only costs the trace.
pub(crate) fn open_trace(trace: &TraceFile, dir: &Path, session_id: &str) {
    match trace.open(dir, session_id) {
        Ok(path) => info!(path = %path.display(), "session trace"),
        Err(e) => warn!(error = %e, "cannot open session trace file"),
    }
}

fn is_stdin_tty() -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        unsafe { libc::isatty(io::stdin().as_raw_fd()) != 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_exactly_one_newline() {
        assert_eq!(strip_one_newline("hi\n\n".into()), "hi\n");
        assert_eq!(strip_one_newline("hi\r\n".into()), "hi");
        assert_eq!(strip_one_newline("hi".into()), "hi");
    }
}
