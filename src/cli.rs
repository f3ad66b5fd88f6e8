// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

use meto_core::context::ExportFormat;

#[derive(Parser, Debug)]
#[command(
    name = "meto",
    about = "Agent runtime that drives a language model through tool calls",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Run a single exchange with this prompt.  Without it (and without
    /// --one-shot) meto starts an interactive session.
    #[arg(value_name = "PROMPT")]
    pub prompt: Option<String>,

    /// Read the prompt from stdin and run a single exchange
    #[arg(long, conflicts_with = "prompt")]
    pub one_shot: bool,

    /// Approve every confirmation without asking.  Tools outside the
    /// agent's allowlist stay unavailable.
    #[arg(long)]
    pub yolo: bool,

    /// Resume a saved session by id (see `meto sessions`)
    #[arg(long, value_name = "ID")]
    pub session: Option<String>,

    /// Path to a settings file, applied after the global and project files
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Turn budget of the main agent
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_turns: Option<u32>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Print the effective configuration and exit
    ShowConfig,
    /// List saved sessions, newest first
    Sessions {
        /// Maximum number of sessions to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },
    /// Export a saved session
    Export {
        /// Session id
        id: String,
        /// json | markdown | text
        #[arg(long, short = 'f', default_value = "json")]
        format: ExportFormat,
        /// Write to this file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "meto", &mut std::io::stdout());
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
