// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Custom slash commands from `<commands_dir>/<name>.md`.
//!
//! The body is the prompt sent to the agent.  Optional front-matter:
//!
//! ```yaml
//! description: Review the staged diff
//! context: fork            # run in an isolated subagent
//! agent: explore           # agent used when forked
//! allowed_tools: [read_file, grep_search]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use meto_tools::Allowlist;

use crate::frontmatter;

/// Names handled by the front-end itself.  Custom commands cannot shadow them.
pub const BUILTIN_COMMANDS: &[(&str, &str)] = &[
    ("help", "Show available commands"),
    ("plan", "Enter plan mode"),
    ("done", "Leave plan mode and follow the plan"),
    ("todos", "Show the task list"),
    ("context", "Summarise the conversation (or /context export)"),
    ("export", "Export the conversation: /export [json|markdown|text] [path]"),
    ("compact", "Summarise the history into one message under a new session"),
    ("clear", "Start a new session"),
    ("quit", "Exit"),
];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_COMMANDS.iter().any(|(n, _)| *n == name)
}

#[derive(Debug, Default, Deserialize)]
struct CommandFrontmatter {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    agent: Option<String>,
    #[serde(default)]
    allowed_tools: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDefinition {
    pub name: String,
    pub description: String,
    pub body: String,
    /// Run in an isolated subagent instead of the main session
    pub fork: bool,
    pub agent: Option<String>,
    pub allowed_tools: Option<Vec<String>>,
}

impl CommandDefinition {
    /// The prompt sent for `/<name> <args>`.
    pub fn render(&self, args: &str) -> String {
        let args = args.trim();
        if args.is_empty() {
            self.body.clone()
        } else {
            format!("{}\n\n[Command arguments: {args}]", self.body)
        }
    }

    /// Restricted tool set for a forked run.
    pub fn allowlist(&self) -> Allowlist {
        match &self.allowed_tools {
            Some(list) => Allowlist::only(list.iter().cloned()),
            None => Allowlist::All,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, CommandDefinition>,
}

impl CommandRegistry {
    pub fn load(dir: &Path) -> Self {
        let mut commands = BTreeMap::new();
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "no commands directory");
            return Self { commands };
        }
        let files = walkdir::WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|x| x == "md"));
        for entry in files {
            let name = entry.path().file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
            if is_builtin(&name) {
                warn!(command = %name, "custom command shadows a built-in; ignored");
                continue;
            }
            match parse_command(&name, entry.path()) {
                Ok(cmd) => {
                    commands.insert(name, cmd);
                }
                Err(e) => warn!(path = %entry.path().display(), error = %e, "skipping invalid command file"),
            }
        }
        Self { commands }
    }

    pub fn get(&self, name: &str) -> Option<&CommandDefinition> {
        self.commands.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandDefinition> {
        self.commands.values()
    }
}

fn parse_command(name: &str, path: &Path) -> anyhow::Result<CommandDefinition> {
    let raw = std::fs::read_to_string(path)?;
    let (fm, body): (CommandFrontmatter, &str) = frontmatter::parse(&raw)?;
    let body = body.trim().to_string();
    if body.is_empty() {
        anyhow::bail!("command '{name}' has an empty body");
    }
    let fork = match fm.context.as_deref() {
        None | Some("inline") => false,
        Some("fork") => true,
        Some(other) => anyhow::bail!("unknown context '{other}' (expected fork or inline)"),
    };
    Ok(CommandDefinition {
        name: name.to_string(),
        description: fm.description.unwrap_or_else(|| frontmatter::first_line(&body)),
        body,
        fork,
        agent: fm.agent,
        allowed_tools: fm.allowed_tools,
    })
}

/// Split `/name rest of line` into `("name", "rest of line")`.
pub fn parse_invocation(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim_start().strip_prefix('/')?;
    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    (!name.is_empty()).then_some((name, args.trim()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
