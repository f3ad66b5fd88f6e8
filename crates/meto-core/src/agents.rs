// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Agent definitions for `run_task`.
//!
//! Three agents are built in (`explore`, `plan`, `code`).  More are read from
//! `<agents_dir>/*.md`, each a markdown file with YAML front-matter:
//!
//! ```markdown
//! ---
//! name: reviewer
//! description: Reviews a diff for bugs. Use after larger changes.
//! tools: [read_file, grep_search, list_dir]
//! ---
//!
//! You are a careful code reviewer.
//! ```
//!
//! | Field         | Required | Description                                   |
//! |:--------------|:---------|:----------------------------------------------|
//! | `name`        | No       | Defaults to the file stem.                    |
//! | `description` | No       | Defaults to the first body line.              |
//! | `tools`       | No       | List of tool names, or `"*"` (default).       |
//! | `prompt`      | No       | System prompt; defaults to the body.          |
//!
//! A file naming an unknown tool is skipped with a warning.  User agents
//! replace built-ins of the same name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use meto_tools::Allowlist;

use crate::frontmatter;

const READ_ONLY_TOOLS: &[&str] = &["shell", "list_dir", "read_file", "grep_search", "fetch"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    /// The restricted tool set handed to `run_task`
    pub tools: Allowlist,
    pub prompt: String,
    /// `None` for built-ins
    pub source: Option<PathBuf>,
}

fn builtin_agents() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition {
            name: "explore".into(),
            description: "Read-only investigation of the codebase or the web. \
                          Returns a concise report of findings."
                .into(),
            tools: Allowlist::only(READ_ONLY_TOOLS.iter().copied()),
            prompt: "You are an exploration agent. Investigate what you are asked about using \
                     read-only tools. Do not modify any file. Finish with a concise report that \
                     cites file paths and line numbers."
                .into(),
            source: None,
        },
        AgentDefinition {
            name: "plan".into(),
            description: "Designs an implementation plan for a change without making it.".into(),
            tools: Allowlist::only(READ_ONLY_TOOLS.iter().copied()),
            prompt: "You are a planning agent. Study the relevant code with read-only tools and \
                     return a numbered, step-by-step implementation plan. Name the files each \
                     step touches and how to verify it. Do not modify any file."
                .into(),
            source: None,
        },
        AgentDefinition {
            name: "code".into(),
            description: "General-purpose agent that can read, write and run commands.".into(),
            tools: Allowlist::All,
            prompt: "You are a coding agent. Complete the task you are given, verify the result, \
                     and finish with a short summary of what changed."
                .into(),
            source: None,
        },
    ]
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ToolsField {
    Star(String),
    List(Vec<String>),
}

#[derive(Debug, Default, Deserialize)]
struct AgentFrontmatter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tools: Option<ToolsField>,
    #[serde(default)]
    prompt: Option<String>,
}

/// Read-only set of agents, looked up by name.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentDefinition>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AgentRegistry {
    pub fn builtin() -> Self {
        let agents = builtin_agents().into_iter().map(|a| (a.name.clone(), a)).collect();
        Self { agents }
    }

    /// Built-ins plus every valid `*.md` file in `dir`.  `known_tools` is the
    /// full set of tool names a definition may refer to.
    pub fn load(dir: &Path, known_tools: &[String]) -> Self {
        let mut reg = Self::builtin();
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "no agents directory");
            return reg;
        }
        let files = walkdir::WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|x| x == "md"));
        for entry in files {
            match parse_agent_file(entry.path(), known_tools) {
                Ok(agent) => {
                    debug!(agent = %agent.name, path = %entry.path().display(), "loaded agent");
                    reg.agents.insert(agent.name.clone(), agent);
                }
                Err(e) => warn!(path = %entry.path().display(), error = %e, "skipping invalid agent file"),
            }
        }
        reg
    }

    pub fn get(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentDefinition> {
        self.agents.values()
    }
}

fn parse_agent_file(path: &Path, known_tools: &[String]) -> anyhow::Result<AgentDefinition> {
    let raw = std::fs::read_to_string(path)?;
    let (fm, body): (AgentFrontmatter, &str) = frontmatter::parse(&raw)?;
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();

    let name = fm.name.filter(|n| !n.trim().is_empty()).unwrap_or(stem);
    if name.is_empty() || name.contains(char::is_whitespace) {
        anyhow::bail!("invalid agent name '{name}'");
    }

    let tools = match fm.tools {
        None => Allowlist::All,
        Some(ToolsField::Star(s)) if s.trim() == "*" => Allowlist::All,
        Some(ToolsField::Star(s)) => anyhow::bail!("tools must be a list or \"*\", got '{s}'"),
        Some(ToolsField::List(list)) => {
            if let Some(unknown) = list.iter().find(|t| !known_tools.contains(t)) {
                anyhow::bail!("unknown tool '{unknown}'");
            }
            Allowlist::only(list)
        }
    };

    let prompt = fm.prompt.unwrap_or_else(|| body.trim().to_string());
    if prompt.trim().is_empty() {
        anyhow::bail!("agent '{name}' has no prompt");
    }
    let description = fm.description.unwrap_or_else(|| frontmatter::first_line(&prompt));

    Ok(AgentDefinition {
        name,
        description,
        tools,
        prompt,
        source: Some(path.to_path_buf()),
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
