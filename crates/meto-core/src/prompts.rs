// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use crate::agents::AgentRegistry;
use crate::mode::Mode;
use crate::skills::SkillRegistry;

pub const AGENTS_MD_BEGIN: &str = "----- BEGIN AGENTS.md (project instructions) -----";
pub const AGENTS_MD_END: &str = "----- END AGENTS.md -----";

/// Builds the system prompt for one agent loop.
///
/// Everything except `AGENTS.md` is fixed at construction; the project file
/// is re-read on every [`PromptBuilder::build`] so edits are picked up
/// mid-session.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    cwd: PathBuf,
    agents_md: PathBuf,
    agents: Vec<(String, String)>,
    skills: Vec<(String, String)>,
    agent_prompt: Option<String>,
}

impl PromptBuilder {
    pub fn new(cwd: &Path) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            agents_md: cwd.join("AGENTS.md"),
            agents: Vec::new(),
            skills: Vec::new(),
            agent_prompt: None,
        }
    }

    pub fn with_agents(mut self, agents: &AgentRegistry) -> Self {
        self.agents = agents.iter().map(|a| (a.name.clone(), a.description.clone())).collect();
        self
    }

    pub fn with_skills(mut self, skills: &SkillRegistry) -> Self {
        self.skills = skills.iter().map(|s| (s.name.clone(), s.description.clone())).collect();
        self
    }

    /// Instructions specific to the agent running the loop.
    pub fn with_agent_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.agent_prompt = Some(prompt.into());
        self
    }

    pub fn build(&self, tool_names: &[String], mode: Option<&Mode>) -> String {
        let mut sections = vec![identity_section(&self.cwd), tools_section(tool_names)];

        if let Some(prompt) = self.agent_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            sections.push(format!("## Agent Instructions\n\n{}", prompt.trim()));
        }
        if tool_names.iter().any(|n| n == "run_task") && !self.agents.is_empty() {
            sections.push(agents_section(&self.agents));
        }
        if tool_names.iter().any(|n| n == "load_skill") && !self.skills.is_empty() {
            sections.push(skills_section(&self.skills));
        }
        if let Some(mode) = mode {
            sections.push(mode.prompt_fragment());
        }
        sections.push(agents_md_block(&self.agents_md));

        sections.join("\n\n")
    }
}

fn identity_section(cwd: &Path) -> String {
    format!(
        "You are meto, an agent that completes software tasks by calling tools.\n\n\
         Working directory: `{}`\n\
         Relative paths in tool arguments are resolved against it.",
        cwd.display()
    )
}

fn tools_section(tool_names: &[String]) -> String {
    let list = if tool_names.is_empty() {
        "(none)".to_string()
    } else {
        tool_names.iter().map(|n| format!("- `{n}`")).collect::<Vec<_>>().join("\n")
    };
    format!(
        "## Available Tools\n{list}\n\n\
         ## Tool Rules\n\
         - Read a file before you change it.\n\
         - Prefer grep_search and list_dir over shell for exploring.\n\
         - Track work of three or more steps with manage_todos; keep exactly one task in progress.\n\
         - A tool result starting with 'permission denied' means the user declined: do not retry the \
           same call, choose another approach or ask.\n\
         - Large tool output is truncated in the middle; narrow the request instead of repeating it.\n\
         - When the task is complete, answer without calling tools."
    )
}

fn agents_section(agents: &[(String, String)]) -> String {
    let entries: Vec<String> = agents
        .iter()
        .map(|(name, desc)| format!("- `{name}`: {}", desc.trim()))
        .collect();
    format!(
        "## Subagents\n\n\
         Delegate self-contained work with run_task (agent_name, description, prompt). \
         A subagent starts with an empty conversation, so the prompt must carry all context it \
         needs. Only its final answer comes back.\n\n{}",
        entries.join("\n")
    )
}

fn skills_section(skills: &[(String, String)]) -> String {
    let entries: Vec<String> = skills
        .iter()
        .map(|(name, desc)| {
            format!(
                "  <skill>\n    <name>{name}</name>\n    <description>{}</description>\n  </skill>",
                desc.trim()
            )
        })
        .collect();
    format!(
        "## Skills\n\n\
         When the task matches one of the skills below, call load_skill with its name \
         before proceeding. Load a skill only when it clearly applies.\n\n\
         <available_skills>\n{}\n</available_skills>",
        entries.join("\n")
    )
}

/// The project instructions file, or a placeholder naming where it was expected.
fn agents_md_block(path: &Path) -> String {
    let body = match std::fs::read_to_string(path) {
        Ok(content) => content.trim_end().to_string(),
        Err(_) => format!("[AGENTS.md missing at: {}]", path.display()),
    };
    format!("{AGENTS_MD_BEGIN}\n{body}\n{AGENTS_MD_END}")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
