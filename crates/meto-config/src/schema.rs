// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration.
///
/// Built once at startup by [`crate::load`] and then passed explicitly (usually
/// behind an `Arc`) to everything that needs it.  Nothing in the runtime reads
/// environment variables on its own after this point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Which model backend to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible `/chat/completions` endpoint (LiteLLM proxy, OpenAI, vLLM …)
    #[default]
    Openai,
    /// Offline echo provider, useful for smoke tests
    Mock,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Openai => write!(f, "openai"),
            ProviderKind::Mock => write!(f, "mock"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::Openai),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(format!("unknown model provider {other:?} (expected openai | mock)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    /// Model name forwarded to the provider API
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Explicit API key.  Prefer the `METO_LLM_API_KEY` environment variable
    /// over committing keys to a settings file.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Wall-clock limit for a single model call, including stream collection
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_model_name() -> String {
    "gpt-4.1".into()
}

fn default_base_url() -> String {
    "http://localhost:4444".into()
}

fn default_model_timeout_secs() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            name: default_model_name(),
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_model_timeout_secs(),
            max_tokens: None,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Turn budget of the top-level agent loop
    #[serde(default = "default_main_max_turns")]
    pub main_max_turns: u32,
    /// Turn budget of every subagent loop, independent of the parent's
    #[serde(default = "default_subagent_max_turns")]
    pub subagent_max_turns: u32,
    /// Skip interactive confirmations.  Deny rules and allowlists still apply.
    #[serde(default)]
    pub yolo: bool,
}

fn default_main_max_turns() -> u32 {
    25
}

fn default_subagent_max_turns() -> u32 {
    15
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            main_max_turns: default_main_max_turns(),
            subagent_max_turns: default_subagent_max_turns(),
            yolo: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Timeout in seconds for a single tool call
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    /// Tool output longer than this many characters is head/tail truncated
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
    /// Extra directories file tools may touch without confirmation
    #[serde(default)]
    pub safe_dirs: Vec<PathBuf>,
    /// Automatically approve shell commands matching these glob patterns
    #[serde(default)]
    pub auto_approve_patterns: Vec<String>,
    /// Block shell commands matching these glob patterns
    #[serde(default = "default_deny_patterns")]
    pub deny_patterns: Vec<String>,
}

fn default_tool_timeout_secs() -> u64 {
    120
}

fn default_max_output_chars() -> usize {
    50_000
}

fn default_deny_patterns() -> Vec<String> {
    vec!["rm -rf /*".into(), "dd if=*".into()]
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
            max_output_chars: default_max_output_chars(),
            safe_dirs: Vec::new(),
            auto_approve_patterns: Vec::new(),
            deny_patterns: default_deny_patterns(),
        }
    }
}

/// Filesystem locations used by the runtime.  Relative paths are resolved
/// against the working directory at the point of use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_session_dir")]
    pub session_dir: PathBuf,
    #[serde(default = "default_agents_dir")]
    pub agents_dir: PathBuf,
    #[serde(default = "default_commands_dir")]
    pub commands_dir: PathBuf,
    #[serde(default = "default_skills_dir")]
    pub skills_dir: PathBuf,
    #[serde(default = "default_plan_dir")]
    pub plan_dir: PathBuf,
    #[serde(default = "default_hooks_file")]
    pub hooks_file: PathBuf,
}

fn default_session_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".meto").join("sessions"))
        .unwrap_or_else(|| PathBuf::from(".meto/sessions"))
}

fn default_agents_dir() -> PathBuf {
    PathBuf::from(".meto/agents")
}

fn default_commands_dir() -> PathBuf {
    PathBuf::from(".meto/commands")
}

fn default_skills_dir() -> PathBuf {
    PathBuf::from(".meto/skills")
}

fn default_plan_dir() -> PathBuf {
    PathBuf::from(".meto/plans")
}

fn default_hooks_file() -> PathBuf {
    PathBuf::from(".meto/hooks.yaml")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            session_dir: default_session_dir(),
            agents_dir: default_agents_dir(),
            commands_dir: default_commands_dir(),
            skills_dir: default_skills_dir(),
            plan_dir: default_plan_dir(),
            hooks_file: default_hooks_file(),
        }
    }
}

impl PathsConfig {
    /// Directories whose contents the runtime itself manages.  File tools
    /// operating inside them never need a confirmation.
    pub fn managed_dirs(&self) -> [&Path; 4] {
        [
            self.plan_dir.as_path(),
            self.agents_dir.as_path(),
            self.commands_dir.as_path(),
            self.skills_dir.as_path(),
        ]
    }
}

/// Expand a leading `~` in a configured path.
pub fn expand_path(p: &Path) -> PathBuf {
    let raw = p.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).into_owned())
}

impl Config {
    /// Expand `~` in every configured path.
    pub fn expand_paths(&mut self) {
        let paths = &mut self.paths;
        for p in [
            &mut paths.session_dir,
            &mut paths.agents_dir,
            &mut paths.commands_dir,
            &mut paths.skills_dir,
            &mut paths.plan_dir,
            &mut paths.hooks_file,
        ] {
            *p = expand_path(p);
        }
        for p in &mut self.tools.safe_dirs {
            *p = expand_path(p);
        }
    }

    /// Reject values the runtime cannot operate with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.agent.main_max_turns == 0 {
            anyhow::bail!("agent.main_max_turns must be at least 1");
        }
        if self.agent.subagent_max_turns == 0 {
            anyhow::bail!("agent.subagent_max_turns must be at least 1");
        }
        if self.model.timeout_secs == 0 {
            anyhow::bail!("model.timeout_secs must be at least 1");
        }
        if self.tools.timeout_secs == 0 {
            anyhow::bail!("tools.timeout_secs must be at least 1");
        }
        if self.tools.max_output_chars == 0 {
            anyhow::bail!("tools.max_output_chars must be at least 1");
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
