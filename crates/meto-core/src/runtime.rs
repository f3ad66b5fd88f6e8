// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! [`Runtime`]: the process-wide wiring every agent loop is built from.
//!
//! The runtime owns what parent and child loops share: the model, the
//! built-in tool definitions, the permission policy, hooks and the
//! agent/skill/command registries.  Session-bound tools (`manage_todos`,
//! `load_skill`) and `run_task` are added per loop in [`Runtime::registry_for`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{debug, info};

use meto_config::Config;
use meto_model::ModelProvider;
use meto_tools::{
    builtin, AgentContext, PermissionPolicy, ToolExecutor, ToolRegistry, UserInteraction,
};

use crate::agent_loop::{AgentLoop, LoopOutcome};
use crate::agents::AgentRegistry;
use crate::commands::{CommandDefinition, CommandRegistry};
use crate::compact::{compact_session, CompactReport};
use crate::dispatcher::ToolDispatcher;
use crate::error::LoopError;
use crate::events::AgentEvent;
use crate::hooks::HookRunner;
use crate::prompts::PromptBuilder;
use crate::session::Session;
use crate::skills::{LoadSkillTool, SkillRegistry};
use crate::subagent::{RunTaskTool, SubagentOrchestrator};
use crate::todo::ManageTodosTool;

/// Tools added per loop on top of the built-ins.
const SESSION_TOOLS: &[&str] = &["manage_todos", "load_skill", "run_task"];

pub struct Runtime {
    config: Arc<Config>,
    model: Arc<dyn ModelProvider>,
    builtins: ToolRegistry,
    policy: Arc<PermissionPolicy>,
    hooks: Arc<HookRunner>,
    executor: ToolExecutor,
    interaction: Arc<dyn UserInteraction>,
    agents: Arc<AgentRegistry>,
    skills: Arc<SkillRegistry>,
    commands: Arc<CommandRegistry>,
    cwd: PathBuf,
}

impl Runtime {
    /// Load hooks and the filesystem registries and assemble the runtime.
    pub fn new(
        config: Arc<Config>,
        model: Arc<dyn ModelProvider>,
        interaction: Arc<dyn UserInteraction>,
        cwd: PathBuf,
    ) -> anyhow::Result<Arc<Self>> {
        let mut builtins = ToolRegistry::new();
        builtin::register_builtins(&mut builtins, interaction.clone());

        let hooks = HookRunner::load(&config.paths.hooks_file, cwd.clone())
            .with_context(|| format!("loading hooks from {}", config.paths.hooks_file.display()))?;

        let mut known_tools = builtins.names();
        known_tools.extend(SESSION_TOOLS.iter().map(|s| s.to_string()));
        let agents = AgentRegistry::load(&config.paths.agents_dir, &known_tools);
        let skills = SkillRegistry::load(&config.paths.skills_dir);
        let commands = CommandRegistry::load(&config.paths.commands_dir);

        info!(
            model = %model.model_name(),
            provider = %model.name(),
            agents = agents.names().len(),
            skills = skills.names().len(),
            hooks = !hooks.is_empty(),
            "runtime ready"
        );

        Ok(Arc::new(Self {
            policy: Arc::new(PermissionPolicy::from_config(&config, &cwd)),
            executor: ToolExecutor::from_config(&config.tools),
            hooks: Arc::new(hooks),
            agents: Arc::new(agents),
            skills: Arc::new(skills),
            commands: Arc::new(commands),
            config,
            model,
            builtins,
            interaction,
            cwd,
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn skills(&self) -> &SkillRegistry {
        &self.skills
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Context of the top-level agent.
    pub fn main_context(&self) -> AgentContext {
        AgentContext::main(&self.config)
    }

    /// Fire `session_start` hooks.  Called once per top-level session.
    pub async fn start_session(&self, session: &Session) {
        self.hooks.session_start(&session.id).await;
    }

    /// Run one prompt in the top-level agent.
    pub async fn run(
        self: &Arc<Self>,
        session: &mut Session,
        ctx: &AgentContext,
        prompt: &str,
        events: Option<mpsc::Sender<AgentEvent>>,
    ) -> Result<LoopOutcome, LoopError> {
        self.run_nested(session, ctx, prompt, None, events, 0).await
    }

    /// Run a loop `depth` levels below the top-level agent.
    pub(crate) async fn run_nested(
        self: &Arc<Self>,
        session: &mut Session,
        ctx: &AgentContext,
        prompt: &str,
        agent_prompt: Option<&str>,
        events: Option<mpsc::Sender<AgentEvent>>,
        depth: usize,
    ) -> Result<LoopOutcome, LoopError> {
        debug!(agent = %ctx.agent_name, depth, allowlist = %ctx.allowlist, "starting agent loop");
        let registry = self.registry_for(session, ctx, depth);
        let dispatcher = ToolDispatcher::new(
            registry,
            self.policy.clone(),
            self.hooks.clone(),
            self.executor.clone(),
            self.interaction.clone(),
        );

        let mut builder = PromptBuilder::new(&self.cwd).with_agents(&self.agents).with_skills(&self.skills);
        if let Some(p) = agent_prompt {
            builder = builder.with_agent_prompt(p);
        }

        let mut agent_loop = AgentLoop::new(
            self.model.clone(),
            dispatcher,
            builder,
            Duration::from_secs(self.config.model.timeout_secs),
        );
        if let Some(tx) = events {
            agent_loop = agent_loop.with_events(tx);
        }
        agent_loop.run(session, ctx, prompt).await
    }

    /// Built-ins plus the tools bound to `session` and this nesting level.
    pub fn registry_for(self: &Arc<Self>, session: &Session, ctx: &AgentContext, depth: usize) -> ToolRegistry {
        let mut reg = self.builtins.clone();
        reg.register(ManageTodosTool::new(session.todos()));
        reg.register(LoadSkillTool::new(self.skills.clone(), session.skill_cache()));
        reg.register(RunTaskTool::new(SubagentOrchestrator::new(self.clone(), ctx.clone(), depth)));
        reg
    }

    /// Summarise the history of `session` with the runtime's model and
    /// continue under a new id.  `None` when the history is empty.
    pub async fn compact(&self, session: &mut Session) -> anyhow::Result<Option<CompactReport>> {
        let timeout = Duration::from_secs(self.config.model.timeout_secs);
        compact_session(session, self.model.as_ref(), timeout).await.context("compacting history")
    }

    /// Run a `context: fork` command in an isolated subagent and return its
    /// answer.
    pub async fn run_forked_command(
        self: &Arc<Self>,
        cmd: &CommandDefinition,
        args: &str,
        parent: &AgentContext,
    ) -> anyhow::Result<String> {
        let orchestrator = SubagentOrchestrator::new(self.clone(), parent.clone(), 0);
        let mut restricted = cmd.allowlist();
        let mut agent_prompt = None;
        let mut agent_name = cmd.name.clone();
        if let Some(name) = &cmd.agent {
            let agent = self
                .agents
                .get(name)
                .with_context(|| format!("command '{}' names unknown agent '{name}'", cmd.name))?;
            restricted = restricted.intersect(&agent.tools);
            agent_prompt = Some(agent.prompt.clone());
            agent_name = agent.name.clone();
        }
        orchestrator
            .run_task(&cmd.render(args), &agent_name, agent_prompt.as_deref(), &restricted)
            .await
            .with_context(|| format!("/{} failed", cmd.name))
    }
}
