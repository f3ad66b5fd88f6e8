// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use meto_tools::{required_str, AgentContext, Allowlist, Tool, ToolCall, ToolOutput, ToolPermission};

use crate::agent_loop::LoopState;
use crate::error::SubagentError;
use crate::runtime::Runtime;
use crate::session::Session;

/// Deepest allowed nesting below the top-level agent.
pub const MAX_DEPTH: usize = 3;

/// Spawns nested agent loops on behalf of one parent loop.
pub struct SubagentOrchestrator {
    runtime: Arc<Runtime>,
    parent: AgentContext,
    /// Nesting level of the parent (0 = top-level agent)
    depth: usize,
}

impl SubagentOrchestrator {
    pub fn new(runtime: Arc<Runtime>, parent: AgentContext, depth: usize) -> Self {
        Self { runtime, parent, depth }
    }

    /// Run `prompt` in a fresh, non-persisted session and return the text
    /// handed back to the parent.
    ///
    /// The child may only use tools both the parent and `restricted` allow.
    /// Its turn budget is the configured subagent budget, regardless of how
    /// many turns the parent has left.
    pub async fn run_task(
        &self,
        prompt: &str,
        agent_name: &str,
        agent_prompt: Option<&str>,
        restricted: &Allowlist,
    ) -> Result<String, SubagentError> {
        let depth = self.depth + 1;
        if depth > MAX_DEPTH {
            return Err(SubagentError::DepthExceeded(MAX_DEPTH));
        }

        let ctx = self
            .parent
            .subagent(agent_name, restricted, self.runtime.config().agent.subagent_max_turns);
        info!(
            parent = %self.parent.agent_name,
            agent = %ctx.agent_name,
            depth,
            allowlist = %ctx.allowlist,
            max_turns = ctx.max_turns,
            "spawning sub-agent"
        );

        let mut session = Session::ephemeral();
        let outcome = self
            .runtime
            .run_nested(&mut session, &ctx, prompt, agent_prompt, None, depth)
            .await?;
        debug!(agent = %ctx.agent_name, state = ?outcome.state, turns = outcome.turns, "sub-agent finished");

        let mut text = if outcome.text.trim().is_empty() {
            "(sub-agent produced no text output)".to_string()
        } else {
            outcome.text
        };
        if outcome.state == LoopState::MaxTurnsReached {
            text.push_str(&format!("\n\n[subagent stopped after {} turns]", outcome.turns));
        }
        Ok(text)
    }
}

/// `run_task`: delegate a self-contained task to a named agent.
pub struct RunTaskTool {
    orchestrator: SubagentOrchestrator,
}

impl RunTaskTool {
    pub fn new(orchestrator: SubagentOrchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Tool for RunTaskTool {
    fn name(&self) -> &str {
        "run_task"
    }

    fn description(&self) -> &str {
        "Run a task in a sub-agent with an empty conversation and return its final answer. \
         The prompt must contain all context the sub-agent needs. Maximum nesting depth is 3."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "Short (3-5 word) label for the task"
                },
                "prompt": {
                    "type": "string",
                    "description": "Complete instructions for the sub-agent"
                },
                "agent_name": {
                    "type": "string",
                    "description": "Agent to run, as listed under Subagents"
                }
            },
            "required": ["prompt", "agent_name"]
        })
    }

    fn permission(&self) -> ToolPermission {
        ToolPermission::Never
    }

    /// The nested loop enforces its own deadlines per model call and tool.
    fn self_bounded(&self) -> bool {
        true
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let prompt = match required_str(call, "prompt") {
            Ok(p) => p,
            Err(out) => return out,
        };
        let agent_name = match required_str(call, "agent_name") {
            Ok(n) => n,
            Err(out) => return out,
        };
        if prompt.trim().is_empty() {
            return ToolOutput::err(&call.id, "prompt must not be empty");
        }

        let agents = self.orchestrator.runtime.agents();
        let Some(agent) = agents.get(agent_name) else {
            let available = agents.names().join(", ");
            return ToolOutput::err(
                &call.id,
                format!("Unknown agent type '{agent_name}'. Available agents: {available}"),
            );
        };
        if let Some(label) = call.args.get("description").and_then(Value::as_str) {
            debug!(agent = %agent.name, task = %label, "run_task");
        }

        match self
            .orchestrator
            .run_task(prompt, &agent.name, Some(&agent.prompt), &agent.tools)
            .await
        {
            Ok(text) => ToolOutput::ok(&call.id, text),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}
