// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use tracing::{debug, info, warn};

use meto_model::Message;
use meto_tools::{
    validate_args, AgentContext, ConfirmRequest, ExecError, PermissionDecision, PermissionPolicy,
    ToolCall, ToolExecutor, ToolOutput, ToolRegistry, UserInteraction,
};

use crate::error::{SessionLogError, ToolError};
use crate::hooks::{HookEvent, HookInput, HookRunner};
use crate::session::Session;

/// Takes one tool call from request to appended tool message.
///
/// Stages, in order: resolve against the allowlist, validate arguments,
/// permission, pre-hooks, execute under the deadline, truncate, post-hooks,
/// append.  Any failure before execution short-circuits into an error tool
/// message; only log I/O errors escape.
pub struct ToolDispatcher {
    registry: ToolRegistry,
    policy: Arc<PermissionPolicy>,
    hooks: Arc<HookRunner>,
    executor: ToolExecutor,
    interaction: Arc<dyn UserInteraction>,
}

impl ToolDispatcher {
    pub fn new(
        registry: ToolRegistry,
        policy: Arc<PermissionPolicy>,
        hooks: Arc<HookRunner>,
        executor: ToolExecutor,
        interaction: Arc<dyn UserInteraction>,
    ) -> Self {
        Self { registry, policy, hooks, executor, interaction }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run `call` and append exactly one tool message for it.
    pub async fn dispatch(
        &self,
        call: &ToolCall,
        ctx: &AgentContext,
        session: &mut Session,
    ) -> Result<ToolOutput, SessionLogError> {
        let session_id = session.id.clone();
        let output = match self.run(call, ctx, &session_id).await {
            Ok(out) => out,
            Err(e) => {
                warn!(agent = %ctx.agent_name, tool = %call.name, call_id = %call.id, error = %e, "tool call failed");
                ToolOutput::err(&call.id, e.to_string())
            }
        };
        session.append(Message::tool_result(&call.id, &output.content))?;
        Ok(output)
    }

    async fn run(&self, call: &ToolCall, ctx: &AgentContext, session_id: &str) -> Result<ToolOutput, ToolError> {
        let tool = self
            .registry
            .resolve(&call.name, &ctx.allowlist)
            .ok_or_else(|| ToolError::NotFound {
                name: call.name.clone(),
                available: self.registry.names_for(&ctx.allowlist).join(", "),
            })?;

        validate_args(&tool.parameters_schema(), &call.args).map_err(|reason| ToolError::InvalidArguments {
            tool: call.name.clone(),
            reason,
        })?;

        match self.policy.decide(&call.name, Some(tool.permission()), &call.args, ctx) {
            PermissionDecision::AutoApprove => {}
            PermissionDecision::Deny { reason } => {
                return Err(ToolError::PermissionDenied { tool: call.name.clone(), reason });
            }
            PermissionDecision::Confirm { detail } => {
                let req = ConfirmRequest {
                    agent_name: ctx.agent_name.clone(),
                    tool_name: call.name.clone(),
                    detail,
                };
                if !self.interaction.confirm(&req).await {
                    info!(tool = %call.name, "tool call declined by user");
                    return Err(ToolError::PermissionDenied {
                        tool: call.name.clone(),
                        reason: "declined by user".into(),
                    });
                }
            }
        }

        if ctx.hooks_enabled {
            let input = HookInput::tool(HookEvent::PreToolUse, session_id, &call.name, &call.id, &call.args);
            if let Some(reason) = self.hooks.pre_tool_use(&input).await {
                return Err(ToolError::HookBlocked { reason });
            }
        }

        let raw = self
            .executor
            .execute(tool, call.clone())
            .await
            .map_err(|e| match e {
                ExecError::Timeout(_) => ToolError::Timeout { tool: call.name.clone(), message: e.to_string() },
                ExecError::Crashed(message) => ToolError::Execution { tool: call.name.clone(), message },
            })?;

        let truncated = self.executor.truncate(&raw.content);
        if truncated.was_truncated() {
            debug!(tool = %call.name, omitted = truncated.omitted, "tool output truncated");
        }
        let output = ToolOutput {
            call_id: call.id.clone(),
            content: truncated.content,
            is_error: raw.is_error,
        };

        if ctx.hooks_enabled {
            let mut input = HookInput::tool(HookEvent::PostToolUse, session_id, &call.name, &call.id, &call.args);
            input.result = Some(&output.content);
            self.hooks.post_tool_use(&input).await;
        }

        Ok(output)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
