// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

use meto_model::ToolCallRequest;

use crate::policy::ToolPermission;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

impl From<&ToolCallRequest> for ToolCall {
    fn from(r: &ToolCallRequest) -> Self {
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            args: r.arguments.clone(),
        }
    }
}

/// The result of executing a tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    /// The tool failed non-fatally; `content` holds the error message.
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: msg.into(),
            is_error: true,
        }
    }
}

/// Trait that every built-in tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;
    /// How the permission policy classifies calls to this tool
    fn permission(&self) -> ToolPermission;
    /// Tools that bound their own run time (nested agent loops) are not
    /// subject to the executor deadline.
    fn self_bounded(&self) -> bool {
        false
    }
    /// Execute the tool.  Errors should be wrapped in [`ToolOutput::err`].
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

/// Fetch a required string argument or produce the standard error output.
pub fn required_str<'a>(call: &'a ToolCall, key: &str) -> Result<&'a str, ToolOutput> {
    call.args.get(key).and_then(|v| v.as_str()).ok_or_else(|| {
        let preview = serde_json::to_string(&call.args).unwrap_or_else(|_| "null".to_string());
        ToolOutput::err(
            &call.id,
            format!("missing required parameter '{key}'. Received: {preview}"),
        )
    })
}
