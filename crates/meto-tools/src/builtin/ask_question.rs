// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ToolPermission;
use crate::tool::{required_str, Tool, ToolCall, ToolOutput};
use crate::UserInteraction;

/// Ask the user a question through the front-end's [`UserInteraction`].
pub struct AskUserQuestionTool {
    interaction: Arc<dyn UserInteraction>,
}

impl AskUserQuestionTool {
    pub fn new(interaction: Arc<dyn UserInteraction>) -> Self {
        Self { interaction }
    }
}

#[async_trait]
impl Tool for AskUserQuestionTool {
    fn name(&self) -> &str {
        "ask_user_question"
    }

    fn description(&self) -> &str {
        "Ask the user a clarifying question and wait for the answer. \
         Optionally offer a list of suggested answers. \
         Only use this when you cannot proceed without the user's input."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to ask"
                },
                "options": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Suggested answers (optional)"
                }
            },
            "required": ["question"]
        })
    }

    fn permission(&self) -> ToolPermission {
        ToolPermission::Never
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let question = match required_str(call, "question") {
            Ok(q) => q,
            Err(out) => return out,
        };
        let options: Vec<String> = call
            .args
            .get("options")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        debug!(question = %question, options = options.len(), "ask_user_question tool");

        match self.interaction.ask(question, &options).await {
            Some(answer) => ToolOutput::ok(&call.id, format!("User answered: {answer}")),
            None => ToolOutput::err(&call.id, "no user is available to answer; proceed with your best judgement"),
        }
    }
}
