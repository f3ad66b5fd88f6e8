// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde_json::Value;

/// Events emitted by an agent loop while it runs.
/// Front-ends subscribe to these to drive their output.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A text chunk streamed from the model
    TextDelta(String),
    /// The complete text of one model response
    TextComplete(String),
    /// The model requested a tool call (id already made unique)
    ToolCallStarted {
        call_id: String,
        tool_name: String,
        args: Value,
    },
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    TokenUsage {
        input: u32,
        output: u32,
    },
    /// All tool messages of a turn have been appended
    TurnComplete { turns: u32 },
}
