// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation proposed by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque id, unique within one loop run.
    pub id: String,
    #[serde(rename = "tool_name")]
    pub name: String,
    /// Parsed JSON arguments.  Always an object after the loop has
    /// normalised it.
    #[serde(default)]
    pub arguments: Value,
}

/// One entry of a session history.
///
/// `content` is nullable so an assistant message that only carries tool
/// calls round-trips exactly through the session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Assistant message.  Empty text is stored as `None`.
    pub fn assistant(text: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        let text = text.into();
        Self {
            role: Role::Assistant,
            content: if text.is_empty() { None } else { Some(text) },
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Schema of a tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system_prompt: String,
    /// Conversation history.  Never contains a system message.
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
}

/// A single event emitted by a streaming model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    TextDelta(String),
    /// A (possibly partial) tool call.  Fragments sharing `index` belong to
    /// the same call; `arguments` is a raw JSON fragment to be concatenated.
    ToolCall {
        index: u32,
        id: String,
        name: String,
        arguments: String,
    },
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },
    Done,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assistant_with_calls_serialises_null_content() {
        let m = Message::assistant(
            "",
            vec![ToolCallRequest {
                id: "c1".into(),
                name: "read_file".into(),
                arguments: json!({"path": "a.txt"}),
            }],
        );
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["role"], "assistant");
        assert!(v["content"].is_null());
        assert_eq!(v["tool_calls"][0]["tool_name"], "read_file");
        assert!(v.get("tool_call_id").is_none());
    }

    #[test]
    fn tool_message_carries_call_id() {
        let m = Message::tool_result("c1", "ok");
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "c1");
        assert!(v.get("tool_calls").is_none());
    }

    #[test]
    fn missing_optional_fields_deserialise_to_defaults() {
        let m: Message = serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert_eq!(m, Message::user("hi"));
    }
}
