// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Conversation export and the `/context` summary.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use meto_model::{Message, Role};

/// Rough size of one token in characters.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Json,
    Markdown,
    Text,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            "text" | "txt" => Ok(Self::Text),
            other => Err(format!("unknown export format '{other}' (expected json, markdown or text)")),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Markdown => "markdown",
            Self::Text => "text",
        })
    }
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
            Self::Text => "txt",
        }
    }
}

pub fn export(messages: &[Message], format: ExportFormat) -> String {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(messages).unwrap_or_else(|_| "[]".to_string()),
        ExportFormat::Markdown => messages.iter().map(markdown_section).collect(),
        ExportFormat::Text => messages.iter().map(text_section).collect::<Vec<_>>().join("\n"),
    }
}

fn markdown_section(msg: &Message) -> String {
    let mut out = String::new();
    match msg.role {
        Role::User => out.push_str(&format!("## User\n{}\n\n", msg.as_text().unwrap_or("").trim())),
        Role::Assistant => {
            if let Some(text) = msg.as_text().filter(|t| !t.trim().is_empty()) {
                out.push_str(&format!("## Assistant\n{}\n\n", text.trim()));
            }
            for tc in &msg.tool_calls {
                let envelope = serde_json::json!({
                    "tool_call_id": tc.id,
                    "name": tc.name,
                    "args": tc.arguments,
                });
                let pretty = serde_json::to_string_pretty(&envelope).unwrap_or_default();
                out.push_str(&format!("## Tool\n```json\n{pretty}\n```\n\n"));
            }
        }
        Role::Tool => {
            out.push_str(&format!("## Tool Result\n```\n{}\n```\n\n", msg.as_text().unwrap_or("")));
        }
    }
    out
}

fn text_section(msg: &Message) -> String {
    let mut lines = Vec::new();
    if let Some(text) = msg.as_text() {
        let who = match msg.role {
            Role::Tool => format!("tool[{}]", msg.tool_call_id.as_deref().unwrap_or("?")),
            role => role.to_string(),
        };
        lines.push(format!("{who}: {text}"));
    }
    for tc in &msg.tool_calls {
        lines.push(format!("assistant -> {}({}) [{}]", tc.name, tc.arguments, tc.id));
    }
    lines.join("\n")
}

/// Counts shown by `/context`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSummary {
    pub total: usize,
    pub user: usize,
    pub assistant: usize,
    pub tool: usize,
    pub tool_calls: usize,
    pub tools_used: BTreeSet<String>,
    pub chars: usize,
    pub estimated_tokens: usize,
}

pub fn summary(messages: &[Message]) -> ContextSummary {
    let mut s = ContextSummary { total: messages.len(), ..Default::default() };
    for msg in messages {
        match msg.role {
            Role::User => s.user += 1,
            Role::Assistant => s.assistant += 1,
            Role::Tool => s.tool += 1,
        }
        s.chars += msg.as_text().map(|t| t.chars().count()).unwrap_or(0);
        for tc in &msg.tool_calls {
            s.tool_calls += 1;
            s.tools_used.insert(tc.name.clone());
            s.chars += tc.arguments.to_string().chars().count();
        }
    }
    s.estimated_tokens = s.chars / CHARS_PER_TOKEN;
    s
}

impl fmt::Display for ContextSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Messages: {} (user {}, assistant {}, tool {})",
            self.total, self.user, self.assistant, self.tool
        )?;
        writeln!(f, "Tool calls: {}", self.tool_calls)?;
        if !self.tools_used.is_empty() {
            let names: Vec<&str> = self.tools_used.iter().map(String::as_str).collect();
            writeln!(f, "Tools used: {}", names.join(", "))?;
        }
        write!(f, "Estimated tokens: ~{} ({} chars)", self.estimated_tokens, self.chars)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use meto_model::ToolCallRequest;
    use serde_json::json;

    fn history() -> Vec<Message> {
        vec![
            Message::user("list files"),
            Message::assistant(
                "",
                vec![ToolCallRequest { id: "c1".into(), name: "list_dir".into(), arguments: json!({"path": "."}) }],
            ),
            Message::tool_result("c1", "Cargo.toml"),
            Message::assistant("There is one file.", vec![]),
        ]
    }

    #[test]
    fn summary_counts_roles_and_tools() {
        let s = summary(&history());
        assert_eq!(s.total, 4);
        assert_eq!((s.user, s.assistant, s.tool), (1, 2, 1));
        assert_eq!(s.tool_calls, 1);
        assert!(s.tools_used.contains("list_dir"));
        assert_eq!(s.estimated_tokens, s.chars / 4);
    }

    #[test]
    fn json_export_round_trips() {
        let h = history();
        let back: Vec<Message> = serde_json::from_str(&export(&h, ExportFormat::Json)).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn markdown_has_sections() {
        let md = export(&history(), ExportFormat::Markdown);
        assert!(md.starts_with("## User\nlist files\n\n"));
        assert!(md.contains("## Tool\n```json\n"));
        assert!(md.contains("## Tool Result\n```\nCargo.toml\n```"));
        assert!(md.contains("## Assistant\nThere is one file."));
    }

    #[test]
    fn text_export_tags_tool_results() {
        let txt = export(&history(), ExportFormat::Text);
        assert!(txt.contains("user: list files"));
        assert!(txt.contains("assistant -> list_dir("));
        assert!(txt.contains("tool[c1]: Cargo.toml"));
    }

    #[test]
    fn format_parsing() {
        assert_eq!("md".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert!("yaml".parse::<ExportFormat>().is_err());
    }
}
