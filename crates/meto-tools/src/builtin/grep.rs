// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::policy::ToolPermission;
use crate::tool::{required_str, Tool, ToolCall, ToolOutput};

const DEFAULT_LIMIT: usize = 200;

pub struct GrepSearchTool;

#[async_trait]
impl Tool for GrepSearchTool {
    fn name(&self) -> &str {
        "grep_search"
    }

    fn description(&self) -> &str {
        "Search file contents with a regular expression (ripgrep, falling back to grep). \
         Returns matching lines as path:line:text. Filter files with include (e.g. '*.rs')."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search in (default: current directory)"
                },
                "include": {
                    "type": "string",
                    "description": "Glob pattern to filter files, e.g. '*.rs'"
                },
                "case_insensitive": {
                    "type": "boolean",
                    "description": "Ignore case (default false)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of matching lines to return (default 200)"
                }
            },
            "required": ["pattern"]
        })
    }

    fn permission(&self) -> ToolPermission {
        ToolPermission::ExternalPath { arg: "path" }
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let pattern = match required_str(call, "pattern") {
            Ok(p) => p,
            Err(out) => return out,
        };
        let search = Search {
            pattern,
            path: call.args.get("path").and_then(Value::as_str).unwrap_or("."),
            include: call.args.get("include").and_then(Value::as_str),
            case_insensitive: call.args.get("case_insensitive").and_then(Value::as_bool).unwrap_or(false),
        };
        let limit = call
            .args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_LIMIT);

        debug!(pattern = %search.pattern, path = %search.path, "grep_search tool");

        let output = match search.ripgrep().output().await {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("rg not found, falling back to grep");
                match search.grep().output().await {
                    Ok(o) => o,
                    Err(e) => return ToolOutput::err(&call.id, format!("search failed: {e}")),
                }
            }
            Err(e) => return ToolOutput::err(&call.id, format!("search failed: {e}")),
        };

        match output.status.code() {
            Some(0) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let total = stdout.lines().count();
                let mut text = stdout.lines().take(limit).collect::<Vec<_>>().join("\n");
                if total > limit {
                    text.push_str(&format!("\n...[{} more matches not shown]", total - limit));
                }
                ToolOutput::ok(&call.id, text)
            }
            Some(1) => ToolOutput::ok(&call.id, "No matches found."),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                ToolOutput::err(&call.id, format!("search failed: {}", stderr.trim()))
            }
        }
    }
}

struct Search<'a> {
    pattern: &'a str,
    path: &'a str,
    include: Option<&'a str>,
    case_insensitive: bool,
}

impl Search<'_> {
    fn ripgrep(&self) -> Command {
        let mut cmd = Command::new("rg");
        cmd.args(["--line-number", "--no-heading", "--color", "never"]);
        if self.case_insensitive {
            cmd.arg("-i");
        }
        if let Some(glob) = self.include {
            cmd.arg("-g").arg(glob);
        }
        cmd.arg("-e").arg(self.pattern).arg(self.path);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    fn grep(&self) -> Command {
        let mut cmd = Command::new("grep");
        cmd.args(["-R", "-n", "-E", "-I"]);
        if self.case_insensitive {
            cmd.arg("-i");
        }
        if let Some(glob) = self.include {
            cmd.arg(format!("--include={glob}"));
        }
        cmd.arg("-e").arg(self.pattern).arg(self.path);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "1".into(), name: "grep_search".into(), args }
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn alpha() {}\nfn beta() {}\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "Alpha in text\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn finds_matching_lines() {
        let dir = fixture();
        let out = GrepSearchTool
            .execute(&call(json!({"pattern": "fn beta", "path": dir.path().to_str().unwrap()})))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("a.rs:2:fn beta() {}"));
    }

    #[tokio::test]
    async fn case_insensitive_and_include_filter() {
        let dir = fixture();
        let out = GrepSearchTool
            .execute(&call(json!({
                "pattern": "alpha",
                "path": dir.path().to_str().unwrap(),
                "case_insensitive": true,
                "include": "*.txt"
            })))
            .await;
        assert!(out.content.contains("b.txt"));
        assert!(!out.content.contains("a.rs"));
    }

    #[tokio::test]
    async fn no_match_is_not_an_error() {
        let dir = fixture();
        let out = GrepSearchTool
            .execute(&call(json!({"pattern": "zzz_nothing", "path": dir.path().to_str().unwrap()})))
            .await;
        assert!(!out.is_error);
        assert_eq!(out.content, "No matches found.");
    }
}
