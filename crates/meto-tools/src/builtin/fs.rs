// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ToolPermission;
use crate::tool::{required_str, Tool, ToolCall, ToolOutput};

const DEFAULT_LINE_LIMIT: usize = 2000;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file. Lines are numbered starting at 1. \
         Use offset/limit to page through large files. \
         Reading a file outside the project directory requires confirmation."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file"
                },
                "offset": {
                    "type": "integer",
                    "description": "1-indexed line number to start reading from (default 1)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return (default 2000)"
                }
            },
            "required": ["path"]
        })
    }

    fn permission(&self) -> ToolPermission {
        ToolPermission::ExternalPath { arg: "path" }
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match required_str(call, "path") {
            Ok(p) => p,
            Err(out) => return out,
        };
        let offset = call.args.get("offset").and_then(Value::as_u64).unwrap_or(1).max(1) as usize;
        let limit = call
            .args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_LINE_LIMIT);

        debug!(path = %path, offset, limit, "read_file tool");

        let text = match tokio::fs::read_to_string(path).await {
            Ok(t) => t,
            Err(e) => return ToolOutput::err(&call.id, format!("cannot read {path}: {e}")),
        };
        if text.is_empty() {
            return ToolOutput::ok(&call.id, "File is empty.");
        }

        let total = text.lines().count();
        let mut out: Vec<String> = text
            .lines()
            .enumerate()
            .skip(offset - 1)
            .take(limit)
            .map(|(i, line)| format!("{:>6}\t{line}", i + 1))
            .collect();
        if out.is_empty() {
            return ToolOutput::err(
                &call.id,
                format!("offset {offset} is past the end of {path} ({total} lines)"),
            );
        }
        let last = offset - 1 + out.len();
        if last < total {
            out.push(format!("... [{} more lines; continue with offset={}]", total - last, last + 1));
        }
        ToolOutput::ok(&call.id, out.join("\n"))
    }
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text to a file, replacing any existing content. \
         Parent directories are created as needed. \
         Writing outside the project directory requires confirmation."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn permission(&self) -> ToolPermission {
        ToolPermission::ExternalPath { arg: "path" }
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match required_str(call, "path") {
            Ok(p) => p,
            Err(out) => return out,
        };
        let content = match required_str(call, "content") {
            Ok(c) => c,
            Err(out) => return out,
        };

        debug!(path = %path, bytes = content.len(), "write_file tool");

        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutput::err(&call.id, format!("cannot create {}: {e}", parent.display()));
            }
        }
        match tokio::fs::write(path, content).await {
            Ok(()) => ToolOutput::ok(
                &call.id,
                format!("Wrote {} lines ({} bytes) to {path}", content.lines().count(), content.len()),
            ),
            Err(e) => ToolOutput::err(&call.id, format!("cannot write {path}: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
