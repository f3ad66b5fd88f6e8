// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::policy::ToolPermission;
use crate::tool::{required_str, Tool, ToolCall, ToolOutput};

/// Runs a bash one-liner.  The deadline is enforced by the executor; the
/// child is killed when the future is dropped.
pub struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command with bash and return stdout + stderr.\n\
         Prefer non-interactive commands; stdin is closed.\n\
         Do NOT use shell for file operations:\n\
         - Read files  → use read_file\n\
         - Write files → use write_file\n\
         - Search text → use grep_search\n\
         - List dirs   → use list_dir"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The complete bash command to execute"
                },
                "workdir": {
                    "type": "string",
                    "description": "Working directory (optional, defaults to cwd)"
                }
            },
            "required": ["command"]
        })
    }

    fn permission(&self) -> ToolPermission {
        ToolPermission::Command { arg: "command" }
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let command = match required_str(call, "command") {
            Ok(c) => c,
            Err(out) => return out,
        };
        let workdir = call.args.get("workdir").and_then(|v| v.as_str());

        debug!(cmd = %command, "executing shell tool");

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(command);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        // New session: the child must not reach the controlling terminal.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
        if let Some(wd) = workdir {
            cmd.current_dir(wd);
        }

        match cmd.output().await {
            Ok(output) => {
                let mut content = String::new();
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);

                if !stdout.is_empty() {
                    content.push_str(&stdout);
                }
                if !stderr.is_empty() {
                    if !content.is_empty() && !content.ends_with('\n') {
                        content.push('\n');
                    }
                    content.push_str("[stderr]\n");
                    content.push_str(&stderr);
                }

                let code = output.status.code().unwrap_or(-1);
                match code {
                    0 if content.is_empty() => ToolOutput::ok(&call.id, "(empty)"),
                    0 => ToolOutput::ok(&call.id, content),
                    // Exit 1 is "no matches" / "condition false" for grep, test and friends.
                    1 => ToolOutput::ok(&call.id, format!("[exit 1]\n{content}")),
                    _ => ToolOutput::err(&call.id, format!("[exit {code}]\n{content}")),
                }
            }
            Err(e) => ToolOutput::err(&call.id, format!("spawn error: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
