// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ToolPermission;
use crate::tool::{Tool, ToolCall, ToolOutput};

const DEFAULT_LIMIT: usize = 200;
const MAX_DEPTH: usize = 5;

pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List directory contents sorted by name, with type, size and modification time.\n\
         Directories have a trailing /. Hidden entries are skipped unless show_hidden is set.\n\
         recursive descends up to 5 levels; .git/ target/ node_modules/ are never entered."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (default: current directory)"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Descend into subdirectories (default false)"
                },
                "show_hidden": {
                    "type": "boolean",
                    "description": "Include entries whose name starts with '.' (default false)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of entries to return (default 200)"
                }
            }
        })
    }

    fn permission(&self) -> ToolPermission {
        ToolPermission::Never
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = call.args.get("path").and_then(Value::as_str).unwrap_or(".").to_string();
        let recursive = call.args.get("recursive").and_then(Value::as_bool).unwrap_or(false);
        let show_hidden = call.args.get("show_hidden").and_then(Value::as_bool).unwrap_or(false);
        let limit = call
            .args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_LIMIT);

        debug!(path = %path, recursive, show_hidden, limit, "list_dir tool");

        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_dir() => {}
            Ok(_) => return ToolOutput::err(&call.id, format!("not a directory: {path}")),
            Err(e) => return ToolOutput::err(&call.id, format!("cannot access {path}: {e}")),
        }

        let opts = Walk {
            max_depth: if recursive { MAX_DEPTH } else { 0 },
            show_hidden,
            limit,
        };
        let mut entries = Vec::new();
        let mut truncated = false;
        collect_entries(&opts, &path, "", 0, &mut entries, &mut truncated).await;

        if entries.is_empty() {
            return ToolOutput::ok(&call.id, "(empty directory)");
        }
        let mut output = entries.join("\n");
        if truncated {
            output.push_str(&format!("\n...[output truncated at {limit} entries]"));
        }
        ToolOutput::ok(&call.id, output)
    }
}

static EXCLUDED_DIRS: &[&str] = &[".git", "target", "node_modules", "__pycache__", ".venv"];

struct Walk {
    max_depth: usize,
    show_hidden: bool,
    limit: usize,
}

#[async_recursion::async_recursion]
async fn collect_entries(
    opts: &Walk,
    dir: &str,
    prefix: &str,
    depth: usize,
    entries: &mut Vec<String>,
    truncated: &mut bool,
) {
    let mut rd = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(_) => return,
    };

    let mut children = Vec::new();
    while let Ok(Some(entry)) = rd.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if !opts.show_hidden && name.starts_with('.') {
            continue;
        }
        let meta = entry.metadata().await.ok();
        children.push((name, meta));
    }
    children.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, meta) in children {
        if entries.len() >= opts.limit {
            *truncated = true;
            return;
        }
        let is_dir = meta.as_ref().map(|m| m.is_dir()).unwrap_or(false);
        let rel = format!("{prefix}{name}");
        entries.push(format_entry(&rel, is_dir, meta.as_ref()));

        if is_dir && depth < opts.max_depth && !EXCLUDED_DIRS.contains(&name.as_str()) {
            let child_dir = format!("{}/{name}", dir.trim_end_matches('/'));
            let child_prefix = format!("{rel}/");
            collect_entries(opts, &child_dir, &child_prefix, depth + 1, entries, truncated).await;
        }
    }
}

fn format_entry(rel: &str, is_dir: bool, meta: Option<&std::fs::Metadata>) -> String {
    let modified = meta
        .and_then(|m| m.modified().ok())
        .map(|t| chrono::DateTime::<chrono::Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".into());
    if is_dir {
        format!("dir   {:>10}  {modified}  {rel}/", "-")
    } else {
        let size = meta.map(|m| m.len()).unwrap_or(0);
        format!("file  {size:>10}  {modified}  {rel}")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "1".into(), name: "list_dir".into(), args }
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "hello").unwrap();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();
        std::fs::create_dir(dir.path().join("a_dir")).unwrap();
        std::fs::write(dir.path().join("a_dir/inner.rs"), "fn main() {}").unwrap();
        dir
    }

    #[tokio::test]
    async fn lists_sorted_non_recursive() {
        let dir = fixture();
        let out = ListDirTool.execute(&call(json!({"path": dir.path().to_str().unwrap()}))).await;
        assert!(!out.is_error);
        let lines: Vec<&str> = out.content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("a_dir/"));
        assert!(lines[1].ends_with("b.txt"));
        assert!(lines[1].contains(" 5 "));
    }

    #[tokio::test]
    async fn recursive_includes_children() {
        let dir = fixture();
        let out = ListDirTool
            .execute(&call(json!({"path": dir.path().to_str().unwrap(), "recursive": true})))
            .await;
        assert!(out.content.contains("a_dir/inner.rs"));
    }

    #[tokio::test]
    async fn hidden_entries_only_on_request() {
        let dir = fixture();
        let p = dir.path().to_str().unwrap();
        let plain = ListDirTool.execute(&call(json!({"path": p}))).await;
        assert!(!plain.content.contains(".hidden"));
        let all = ListDirTool.execute(&call(json!({"path": p, "show_hidden": true}))).await;
        assert!(all.content.contains(".hidden"));
    }

    #[tokio::test]
    async fn limit_truncates() {
        let dir = fixture();
        let out = ListDirTool
            .execute(&call(json!({"path": dir.path().to_str().unwrap(), "recursive": true, "limit": 1})))
            .await;
        assert!(out.content.contains("truncated at 1 entries"));
    }

    #[tokio::test]
    async fn missing_directory_is_error() {
        let out = ListDirTool.execute(&call(json!({"path": "/no/such/dir/xyz"}))).await;
        assert!(out.is_error);
    }
}
