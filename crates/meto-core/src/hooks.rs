// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Lifecycle hooks.
//!
//! Hooks are shell commands listed in a YAML file:
//!
//! ```yaml
//! hooks:
//!   - name: no-writes
//!     event: pre_tool_use
//!     tools: [write_file]
//!     command: echo "blocked: no writes"; exit 2
//!     timeout: 10
//! ```
//!
//! | Exit code | Meaning |
//! |:----------|:--------|
//! | 0         | allow |
//! | 1         | allow, log a warning |
//! | 2         | block; stdout is the reason (pre_tool_use only) |
//!
//! Any other status, a spawn failure or a timeout counts as 1.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    SessionStart,
    PreToolUse,
    PostToolUse,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::SessionStart => "session_start",
            HookEvent::PreToolUse => "pre_tool_use",
            HookEvent::PostToolUse => "post_tool_use",
        }
    }
}

fn default_hook_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookSpec {
    pub name: String,
    pub event: HookEvent,
    /// Tool names this hook applies to; empty means every tool.
    #[serde(default)]
    pub tools: Vec<String>,
    pub command: String,
    /// Seconds
    #[serde(default = "default_hook_timeout")]
    pub timeout: u64,
}

impl HookSpec {
    fn applies_to(&self, event: HookEvent, tool: Option<&str>) -> bool {
        if self.event != event {
            return false;
        }
        match tool {
            Some(t) if !self.tools.is_empty() => self.tools.iter().any(|n| n == t),
            _ => true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct HooksFile {
    #[serde(default)]
    hooks: Vec<HookSpec>,
}

/// Interpreted result of one hook process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutcome {
    /// Always 0, 1 or 2
    pub exit_code: u8,
    pub stdout: String,
}

/// Data handed to a hook in `HOOK_INPUT_JSON`.
#[derive(Debug, Clone, Serialize)]
pub struct HookInput<'a> {
    pub event: HookEvent,
    pub session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<&'a str>,
}

impl<'a> HookInput<'a> {
    pub fn session_start(session_id: &'a str) -> Self {
        Self {
            event: HookEvent::SessionStart,
            session_id,
            tool: None,
            tool_call_id: None,
            params: None,
            result: None,
        }
    }

    pub fn tool(event: HookEvent, session_id: &'a str, tool: &'a str, call_id: &'a str, params: &'a Value) -> Self {
        Self {
            event,
            session_id,
            tool: Some(tool),
            tool_call_id: Some(call_id),
            params: Some(params),
            result: None,
        }
    }
}

/// Runs the configured hooks in order.
#[derive(Debug, Default)]
pub struct HookRunner {
    hooks: Vec<HookSpec>,
    cwd: PathBuf,
}

impl HookRunner {
    pub fn new(hooks: Vec<HookSpec>, cwd: PathBuf) -> anyhow::Result<Self> {
        let name_re = regex::Regex::new(r"^[A-Za-z0-9_-]+$")?;
        for h in &hooks {
            if !name_re.is_match(&h.name) {
                anyhow::bail!("invalid hook name '{}': use letters, digits, '_' or '-'", h.name);
            }
        }
        Ok(Self { hooks, cwd })
    }

    /// Load hooks from a YAML file.  A missing file means no hooks.
    pub fn load(path: &Path, cwd: PathBuf) -> anyhow::Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no hooks file");
                return Ok(Self { hooks: Vec::new(), cwd });
            }
            Err(e) => return Err(anyhow::Error::new(e).context(format!("reading {}", path.display()))),
        };
        let file: HooksFile = if raw.trim().is_empty() {
            HooksFile::default()
        } else {
            serde_yaml::from_str(&raw).with_context(|| format!("parsing hooks file {}", path.display()))?
        };
        debug!(path = %path.display(), count = file.hooks.len(), "loaded hooks");
        Self::new(file.hooks, cwd)
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run `session_start` hooks.  Results are logged only.
    pub async fn session_start(&self, session_id: &str) {
        let input = HookInput::session_start(session_id);
        for hook in self.matching(HookEvent::SessionStart, None) {
            self.run_one(hook, &input).await;
        }
    }

    /// Run `pre_tool_use` hooks for a call.  Returns the block reason of the
    /// first hook that exits 2; later hooks are not run.
    pub async fn pre_tool_use(&self, input: &HookInput<'_>) -> Option<String> {
        for hook in self.matching(HookEvent::PreToolUse, input.tool) {
            let outcome = self.run_one(hook, input).await;
            if outcome.exit_code == 2 {
                let reason = outcome.stdout.trim();
                let reason = if reason.is_empty() {
                    format!("blocked by hook '{}'", hook.name)
                } else {
                    reason.to_string()
                };
                warn!(hook = %hook.name, tool = ?input.tool, reason = %reason, "tool call blocked by hook");
                return Some(reason);
            }
        }
        None
    }

    /// Run `post_tool_use` hooks.  Observational: nothing blocks.
    pub async fn post_tool_use(&self, input: &HookInput<'_>) {
        for hook in self.matching(HookEvent::PostToolUse, input.tool) {
            let outcome = self.run_one(hook, input).await;
            if outcome.exit_code == 2 {
                debug!(hook = %hook.name, "post_tool_use hook exit 2 ignored");
            }
        }
    }

    fn matching<'s>(&'s self, event: HookEvent, tool: Option<&'s str>) -> impl Iterator<Item = &'s HookSpec> + 's {
        self.hooks.iter().filter(move |h| h.applies_to(event, tool))
    }

    async fn run_one(&self, hook: &HookSpec, input: &HookInput<'_>) -> HookOutcome {
        let payload = serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string());
        let mut cmd = Command::new("bash");
        cmd.arg("-c")
            .arg(&hook.command)
            .current_dir(&self.cwd)
            .env("HOOK_INPUT_JSON", payload)
            .env("METO_HOOK_EVENT", input.event.as_str())
            .env("METO_TOOL_NAME", input.tool.unwrap_or(""))
            .env("METO_SESSION_ID", input.session_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(hook = %hook.name, event = input.event.as_str(), "running hook");

        let timeout = Duration::from_secs(hook.timeout);
        match tokio::time::timeout(timeout, cmd.output()).await {
            Err(_) => {
                warn!(hook = %hook.name, timeout_secs = hook.timeout, "hook timed out; treating as warning");
                HookOutcome { exit_code: 1, stdout: String::new() }
            }
            Ok(Err(e)) => {
                warn!(hook = %hook.name, error = %e, "hook failed to start; treating as warning");
                HookOutcome { exit_code: 1, stdout: String::new() }
            }
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let exit_code = match output.status.code() {
                    Some(0) => 0,
                    Some(2) => 2,
                    _ => 1,
                };
                if exit_code == 1 {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!(
                        hook = %hook.name,
                        status = ?output.status.code(),
                        stderr = %stderr.trim(),
                        "hook reported a warning"
                    );
                }
                HookOutcome { exit_code, stdout }
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn hook(name: &str, event: HookEvent, tools: &[&str], command: &str) -> HookSpec {
        HookSpec {
            name: name.into(),
            event,
            tools: tools.iter().map(|s| s.to_string()).collect(),
            command: command.into(),
            timeout: 5,
        }
    }

    fn runner(hooks: Vec<HookSpec>) -> HookRunner {
        HookRunner::new(hooks, std::env::temp_dir()).unwrap()
    }

    #[test]
    fn invalid_name_is_rejected() {
        let err = HookRunner::new(vec![hook("bad name!", HookEvent::PreToolUse, &[], "true")], PathBuf::from("."))
            .unwrap_err();
        assert!(err.to_string().contains("invalid hook name"));
    }

    #[test]
    fn load_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hooks.yaml");
        std::fs::write(
            &path,
            "hooks:\n  - name: guard\n    event: pre_tool_use\n    tools: [shell]\n    command: exit 0\n",
        )
        .unwrap();
        let r = HookRunner::load(&path, dir.path().to_path_buf()).unwrap();
        assert_eq!(r.hooks.len(), 1);
        assert_eq!(r.hooks[0].timeout, 60);
        assert_eq!(r.hooks[0].event, HookEvent::PreToolUse);
    }

    #[test]
    fn missing_file_means_no_hooks() {
        let r = HookRunner::load(Path::new("/no/such/hooks.yaml"), PathBuf::from(".")).unwrap();
        assert!(r.is_empty());
    }

    #[tokio::test]
    async fn exit_two_blocks_with_stdout() {
        let r = runner(vec![hook("guard", HookEvent::PreToolUse, &[], "echo 'blocked: no writes'; exit 2")]);
        let args = json!({});
        let input = HookInput::tool(HookEvent::PreToolUse, "s1", "write_file", "c1", &args);
        assert_eq!(r.pre_tool_use(&input).await.as_deref(), Some("blocked: no writes"));
    }

    #[tokio::test]
    async fn exit_one_and_odd_codes_do_not_block() {
        let r = runner(vec![
            hook("warn", HookEvent::PreToolUse, &[], "exit 1"),
            hook("odd", HookEvent::PreToolUse, &[], "exit 7"),
        ]);
        let args = json!({});
        let input = HookInput::tool(HookEvent::PreToolUse, "s1", "shell", "c1", &args);
        assert!(r.pre_tool_use(&input).await.is_none());
    }

    #[tokio::test]
    async fn timeout_counts_as_warning() {
        let mut slow = hook("slow", HookEvent::PreToolUse, &[], "sleep 5; exit 2");
        slow.timeout = 0;
        let r = runner(vec![slow]);
        let args = json!({});
        let input = HookInput::tool(HookEvent::PreToolUse, "s1", "shell", "c1", &args);
        assert!(r.pre_tool_use(&input).await.is_none());
    }

    #[tokio::test]
    async fn tool_filter_scopes_hooks() {
        let r = runner(vec![hook("guard", HookEvent::PreToolUse, &["write_file"], "echo no; exit 2")]);
        let args = json!({});
        let other = HookInput::tool(HookEvent::PreToolUse, "s1", "read_file", "c1", &args);
        assert!(r.pre_tool_use(&other).await.is_none());
        let target = HookInput::tool(HookEvent::PreToolUse, "s1", "write_file", "c2", &args);
        assert!(r.pre_tool_use(&target).await.is_some());
    }

    #[tokio::test]
    async fn first_blocking_hook_stops_evaluation() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let r = runner(vec![
            hook("first", HookEvent::PreToolUse, &[], "echo first; exit 2"),
            hook("second", HookEvent::PreToolUse, &[], &format!("touch {}", marker.display())),
        ]);
        let args = json!({});
        let input = HookInput::tool(HookEvent::PreToolUse, "s1", "shell", "c1", &args);
        assert_eq!(r.pre_tool_use(&input).await.as_deref(), Some("first"));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn session_start_hook_receives_input_json() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("starts.jsonl");
        let cmd = format!("printf '%s\\n' \"$HOOK_INPUT_JSON\" >> {}", out.display());
        let r = runner(vec![
            hook("record", HookEvent::SessionStart, &[], &cmd),
            hook("not-me", HookEvent::PreToolUse, &[], &format!("echo wrong >> {}", out.display())),
        ]);
        r.session_start("s1").await;

        let written = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 1, "{written}");
        let v: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(v["event"], "session_start");
        assert_eq!(v["session_id"], "s1");
        assert!(v.get("tool").is_none());
    }

    #[tokio::test]
    async fn environment_carries_event_data() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("env.txt");
        let cmd = format!(
            "printf '%s|%s|%s\\n%s' \"$METO_HOOK_EVENT\" \"$METO_TOOL_NAME\" \"$METO_SESSION_ID\" \"$HOOK_INPUT_JSON\" > {}",
            out.display()
        );
        let r = runner(vec![hook("dump", HookEvent::PostToolUse, &[], &cmd)]);
        let args = json!({"path": "a.txt"});
        let mut input = HookInput::tool(HookEvent::PostToolUse, "sess-9", "read_file", "call-3", &args);
        input.result = Some("ok");
        r.post_tool_use(&input).await;

        let written = std::fs::read_to_string(&out).unwrap();
        let (first, json_line) = written.split_once('\n').unwrap();
        assert_eq!(first, "post_tool_use|read_file|sess-9");
        let v: Value = serde_json::from_str(json_line).unwrap();
        assert_eq!(v["tool_call_id"], "call-3");
        assert_eq!(v["params"]["path"], "a.txt");
        assert_eq!(v["result"], "ok");
    }
}
