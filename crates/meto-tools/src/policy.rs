// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Component, Path, PathBuf};

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use meto_config::Config;

use crate::AgentContext;

/// How a tool's calls are classified before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPermission {
    /// Always run without asking.
    Never,
    /// Always ask; the named argument is shown to the user.
    Always { detail_arg: &'static str },
    /// Shell-like: the named argument is matched against the configured
    /// deny / auto-approve glob patterns, otherwise ask.
    Command { arg: &'static str },
    /// Ask only when the named path argument points outside the safe roots.
    ExternalPath { arg: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    AutoApprove,
    Confirm { detail: String },
    Deny { reason: String },
}

/// Maps a tool call to an approval decision.
///
/// [`PermissionPolicy::decide`] is a pure function of its inputs; all
/// configuration is captured at construction.
#[derive(Debug)]
pub struct PermissionPolicy {
    auto_patterns: Vec<Regex>,
    deny_patterns: Vec<Regex>,
    cwd: PathBuf,
    safe_roots: Vec<PathBuf>,
}

impl PermissionPolicy {
    /// `cwd` anchors relative paths, both in arguments and in the config.
    pub fn from_config(cfg: &Config, cwd: &Path) -> Self {
        let compile = |patterns: &[String]| -> Vec<Regex> {
            patterns.iter().filter_map(|p| glob_to_regex(p)).collect()
        };
        let cwd = normalize(Path::new("/"), cwd).unwrap_or_else(|| cwd.to_path_buf());
        let mut safe_roots: Vec<PathBuf> = resolve(&cwd).into_iter().collect();
        let configured = cfg
            .paths
            .managed_dirs()
            .into_iter()
            .map(Path::to_path_buf)
            .chain(cfg.tools.safe_dirs.iter().cloned());
        safe_roots.extend(configured.filter_map(|d| normalize(&cwd, &d)).filter_map(|d| resolve(&d)));
        Self {
            auto_patterns: compile(&cfg.tools.auto_approve_patterns),
            deny_patterns: compile(&cfg.tools.deny_patterns),
            cwd,
            safe_roots,
        }
    }

    /// Classify one call.  `permission` is `None` when the tool is not
    /// registered, which always asks.
    ///
    /// Tools outside the agent's allowlist are denied, and yolo only ever
    /// turns a confirmation into an approval.
    pub fn decide(
        &self,
        tool_name: &str,
        permission: Option<ToolPermission>,
        args: &Value,
        ctx: &AgentContext,
    ) -> PermissionDecision {
        if !ctx.allowlist.allows(tool_name) {
            return PermissionDecision::Deny {
                reason: format!("tool '{tool_name}' is not allowed for agent '{}'", ctx.agent_name),
            };
        }
        let base = self.classify(tool_name, permission, args);
        match base {
            PermissionDecision::Confirm { .. } if ctx.yolo => PermissionDecision::AutoApprove,
            other => other,
        }
    }

    fn classify(&self, tool_name: &str, permission: Option<ToolPermission>, args: &Value) -> PermissionDecision {
        let arg = |key: &str| args.get(key).and_then(Value::as_str).unwrap_or("").to_string();
        match permission {
            None => PermissionDecision::Confirm { detail: tool_name.to_string() },
            Some(ToolPermission::Never) => PermissionDecision::AutoApprove,
            Some(ToolPermission::Always { detail_arg }) => PermissionDecision::Confirm { detail: arg(detail_arg) },
            Some(ToolPermission::Command { arg: key }) => {
                let command = arg(key);
                if self.deny_patterns.iter().any(|re| re.is_match(&command)) {
                    return PermissionDecision::Deny {
                        reason: format!("command matches a deny pattern: {command}"),
                    };
                }
                if self.auto_patterns.iter().any(|re| re.is_match(&command)) {
                    return PermissionDecision::AutoApprove;
                }
                PermissionDecision::Confirm { detail: command }
            }
            Some(ToolPermission::ExternalPath { arg: key }) => {
                let raw = arg(key);
                if raw.trim().is_empty() || self.is_inside_safe_root(&raw) {
                    PermissionDecision::AutoApprove
                } else {
                    PermissionDecision::Confirm { detail: raw }
                }
            }
        }
    }

    /// Fails closed: a path that cannot be normalised or resolved is
    /// treated as outside.
    fn is_inside_safe_root(&self, raw: &str) -> bool {
        match normalize(&self.cwd, Path::new(raw)).and_then(|p| resolve(&p)) {
            Some(p) => self.safe_roots.iter().any(|root| p.starts_with(root)),
            None => false,
        }
    }
}

/// Resolve symlinks in the longest existing prefix of the absolute,
/// normalised path `p` and re-append the components that do not exist yet.
///
/// `None` when an existing entry cannot be canonicalised, which includes a
/// dangling symlink.
fn resolve(p: &Path) -> Option<PathBuf> {
    let mut existing = p.to_path_buf();
    let mut missing = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(mut out) => {
                out.extend(missing.iter().rev());
                return Some(out);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && existing.symlink_metadata().is_err() => {
                missing.push(existing.file_name()?.to_os_string());
                if !existing.pop() {
                    return None;
                }
            }
            Err(e) => {
                debug!(path = %existing.display(), error = %e, "cannot resolve path");
                return None;
            }
        }
    }
}

/// Lexically resolve `p` against `base`, folding `.` and `..`.
/// Returns `None` when `..` would climb above the filesystem root.
fn normalize(base: &Path, p: &Path) -> Option<PathBuf> {
    let joined = if p.is_absolute() { p.to_path_buf() } else { base.join(p) };
    let mut out = PathBuf::new();
    for c in joined.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() || out.as_os_str().is_empty() {
                    return None;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

/// Convert a simple shell glob pattern to a [`Regex`].
/// Only `*` (match anything) and `?` (match one char) are supported.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Allowlist;
    use serde_json::json;

    const SHELL: Option<ToolPermission> = Some(ToolPermission::Command { arg: "command" });
    const READ: Option<ToolPermission> = Some(ToolPermission::ExternalPath { arg: "path" });

    fn policy_with(auto: &[&str], deny: &[&str]) -> PermissionPolicy {
        let mut cfg = Config::default();
        cfg.tools.auto_approve_patterns = auto.iter().map(|s| s.to_string()).collect();
        cfg.tools.deny_patterns = deny.iter().map(|s| s.to_string()).collect();
        cfg.tools.safe_dirs = vec![PathBuf::from("/srv/shared")];
        PermissionPolicy::from_config(&cfg, Path::new("/work/project"))
    }

    fn ctx(yolo: bool) -> AgentContext {
        AgentContext {
            agent_name: "main".into(),
            allowlist: Allowlist::All,
            max_turns: 5,
            hooks_enabled: true,
            yolo,
        }
    }

    fn shell(p: &PermissionPolicy, cmd: &str, yolo: bool) -> PermissionDecision {
        p.decide("shell", SHELL, &json!({ "command": cmd }), &ctx(yolo))
    }

    // ── Command patterns ──────────────────────────────────────────────────────

    #[test]
    fn deny_beats_auto_for_same_pattern() {
        let p = policy_with(&["rm *"], &["rm *"]);
        assert!(matches!(shell(&p, "rm /tmp/foo", false), PermissionDecision::Deny { .. }));
    }

    #[test]
    fn auto_approve_wildcard_prefix() {
        let p = policy_with(&["cat *"], &[]);
        assert_eq!(shell(&p, "cat /etc/hosts", false), PermissionDecision::AutoApprove);
    }

    #[test]
    fn question_mark_matches_one_char() {
        let p = policy_with(&["ls ?"], &[]);
        assert_eq!(shell(&p, "ls -", false), PermissionDecision::AutoApprove);
        assert_ne!(shell(&p, "ls --", false), PermissionDecision::AutoApprove);
    }

    #[test]
    fn unmatched_command_asks_with_command_as_detail() {
        let p = policy_with(&["cat *"], &["rm -rf /*"]);
        assert_eq!(
            shell(&p, "git commit -m test", false),
            PermissionDecision::Confirm { detail: "git commit -m test".into() }
        );
    }

    // ── YOLO ──────────────────────────────────────────────────────────────────

    #[test]
    fn yolo_downgrades_confirm_only() {
        let p = policy_with(&[], &["rm -rf /*"]);
        assert_eq!(shell(&p, "cargo build", true), PermissionDecision::AutoApprove);
        assert!(matches!(shell(&p, "rm -rf /*", true), PermissionDecision::Deny { .. }));
    }

    #[test]
    fn yolo_never_bypasses_allowlist() {
        let p = policy_with(&[], &[]);
        let mut c = ctx(true);
        c.allowlist = Allowlist::only(["read_file"]);
        let d = p.decide("shell", SHELL, &json!({ "command": "ls" }), &c);
        assert!(matches!(d, PermissionDecision::Deny { .. }));
    }

    #[test]
    fn unknown_tool_asks() {
        let p = policy_with(&[], &[]);
        assert!(matches!(
            p.decide("mystery", None, &json!({}), &ctx(false)),
            PermissionDecision::Confirm { .. }
        ));
    }

    #[test]
    fn never_rule_is_auto() {
        let p = policy_with(&[], &[]);
        let d = p.decide("list_dir", Some(ToolPermission::Never), &json!({}), &ctx(false));
        assert_eq!(d, PermissionDecision::AutoApprove);
    }

    // ── External paths ────────────────────────────────────────────────────────

    fn read(p: &PermissionPolicy, path: &str) -> PermissionDecision {
        p.decide("read_file", READ, &json!({ "path": path }), &ctx(false))
    }

    #[test]
    fn paths_inside_cwd_are_auto() {
        let p = policy_with(&[], &[]);
        assert_eq!(read(&p, "src/main.rs"), PermissionDecision::AutoApprove);
        assert_eq!(read(&p, "/work/project/Cargo.toml"), PermissionDecision::AutoApprove);
    }

    #[test]
    fn managed_and_configured_dirs_are_safe() {
        let p = policy_with(&[], &[]);
        assert_eq!(read(&p, ".meto/plans/plan-1.md"), PermissionDecision::AutoApprove);
        assert_eq!(read(&p, "/srv/shared/notes.txt"), PermissionDecision::AutoApprove);
    }

    #[test]
    fn paths_outside_safe_roots_ask() {
        let p = policy_with(&[], &[]);
        assert!(matches!(read(&p, "/etc/passwd"), PermissionDecision::Confirm { .. }));
        assert!(matches!(read(&p, "../other/secret"), PermissionDecision::Confirm { .. }));
    }

    #[test]
    fn escaping_above_root_fails_closed() {
        let p = policy_with(&[], &[]);
        assert!(matches!(read(&p, "../../../../x"), PermissionDecision::Confirm { .. }));
    }

    #[cfg(unix)]
    mod symlinks {
        use super::*;
        use std::os::unix::fs::symlink;
        use tempfile::TempDir;

        fn policy_in(cwd: &Path) -> PermissionPolicy {
            PermissionPolicy::from_config(&Config::default(), cwd)
        }

        #[test]
        fn symlink_out_of_cwd_asks() {
            let work = TempDir::new().unwrap();
            let outside = TempDir::new().unwrap();
            std::fs::write(outside.path().join("secret"), "x").unwrap();
            symlink(outside.path(), work.path().join("link")).unwrap();

            let p = policy_in(work.path());
            let through_link = work.path().join("link/secret");
            assert!(matches!(read(&p, through_link.to_str().unwrap()), PermissionDecision::Confirm { .. }));
            assert!(matches!(read(&p, "link/not-yet-created"), PermissionDecision::Confirm { .. }));
        }

        #[test]
        fn symlink_to_etc_asks() {
            let work = TempDir::new().unwrap();
            symlink("/etc", work.path().join("link")).unwrap();
            let p = policy_in(work.path());
            assert!(matches!(read(&p, "link/passwd"), PermissionDecision::Confirm { .. }));
        }

        #[test]
        fn symlink_within_cwd_is_auto() {
            let work = TempDir::new().unwrap();
            std::fs::create_dir(work.path().join("real")).unwrap();
            symlink(work.path().join("real"), work.path().join("alias")).unwrap();
            let p = policy_in(work.path());
            assert_eq!(read(&p, "alias/new-file.txt"), PermissionDecision::AutoApprove);
        }

        #[test]
        fn dangling_symlink_fails_closed() {
            let work = TempDir::new().unwrap();
            symlink("/nonexistent-meto-target/file", work.path().join("dangling")).unwrap();
            let p = policy_in(work.path());
            assert!(matches!(read(&p, "dangling"), PermissionDecision::Confirm { .. }));
        }

        #[test]
        fn cwd_reached_through_a_symlink_is_still_safe() {
            let real = TempDir::new().unwrap();
            let links = TempDir::new().unwrap();
            let via = links.path().join("project");
            symlink(real.path(), &via).unwrap();
            let p = policy_in(&via);
            assert_eq!(read(&p, "notes.md"), PermissionDecision::AutoApprove);
            let absolute = real.path().join("notes.md");
            assert_eq!(read(&p, absolute.to_str().unwrap()), PermissionDecision::AutoApprove);
        }
    }

    #[test]
    fn empty_path_is_not_prompted() {
        let p = policy_with(&[], &[]);
        assert_eq!(read(&p, ""), PermissionDecision::AutoApprove);
    }
}
