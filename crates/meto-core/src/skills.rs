// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Skills: reusable instructions the agent loads on demand.
//!
//! Each skill is a directory under the skills dir containing `SKILL.md`:
//!
//! ```text
//! .meto/skills/
//! └── release/
//!     ├── SKILL.md          ← name + description front-matter, body = instructions
//!     └── checklist.md      ← listed under "Available Resources"
//! ```
//!
//! Only the front-matter is read at startup.  The body is read the first
//! time `load_skill` asks for it and cached in the session.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use meto_tools::{required_str, Tool, ToolCall, ToolOutput, ToolPermission};

use crate::frontmatter;
use crate::session::SkillCache;

const SKILL_FILE: &str = "SKILL.md";
const MAX_RESOURCES: usize = 50;

#[derive(Debug, Default, Deserialize)]
struct SkillFrontmatter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillInfo {
    pub name: String,
    pub description: String,
    pub dir: PathBuf,
}

impl SkillInfo {
    pub fn skill_md(&self) -> PathBuf {
        self.dir.join(SKILL_FILE)
    }
}

/// Skill metadata discovered at startup.
#[derive(Debug, Clone, Default)]
pub struct SkillRegistry {
    skills: BTreeMap<String, SkillInfo>,
}

impl SkillRegistry {
    pub fn load(dir: &Path) -> Self {
        let mut skills = BTreeMap::new();
        let Ok(rd) = std::fs::read_dir(dir) else {
            debug!(dir = %dir.display(), "no skills directory");
            return Self { skills };
        };
        let mut dirs: Vec<PathBuf> = rd.flatten().map(|e| e.path()).filter(|p| p.join(SKILL_FILE).is_file()).collect();
        dirs.sort();
        for skill_dir in dirs {
            match read_meta(&skill_dir) {
                Ok(info) => {
                    debug!(skill = %info.name, "discovered skill");
                    skills.insert(info.name.clone(), info);
                }
                Err(e) => warn!(path = %skill_dir.display(), error = %e, "skipping invalid skill"),
            }
        }
        Self { skills }
    }

    pub fn get(&self, name: &str) -> Option<&SkillInfo> {
        self.skills.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SkillInfo> {
        self.skills.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.skills.keys().cloned().collect()
    }

    /// Full skill text: the body of `SKILL.md` followed by the list of the
    /// other files in the skill directory.
    pub fn read_content(&self, name: &str) -> anyhow::Result<String> {
        let info = self.get(name).with_context(|| format!("unknown skill '{name}'"))?;
        let raw = std::fs::read_to_string(info.skill_md())
            .with_context(|| format!("reading {}", info.skill_md().display()))?;
        let (_, body): (SkillFrontmatter, &str) = frontmatter::parse(&raw)?;
        let mut content = body.trim().to_string();

        let resources = list_resources(&info.dir);
        if !resources.is_empty() {
            content.push_str("\n\n## Available Resources\n\n");
            content.push_str(&format!("Base directory: {}\n", info.dir.display()));
            for r in &resources {
                content.push_str(&format!("- {r}\n"));
            }
        }
        Ok(content)
    }
}

fn read_meta(skill_dir: &Path) -> anyhow::Result<SkillInfo> {
    let path = skill_dir.join(SKILL_FILE);
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let (fm, body): (SkillFrontmatter, &str) = frontmatter::parse(&raw)?;
    let dir_name = skill_dir
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = fm.name.filter(|n| !n.trim().is_empty()).unwrap_or(dir_name);
    let description = fm.description.unwrap_or_else(|| frontmatter::first_line(body));
    Ok(SkillInfo { name, description, dir: skill_dir.to_path_buf() })
}

/// Files next to `SKILL.md`, relative to the skill dir, sorted.
fn list_resources(dir: &Path) -> Vec<String> {
    walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(3)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(dir).ok().map(|p| p.to_string_lossy().to_string()))
        .filter(|rel| rel != SKILL_FILE)
        .take(MAX_RESOURCES)
        .collect()
}

/// `load_skill` tool.  Reads through the session's skill cache.
pub struct LoadSkillTool {
    skills: Arc<SkillRegistry>,
    cache: SkillCache,
}

impl LoadSkillTool {
    pub fn new(skills: Arc<SkillRegistry>, cache: SkillCache) -> Self {
        Self { skills, cache }
    }
}

#[async_trait]
impl Tool for LoadSkillTool {
    fn name(&self) -> &str {
        "load_skill"
    }

    fn description(&self) -> &str {
        "Load the full instructions of a skill listed in the system prompt. \
         Call this before starting a task that matches a skill's description."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Skill name as listed under Skills"
                }
            },
            "required": ["name"]
        })
    }

    fn permission(&self) -> ToolPermission {
        ToolPermission::Never
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let name = match required_str(call, "name") {
            Ok(n) => n,
            Err(out) => return out,
        };
        if self.skills.get(name).is_none() {
            let available = self.skills.names().join(", ");
            return ToolOutput::err(&call.id, format!("Unknown skill '{name}'. Available skills: {available}"));
        }

        let cached = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(name).cloned();
        let content = match cached {
            Some(c) => c,
            None => match self.skills.read_content(name) {
                Ok(c) => {
                    debug!(skill = %name, bytes = c.len(), "skill loaded");
                    self.cache
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(name.to_string(), c.clone());
                    c
                }
                Err(e) => return ToolOutput::err(&call.id, format!("cannot load skill '{name}': {e:#}")),
            },
        };
        ToolOutput::ok(&call.id, format!("<skill-loaded name=\"{name}\">\n{content}\n</skill-loaded>"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let skill = dir.path().join("release");
        std::fs::create_dir_all(skill.join("scripts")).unwrap();
        std::fs::write(
            skill.join("SKILL.md"),
            "---\nname: release\ndescription: Cut a release. Use when asked to publish.\n---\n\n# Release\n\nBump the version.\n",
        )
        .unwrap();
        std::fs::write(skill.join("checklist.md"), "- tag\n").unwrap();
        std::fs::write(skill.join("scripts/bump.sh"), "#!/bin/sh\n").unwrap();
        std::fs::create_dir_all(dir.path().join("not-a-skill")).unwrap();
        dir
    }

    #[test]
    fn discovers_metadata_only() {
        let dir = fixture();
        let reg = SkillRegistry::load(dir.path());
        assert_eq!(reg.names(), vec!["release"]);
        assert_eq!(reg.get("release").unwrap().description, "Cut a release. Use when asked to publish.");
    }

    #[test]
    fn content_lists_resources() {
        let dir = fixture();
        let reg = SkillRegistry::load(dir.path());
        let content = reg.read_content("release").unwrap();
        assert!(content.starts_with("# Release"));
        assert!(content.contains("## Available Resources"));
        assert!(content.contains("- checklist.md"));
        assert!(content.contains("- scripts/bump.sh"));
        assert!(!content.contains("- SKILL.md"));
    }

    #[tokio::test]
    async fn tool_wraps_and_caches() {
        let dir = fixture();
        let reg = Arc::new(SkillRegistry::load(dir.path()));
        let cache = SkillCache::default();
        let tool = LoadSkillTool::new(reg, cache.clone());
        let call = ToolCall { id: "s1".into(), name: "load_skill".into(), args: json!({"name": "release"}) };

        let out = tool.execute(&call).await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.starts_with("<skill-loaded name=\"release\">\n# Release"));
        assert!(out.content.ends_with("</skill-loaded>"));

        // Cached copy wins even after the file changes.
        std::fs::write(dir.path().join("release/SKILL.md"), "changed").unwrap();
        let again = tool.execute(&call).await;
        assert_eq!(again.content, out.content);
        assert!(cache.lock().unwrap().contains_key("release"));
    }

    #[tokio::test]
    async fn unknown_skill_lists_available() {
        let dir = fixture();
        let tool = LoadSkillTool::new(Arc::new(SkillRegistry::load(dir.path())), SkillCache::default());
        let call = ToolCall { id: "s1".into(), name: "load_skill".into(), args: json!({"name": "nope"}) };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("Available skills: release"));
    }
}
