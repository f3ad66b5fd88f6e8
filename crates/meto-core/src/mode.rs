// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use tracing::{debug, info};

use crate::session::Session;

const PLAN_PREFIX: &str = "[PLAN] >>> ";

/// What a mode leaves behind when it is exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeExitResult {
    pub artifact_path: Option<PathBuf>,
    pub artifact_content: Option<String>,
    /// Message to send to the agent next, if any.
    pub followup: Option<String>,
}

/// Plan mode: the agent writes a plan to a file before doing any work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanMode {
    plan_path: PathBuf,
}

impl PlanMode {
    /// The plan file is `plan-<timestamp>-<suffix>.md` inside `plan_dir`.
    pub fn new(plan_dir: &Path) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("plan-{}-{}.md", Local::now().format("%Y%m%d_%H%M%S"), &suffix[..6]);
        Self { plan_path: plan_dir.join(name) }
    }

    pub fn plan_path(&self) -> &Path {
        &self.plan_path
    }

    fn prompt_fragment(&self) -> String {
        format!(
            "----- PLAN MODE ACTIVE -----\n\
             You are in planning mode. Do not modify project files.\n\
             Investigate with read-only tools, then write a step-by-step plan to:\n\
             {}\n\
             Use write_file for the plan file only. Each step should name the files \
             involved and how to verify it.\n\
             ----- END PLAN MODE -----",
            self.plan_path.display()
        )
    }

    fn on_enter(&self, session_id: &str) -> anyhow::Result<()> {
        if let Some(dir) = self.plan_path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let heading = format!(
            "# Plan\n\n<!-- session {session_id}, started {} -->\n\n",
            Local::now().format("%Y-%m-%d %H:%M")
        );
        std::fs::write(&self.plan_path, heading)
            .with_context(|| format!("creating plan file {}", self.plan_path.display()))?;
        info!(path = %self.plan_path.display(), "plan mode entered");
        Ok(())
    }

    fn on_exit(&self) -> anyhow::Result<ModeExitResult> {
        let content = match std::fs::read_to_string(&self.plan_path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!("reading plan file {}", self.plan_path.display())))
            }
        };
        let has_plan = content
            .lines()
            .any(|l| !l.trim().is_empty() && !l.starts_with("# Plan") && !l.starts_with("<!--"));
        let followup = has_plan.then(|| {
            format!(
                "Planning is finished. FOLLOW THE PLAN stored in: {}\n\
                 Work through it step by step and track progress with manage_todos.",
                self.plan_path.display()
            )
        });
        debug!(path = %self.plan_path.display(), has_plan, "plan mode exited");
        Ok(ModeExitResult {
            artifact_path: Some(self.plan_path.clone()),
            artifact_content: has_plan.then_some(content),
            followup,
        })
    }
}

/// Optional behaviour attached to a session.  At most one is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Plan(PlanMode),
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Plan(_) => "plan",
        }
    }

    /// Extra system-prompt text while the mode is active.
    pub fn prompt_fragment(&self) -> String {
        match self {
            Mode::Plan(p) => p.prompt_fragment(),
        }
    }

    /// Prefix shown before interactive input.
    pub fn prompt_prefix(&self) -> &'static str {
        match self {
            Mode::Plan(_) => PLAN_PREFIX,
        }
    }

    pub fn on_enter(&self, session: &Session) -> anyhow::Result<()> {
        match self {
            Mode::Plan(p) => p.on_enter(&session.id),
        }
    }

    pub fn on_exit(&self, _session: &Session) -> anyhow::Result<ModeExitResult> {
        match self {
            Mode::Plan(p) => p.on_exit(),
        }
    }
}

/// Switches the mode of a session, running the enter/exit hooks.
pub struct ModeController;

impl ModeController {
    /// Activate `mode`.  A mode that is already active is exited first and
    /// its result returned.
    pub fn enter(session: &mut Session, mode: Mode) -> anyhow::Result<Option<ModeExitResult>> {
        let previous = Self::exit(session)?;
        mode.on_enter(session)?;
        *session.mode_mut() = Some(mode);
        Ok(previous)
    }

    /// Deactivate the current mode, if any.
    pub fn exit(session: &mut Session) -> anyhow::Result<Option<ModeExitResult>> {
        let Some(mode) = session.mode_mut().take() else {
            return Ok(None);
        };
        mode.on_exit(session).map(Some)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_file_name_and_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let mode = Mode::Plan(PlanMode::new(dir.path()));
        assert_eq!(mode.prompt_prefix(), "[PLAN] >>> ");
        let Mode::Plan(p) = &mode;
        let name = p.plan_path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("plan-") && name.ends_with(".md"), "{name}");
        assert!(mode.prompt_fragment().contains(&p.plan_path().display().to_string()));
    }

    #[test]
    fn enter_creates_plan_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::ephemeral();
        let plan = PlanMode::new(&dir.path().join("plans"));
        let path = plan.plan_path().to_path_buf();
        assert!(ModeController::enter(&mut session, Mode::Plan(plan)).unwrap().is_none());
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("# Plan"));
        assert_eq!(session.mode().map(Mode::name), Some("plan"));
    }

    #[test]
    fn exit_with_empty_plan_has_no_followup() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::ephemeral();
        ModeController::enter(&mut session, Mode::Plan(PlanMode::new(dir.path()))).unwrap();
        let result = ModeController::exit(&mut session).unwrap().unwrap();
        assert!(result.followup.is_none());
        assert!(result.artifact_content.is_none());
        assert!(session.mode().is_none());
    }

    #[test]
    fn exit_with_written_plan_asks_to_follow_it() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::ephemeral();
        let plan = PlanMode::new(dir.path());
        let path = plan.plan_path().to_path_buf();
        ModeController::enter(&mut session, Mode::Plan(plan)).unwrap();
        std::fs::write(&path, "# Plan\n\n1. Add parser\n2. Test it\n").unwrap();

        let result = ModeController::exit(&mut session).unwrap().unwrap();
        assert!(result.artifact_content.unwrap().contains("Add parser"));
        let followup = result.followup.unwrap();
        assert!(followup.contains("FOLLOW THE PLAN"));
        assert!(followup.contains(&path.display().to_string()));
    }

    #[test]
    fn entering_again_exits_previous_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::ephemeral();
        let first = PlanMode::new(dir.path());
        let first_path = first.plan_path().to_path_buf();
        ModeController::enter(&mut session, Mode::Plan(first)).unwrap();
        std::fs::write(&first_path, "# Plan\n\nstep\n").unwrap();

        let previous = ModeController::enter(&mut session, Mode::Plan(PlanMode::new(dir.path())))
            .unwrap()
            .unwrap();
        assert_eq!(previous.artifact_path.as_deref(), Some(first_path.as_path()));
        assert!(session.mode().is_some());
    }

    #[test]
    fn exit_without_mode_is_none() {
        let mut session = Session::ephemeral();
        assert!(ModeController::exit(&mut session).unwrap().is_none());
    }
}
