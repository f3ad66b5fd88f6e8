// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeSet;

use meto_config::Config;

/// The set of tool names an agent may invoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allowlist {
    All,
    Only(BTreeSet<String>),
}

impl Allowlist {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Allowlist::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, name: &str) -> bool {
        match self {
            Allowlist::All => true,
            Allowlist::Only(set) => set.contains(name),
        }
    }

    /// Names allowed by both lists.  A subagent can never widen what its
    /// caller is allowed to do.
    pub fn intersect(&self, other: &Allowlist) -> Allowlist {
        match (self, other) {
            (Allowlist::All, o) => o.clone(),
            (s, Allowlist::All) => s.clone(),
            (Allowlist::Only(a), Allowlist::Only(b)) => {
                Allowlist::Only(a.intersection(b).cloned().collect())
            }
        }
    }
}

impl std::fmt::Display for Allowlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Allowlist::All => f.write_str("*"),
            Allowlist::Only(set) => {
                let names: Vec<&str> = set.iter().map(String::as_str).collect();
                f.write_str(&names.join(", "))
            }
        }
    }
}

/// Immutable per-run parameters of one agent loop.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub agent_name: String,
    pub allowlist: Allowlist,
    pub max_turns: u32,
    pub hooks_enabled: bool,
    pub yolo: bool,
}

impl AgentContext {
    /// Context of the top-level agent: every tool, hooks on.
    pub fn main(config: &Config) -> Self {
        Self {
            agent_name: "main".into(),
            allowlist: Allowlist::All,
            max_turns: config.agent.main_max_turns,
            hooks_enabled: true,
            yolo: config.agent.yolo,
        }
    }

    /// Context for a nested loop spawned by this one.  The allowlist is the
    /// intersection with `restricted`; hooks are off; yolo is inherited.
    pub fn subagent(&self, agent_name: impl Into<String>, restricted: &Allowlist, max_turns: u32) -> Self {
        Self {
            agent_name: agent_name.into(),
            allowlist: self.allowlist.intersect(restricted),
            max_turns,
            hooks_enabled: false,
            yolo: self.yolo,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
