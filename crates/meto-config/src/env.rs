// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `METO_*` environment overrides.
//!
//! Applied on top of the merged settings files.  Variable names are matched
//! case-insensitively; a value that cannot be parsed is a configuration
//! error naming the variable rather than a silent fallback.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use tracing::debug;

use crate::{Config, ProviderKind};

/// Prefix shared by every recognised variable.
pub const ENV_PREFIX: &str = "METO_";

/// Overlay every recognised `METO_*` variable in `vars` onto `config`.
///
/// Unrecognised `METO_*` names are ignored with a debug log so that hook
/// variables such as `METO_HOOK_EVENT` can share the namespace.
pub fn apply_env_overrides<I>(config: &mut Config, vars: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (raw_key, value) in vars {
        let key = raw_key.to_ascii_uppercase();
        let Some(name) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        match name {
            "LLM_API_KEY" => config.model.api_key = non_empty(value),
            "LLM_BASE_URL" => config.model.base_url = value,
            "DEFAULT_MODEL" => config.model.name = value,
            "MODEL_PROVIDER" => config.model.provider = parse::<ProviderKind>(&key, &value)?,
            "MODEL_TIMEOUT_SECONDS" => config.model.timeout_secs = parse(&key, &value)?,
            "TOOL_TIMEOUT_SECONDS" => config.tools.timeout_secs = parse(&key, &value)?,
            "MAX_TOOL_OUTPUT_CHARS" => config.tools.max_output_chars = parse(&key, &value)?,
            "MAIN_AGENT_MAX_TURNS" => config.agent.main_max_turns = parse(&key, &value)?,
            "SUBAGENT_MAX_TURNS" => config.agent.subagent_max_turns = parse(&key, &value)?,
            "YOLO" => config.agent.yolo = parse_bool(&key, &value)?,
            "SAFE_DIRS" => {
                config.tools.safe_dirs = value
                    .split(':')
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| PathBuf::from(s.trim()))
                    .collect();
            }
            "SESSION_DIR" => config.paths.session_dir = PathBuf::from(value),
            "AGENTS_DIR" => config.paths.agents_dir = PathBuf::from(value),
            "COMMANDS_DIR" => config.paths.commands_dir = PathBuf::from(value),
            "SKILLS_DIR" => config.paths.skills_dir = PathBuf::from(value),
            "PLAN_DIR" => config.paths.plan_dir = PathBuf::from(value),
            "HOOKS_FILE" => config.paths.hooks_file = PathBuf::from(value),
            _ => {
                debug!(var = %raw_key, "ignoring unrecognised environment variable");
                continue;
            }
        }
        debug!(var = %key, "applied environment override");
    }
    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("invalid value {value:?} for {key}"))
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("invalid value {other:?} for {key} (expected true or false)"),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn numeric_overrides_are_applied() {
        let mut c = Config::default();
        apply_env_overrides(
            &mut c,
            vars(&[
                ("METO_TOOL_TIMEOUT_SECONDS", "7"),
                ("METO_MAX_TOOL_OUTPUT_CHARS", "1234"),
                ("METO_MAIN_AGENT_MAX_TURNS", "3"),
                ("METO_SUBAGENT_MAX_TURNS", "2"),
            ]),
        )
        .unwrap();
        assert_eq!(c.tools.timeout_secs, 7);
        assert_eq!(c.tools.max_output_chars, 1234);
        assert_eq!(c.agent.main_max_turns, 3);
        assert_eq!(c.agent.subagent_max_turns, 2);
    }

    #[test]
    fn names_are_case_insensitive() {
        let mut c = Config::default();
        apply_env_overrides(&mut c, vars(&[("meto_default_model", "small-model")])).unwrap();
        assert_eq!(c.model.name, "small-model");
    }

    #[test]
    fn unrelated_variables_are_ignored() {
        let mut c = Config::default();
        apply_env_overrides(
            &mut c,
            vars(&[("PATH", "/usr/bin"), ("METO_HOOK_EVENT", "pre_tool_use")]),
        )
        .unwrap();
        assert_eq!(c.model.name, "gpt-4.1");
    }

    #[test]
    fn unparsable_number_names_the_variable() {
        let mut c = Config::default();
        let err = apply_env_overrides(&mut c, vars(&[("METO_TOOL_TIMEOUT_SECONDS", "soon")]))
            .unwrap_err();
        assert!(format!("{err:#}").contains("METO_TOOL_TIMEOUT_SECONDS"));
    }

    #[test]
    fn yolo_accepts_common_spellings() {
        for v in ["1", "true", "YES", "on"] {
            let mut c = Config::default();
            apply_env_overrides(&mut c, vars(&[("METO_YOLO", v)])).unwrap();
            assert!(c.agent.yolo, "{v} should enable yolo");
        }
        let mut c = Config::default();
        assert!(apply_env_overrides(&mut c, vars(&[("METO_YOLO", "maybe")])).is_err());
    }

    #[test]
    fn safe_dirs_split_on_colon() {
        let mut c = Config::default();
        apply_env_overrides(&mut c, vars(&[("METO_SAFE_DIRS", "/tmp/a::/tmp/b")])).unwrap();
        assert_eq!(c.tools.safe_dirs, vec![PathBuf::from("/tmp/a"), PathBuf::from("/tmp/b")]);
    }

    #[test]
    fn empty_api_key_clears_key() {
        let mut c = Config::default();
        c.model.api_key = Some("from-file".into());
        apply_env_overrides(&mut c, vars(&[("METO_LLM_API_KEY", " ")])).unwrap();
        assert!(c.model.api_key.is_none());
    }
}
