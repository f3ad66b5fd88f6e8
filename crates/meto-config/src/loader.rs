// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::{apply_env_overrides, Config};

/// Ordered list of settings file locations searched from lowest to highest
/// priority.  Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("meto/config.toml"));
    }

    // Project-local
    paths.push(PathBuf::from(".meto/config.toml"));
    paths.push(PathBuf::from("meto.toml"));

    paths
}

/// Load configuration from settings files and the process environment.
/// `extra` is an explicit settings file (the `--config` CLI flag) applied
/// after the discovered ones.
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    load_with_env(extra, std::env::vars())
}

/// Like [`load`] but with an explicit set of environment variables.
pub fn load_with_env<I>(extra: Option<&Path>, vars: I) -> anyhow::Result<Config>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut merged = toml::Value::Table(toml::map::Map::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            merge_toml(&mut merged, read_layer(&path)?);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        merge_toml(&mut merged, read_layer(p)?);
    }

    let mut config: Config = merged.try_into().context("invalid configuration")?;
    apply_env_overrides(&mut config, vars)?;
    config.expand_paths();
    config.validate()?;
    Ok(config)
}

fn read_layer(path: &Path) -> anyhow::Result<toml::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_toml(dst: &mut toml::Value, src: toml::Value) {
    match (dst, src) {
        (toml::Value::Table(d), toml::Value::Table(s)) => {
            for (k, v) in s {
                let entry = d.entry(k).or_insert(toml::Value::Table(toml::map::Map::new()));
                merge_toml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProviderKind;
    use std::io::Write;

    fn val(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    fn no_env() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val(r#"x = 1"#);
        merge_toml(&mut dst, val(r#"x = 2"#));
        assert_eq!(dst["x"].as_integer(), Some(2));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst = val(r#"[model]
provider = "openai"
name = "gpt-4.1""#);
        merge_toml(&mut dst, val(r#"[model]
name = "gpt-4.1-mini""#));
        assert_eq!(dst["model"]["provider"].as_str(), Some("openai"));
        assert_eq!(dst["model"]["name"].as_str(), Some("gpt-4.1-mini"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = load_with_env(Some(Path::new("/tmp/meto_nonexistent_config_xyz.toml")), no_env());
        assert!(result.is_err());
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, r#"[model]
provider = "mock"
name = "test-model"

[agent]
main_max_turns = 4"#).unwrap();
        let cfg = load_with_env(Some(f.path()), no_env()).unwrap();
        assert_eq!(cfg.model.provider, ProviderKind::Mock);
        assert_eq!(cfg.model.name, "test-model");
        assert_eq!(cfg.agent.main_max_turns, 4);
    }

    #[test]
    fn environment_wins_over_settings_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, r#"[tools]
timeout_secs = 10"#).unwrap();
        let env = vec![("METO_TOOL_TIMEOUT_SECONDS".to_string(), "3".to_string())];
        let cfg = load_with_env(Some(f.path()), env).unwrap();
        assert_eq!(cfg.tools.timeout_secs, 3);
    }

    #[test]
    fn invalid_values_fail_validation() {
        let env = vec![("METO_MAIN_AGENT_MAX_TURNS".to_string(), "0".to_string())];
        assert!(load_with_env(None, env).is_err());
    }
}
