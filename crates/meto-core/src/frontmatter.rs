// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::Context;
use serde::de::DeserializeOwned;

/// Split a markdown document into its YAML front-matter and body.
///
/// The front-matter must start on the first line with `---` and end with a
/// line that is exactly `---`.  Returns `None` when there is no such block.
pub(crate) fn split(raw: &str) -> Option<(&str, &str)> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let rest = raw.strip_prefix("---")?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;

    let (yaml, after) = if let Some(after) = rest.strip_prefix("---") {
        ("", after)
    } else {
        let end = rest.find("\n---")?;
        (&rest[..end], &rest[end + 4..])
    };
    // The closing fence must be a whole line.
    let body = if after.is_empty() {
        after
    } else if let Some(b) = after.strip_prefix("\r\n").or_else(|| after.strip_prefix('\n')) {
        b
    } else {
        return None;
    };
    Some((yaml, body))
}

/// Parse the front-matter of `raw` into `T`.  Documents without
/// front-matter yield `T::default()` and the whole text as body.
pub(crate) fn parse<T: DeserializeOwned + Default>(raw: &str) -> anyhow::Result<(T, &str)> {
    match split(raw) {
        None => Ok((T::default(), raw)),
        Some((yaml, body)) if yaml.trim().is_empty() => Ok((T::default(), body)),
        Some((yaml, body)) => {
            let meta = serde_yaml::from_str(yaml).context("invalid YAML front-matter")?;
            Ok((meta, body))
        }
    }
}

/// First non-empty line of `body`, without leading `#` markers.
pub(crate) fn first_line(body: &str) -> String {
    body.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.trim_start_matches('#').trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_yaml_and_body() {
        let (yaml, body) = split("---\nname: x\n---\nbody text\n").unwrap();
        assert_eq!(yaml, "name: x");
        assert_eq!(body, "body text\n");
    }

    #[test]
    fn no_front_matter() {
        assert!(split("# Title\ntext").is_none());
        assert!(split("---not a fence\n---\n").is_none());
    }

    #[test]
    fn empty_front_matter() {
        let (yaml, body) = split("---\n---\nbody").unwrap();
        assert_eq!(yaml, "");
        assert_eq!(body, "body");
    }

    #[test]
    fn unterminated_is_none() {
        assert!(split("---\nname: x\nbody").is_none());
    }

    #[test]
    fn first_line_strips_heading() {
        assert_eq!(first_line("\n\n## Review code\nmore"), "Review code");
    }
}
