// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::io::{self, BufRead, Write};

use async_trait::async_trait;

use meto_tools::{ConfirmRequest, UserInteraction};

/// Prompts on stderr and reads the answer from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalInteraction;

/// Read one line from stdin off the async runtime.  `None` on EOF or error.
pub(crate) async fn read_line(prompt: String) -> Option<String> {
    tokio::task::spawn_blocking(move || {
        eprint!("{prompt}");
        let _ = io::stderr().flush();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    })
    .await
    .ok()
    .flatten()
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Map a typed answer onto the offered options: a 1-based number picks
/// that option, anything else is taken verbatim.
fn pick_option(answer: &str, options: &[String]) -> String {
    answer
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| options.get(i))
        .cloned()
        .unwrap_or_else(|| answer.to_string())
}

#[async_trait]
impl UserInteraction for TerminalInteraction {
    async fn confirm(&self, req: &ConfirmRequest) -> bool {
        let prompt = format!(
            "\n[meto:confirm] {} wants to run {}\n  {}\nAllow? [y/N] ",
            req.agent_name, req.tool_name, req.detail
        );
        read_line(prompt).await.is_some_and(|a| is_yes(&a))
    }

    async fn ask(&self, question: &str, options: &[String]) -> Option<String> {
        let mut prompt = format!("\n[meto:question] {question}\n");
        for (i, opt) in options.iter().enumerate() {
            prompt.push_str(&format!("  {}. {opt}\n", i + 1));
        }
        prompt.push_str("> ");
        let answer = read_line(prompt).await?;
        if answer.is_empty() {
            return None;
        }
        Some(pick_option(&answer, options))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_answers() {
        assert!(is_yes("y"));
        assert!(is_yes("YES"));
        assert!(!is_yes(""));
        assert!(!is_yes("nope"));
    }

    #[test]
    fn numbered_answers_pick_options() {
        let opts = vec!["red".to_string(), "blue".to_string()];
        assert_eq!(pick_option("2", &opts), "blue");
        assert_eq!(pick_option("0", &opts), "0");
        assert_eq!(pick_option("9", &opts), "9");
        assert_eq!(pick_option("green", &opts), "green");
    }
}
