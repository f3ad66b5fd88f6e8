// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, info};

use meto_model::{CompletionRequest, Message, ModelCallError, ModelProvider, ResponseEvent, Role};

use crate::Session;

// ─── Compaction prompt ────────────────────────────────────────────────────────

const SUMMARIZE_PROMPT: &str = "Summarize the following conversation concisely. \
     Preserve key context, decisions, file names and technical details. \
     Output as a single paragraph.";

/// Prefix of the message that replaces a compacted history.
pub const SUMMARY_PREFIX: &str = "[Previous conversation summary]: ";

const SUMMARY_UNAVAILABLE: &str = "Conversation summary unavailable.";

/// Size of the history before and after a compaction, in chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactReport {
    pub before_chars: usize,
    pub after_chars: usize,
}

/// User and assistant text as `role: content` lines.  Tool traffic is left
/// out; its effect shows in the assistant turns around it.
pub fn serialize_history(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant))
        .filter_map(|m| m.as_text().map(|t| format!("{}: {t}", m.role.as_str())))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ask `model` for a one-paragraph summary of `history_text`.
pub async fn summarize(
    model: &dyn ModelProvider,
    history_text: &str,
    timeout: Duration,
) -> Result<String, ModelCallError> {
    let req = CompletionRequest {
        system_prompt: SUMMARIZE_PROMPT.to_string(),
        messages: vec![Message::user(history_text)],
        tools: Vec::new(),
    };
    let collect = async {
        let mut stream = model.complete(req).await?;
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event? {
                ResponseEvent::TextDelta(delta) => text.push_str(&delta),
                ResponseEvent::Done => break,
                _ => {}
            }
        }
        Ok::<_, ModelCallError>(text)
    };
    let text = tokio::time::timeout(timeout, collect)
        .await
        .map_err(|_| ModelCallError::Timeout(timeout.as_secs()))??;
    let text = text.trim();
    Ok(if text.is_empty() { SUMMARY_UNAVAILABLE.to_string() } else { text.to_string() })
}

/// Replace the history of `session` with a single summary message under a
/// new session id.  `None` when there is nothing to compact.
///
/// A failed model call leaves the session untouched.
pub async fn compact_session(
    session: &mut Session,
    model: &dyn ModelProvider,
    timeout: Duration,
) -> anyhow::Result<Option<CompactReport>> {
    let history_text = serialize_history(session.messages());
    if history_text.is_empty() {
        debug!(session_id = %session.id, "nothing to compact");
        return Ok(None);
    }

    let summary = summarize(model, &history_text, timeout).await?;
    let previous = session.id.clone();
    session.renew()?;
    session.append(Message::user(format!("{SUMMARY_PREFIX}{summary}")))?;

    let report = CompactReport { before_chars: history_text.chars().count(), after_chars: summary.chars().count() };
    info!(
        from = %previous,
        to = %session.id,
        before = report.before_chars,
        after = report.after_chars,
        "history compacted"
    );
    Ok(Some(report))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JsonlSessionLog;
    use meto_model::{Script, ScriptedMockProvider, ToolCallRequest};
    use serde_json::json;

    const T: Duration = Duration::from_secs(5);

    fn text_reply(text: &str) -> Script {
        Script::Events(vec![ResponseEvent::TextDelta(text.into()), ResponseEvent::Done])
    }

    fn seeded(dir: &std::path::Path) -> Session {
        let mut s = Session::create(dir).unwrap();
        s.append(Message::user("rename foo to bar")).unwrap();
        s.append(Message::assistant(
            "",
            vec![ToolCallRequest { id: "c1".into(), name: "shell".into(), arguments: json!({"command": "ls"}) }],
        ))
        .unwrap();
        s.append(Message::tool_result("c1", "foo.rs")).unwrap();
        s.append(Message::assistant("Renamed foo.rs to bar.rs.", vec![])).unwrap();
        s
    }

    #[test]
    fn history_text_skips_tool_traffic() {
        let dir = tempfile::tempdir().unwrap();
        let s = seeded(dir.path());
        assert_eq!(serialize_history(s.messages()), "user: rename foo to bar\nassistant: Renamed foo.rs to bar.rs.");
    }

    #[tokio::test]
    async fn compaction_replaces_history_under_new_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = seeded(dir.path());
        let old_id = s.id.clone();
        s.todos().lock().unwrap().create("leftover").unwrap();
        let model = ScriptedMockProvider::from_scripts(vec![text_reply("Renamed foo to bar.")]);

        let report = compact_session(&mut s, &model, T).await.unwrap().unwrap();

        assert_ne!(s.id, old_id);
        assert_eq!(s.messages(), &[Message::user("[Previous conversation summary]: Renamed foo to bar.")]);
        assert_eq!(report.after_chars, "Renamed foo to bar.".len());
        assert!(s.todos().lock().unwrap().items().is_empty());

        let req = model.last_request.lock().unwrap().clone().unwrap();
        assert!(req.tools.is_empty());
        assert!(req.messages[0].as_text().unwrap().contains("rename foo to bar"));

        let replayed = JsonlSessionLog::replay(s.log_path().unwrap()).unwrap();
        assert_eq!(replayed, s.messages());
    }

    #[tokio::test]
    async fn empty_history_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = Session::create(dir.path()).unwrap();
        let id = s.id.clone();
        let model = ScriptedMockProvider::new(vec![]);
        assert!(compact_session(&mut s, &model, T).await.unwrap().is_none());
        assert_eq!(s.id, id);
    }

    #[tokio::test]
    async fn failed_summary_keeps_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = seeded(dir.path());
        let id = s.id.clone();
        let model = ScriptedMockProvider::from_scripts(vec![Script::Fail("connection refused".into())]);
        assert!(compact_session(&mut s, &model, T).await.is_err());
        assert_eq!(s.id, id);
        assert_eq!(s.messages().len(), 4);
    }

    #[tokio::test]
    async fn blank_summary_gets_placeholder() {
        let model = ScriptedMockProvider::from_scripts(vec![text_reply("   ")]);
        assert_eq!(summarize(&model, "user: hi", T).await.unwrap(), SUMMARY_UNAVAILABLE);
    }
}
