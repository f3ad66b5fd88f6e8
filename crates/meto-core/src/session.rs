// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Conversation state and its append-only JSONL log.
//!
//! Every [`Session::append`] writes one line to
//! `<session_dir>/session-<id>.jsonl` before the message becomes visible in
//! memory, so the log is always at least as long as the in-memory history.
//! Each line is the message itself plus `timestamp` and `session_id`.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use meto_model::{Message, Role};

use crate::error::SessionLogError;
use crate::mode::Mode;
use crate::todo::{SharedTodos, TodoManager};

/// Per-session cache of loaded skill bodies, keyed by skill name.
pub type SkillCache = Arc<Mutex<HashMap<String, String>>>;

/// Durable sink for session messages.  One writer per session id.
pub trait SessionLog: Send + Sync {
    fn append(&mut self, session_id: &str, message: &Message) -> Result<(), SessionLogError>;

    /// Switch to a fresh log for `session_id`.
    fn reset(&mut self, session_id: &str) -> Result<(), SessionLogError>;

    fn path(&self) -> Option<&Path> {
        None
    }
}

/// Discards everything.  Used by subagents and tests.
#[derive(Debug, Default)]
pub struct NullSessionLog;

impl SessionLog for NullSessionLog {
    fn append(&mut self, _session_id: &str, _message: &Message) -> Result<(), SessionLogError> {
        Ok(())
    }

    fn reset(&mut self, _session_id: &str) -> Result<(), SessionLogError> {
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LogRecord {
    timestamp: DateTime<Utc>,
    session_id: String,
    #[serde(flatten)]
    message: Message,
}

/// `session-<id>.jsonl` in a directory.
#[derive(Debug)]
pub struct JsonlSessionLog {
    dir: PathBuf,
    path: PathBuf,
    file: File,
}

impl JsonlSessionLog {
    pub fn open(dir: &Path, session_id: &str) -> Result<Self, SessionLogError> {
        let path = log_path(dir, session_id);
        std::fs::create_dir_all(dir).map_err(|source| SessionLogError::Io { path: dir.to_path_buf(), source })?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SessionLogError::Io { path: path.clone(), source })?;
        debug!(path = %path.display(), "opened session log");
        Ok(Self { dir: dir.to_path_buf(), path, file })
    }

    /// Read every message of a log in order, stripping the metadata.
    pub fn replay(path: &Path) -> Result<Vec<Message>, SessionLogError> {
        let file = File::open(path).map_err(|source| SessionLogError::Io { path: path.to_path_buf(), source })?;
        let mut messages = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| SessionLogError::Io { path: path.to_path_buf(), source })?;
            if line.trim().is_empty() {
                continue;
            }
            let record: LogRecord = serde_json::from_str(&line).map_err(|source| SessionLogError::Corrupt {
                path: path.to_path_buf(),
                line: i + 1,
                source,
            })?;
            messages.push(record.message);
        }
        Ok(messages)
    }
}

impl SessionLog for JsonlSessionLog {
    fn append(&mut self, session_id: &str, message: &Message) -> Result<(), SessionLogError> {
        let record = LogRecord {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            message: message.clone(),
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(|source| SessionLogError::Io { path: self.path.clone(), source })
    }

    fn reset(&mut self, session_id: &str) -> Result<(), SessionLogError> {
        *self = Self::open(&self.dir.clone(), session_id)?;
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

fn log_path(dir: &Path, session_id: &str) -> PathBuf {
    dir.join(format!("session-{session_id}.jsonl"))
}

/// `YYYYmmdd_HHMMSS-xxxxxx`
pub fn new_session_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", Local::now().format("%Y%m%d_%H%M%S"), &suffix[..6])
}

/// The conversation owned by one agent loop.
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    history: Vec<Message>,
    todos: SharedTodos,
    skill_cache: SkillCache,
    mode: Option<Mode>,
    log: Box<dyn SessionLog>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("messages", &self.history.len())
            .field("mode", &self.mode.as_ref().map(Mode::name))
            .finish()
    }
}

impl Session {
    fn with_log(id: String, history: Vec<Message>, log: Box<dyn SessionLog>) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            history,
            todos: Arc::new(Mutex::new(TodoManager::new())),
            skill_cache: SkillCache::default(),
            mode: None,
            log,
        }
    }

    /// A new session persisted under `dir`.
    pub fn create(dir: &Path) -> Result<Self, SessionLogError> {
        let id = new_session_id();
        let log = JsonlSessionLog::open(dir, &id)?;
        Ok(Self::with_log(id, Vec::new(), Box::new(log)))
    }

    /// A session that is never written anywhere.
    pub fn ephemeral() -> Self {
        Self::with_log(new_session_id(), Vec::new(), Box::new(NullSessionLog))
    }

    /// Rebuild a session from its log and keep appending to it.
    pub fn resume(dir: &Path, id: &str) -> Result<Self, SessionLogError> {
        let path = log_path(dir, id);
        if !path.exists() {
            return Err(SessionLogError::NotFound { id: id.to_string(), dir: dir.to_path_buf() });
        }
        let history = JsonlSessionLog::replay(&path)?;
        let log = JsonlSessionLog::open(dir, id)?;
        let mut session = Self::with_log(id.to_string(), history, Box::new(log));
        if let Ok(meta) = std::fs::metadata(&path) {
            if let Ok(created) = meta.created().or_else(|_| meta.modified()) {
                session.created_at = created.into();
            }
        }
        debug!(session_id = %id, messages = session.history.len(), "resumed session");
        Ok(session)
    }

    /// Persist `message`, then add it to the in-memory history.
    pub fn append(&mut self, message: Message) -> Result<(), SessionLogError> {
        self.log.append(&self.id, &message)?;
        self.history.push(message);
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.history
    }

    pub fn todos(&self) -> SharedTodos {
        Arc::clone(&self.todos)
    }

    pub fn skill_cache(&self) -> SkillCache {
        Arc::clone(&self.skill_cache)
    }

    pub fn mode(&self) -> Option<&Mode> {
        self.mode.as_ref()
    }

    pub(crate) fn mode_mut(&mut self) -> &mut Option<Mode> {
        &mut self.mode
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log.path()
    }

    /// Start over under a new id: empty history, todos and skill cache.
    /// The active mode is kept.
    pub fn renew(&mut self) -> Result<(), SessionLogError> {
        let id = new_session_id();
        self.log.reset(&id)?;
        self.id = id;
        self.created_at = Utc::now();
        self.history.clear();
        self.todos = Arc::new(Mutex::new(TodoManager::new()));
        self.skill_cache = SkillCache::default();
        Ok(())
    }
}

/// Summary of one stored session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub created: DateTime<Local>,
    pub modified: DateTime<Local>,
    pub size_bytes: u64,
    pub message_count: usize,
    /// First user message, for display
    pub title: String,
}

/// Sessions stored in `dir`, newest first.  A missing directory is empty.
pub fn list_sessions(dir: &Path) -> anyhow::Result<Vec<SessionInfo>> {
    let rd = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(anyhow::Error::new(e).context(format!("reading {}", dir.display()))),
    };

    let mut out = Vec::new();
    for entry in rd.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(id) = name.strip_prefix("session-").and_then(|s| s.strip_suffix(".jsonl")) else {
            continue;
        };
        let Ok(meta) = entry.metadata() else { continue };
        let modified: DateTime<Local> = meta.modified().map(Into::into).unwrap_or_else(|_| Local::now());
        let created: DateTime<Local> = meta.created().map(Into::into).unwrap_or(modified);
        let (message_count, title) = match JsonlSessionLog::replay(&entry.path()) {
            Ok(msgs) => {
                let title = msgs
                    .iter()
                    .find(|m| m.role == Role::User)
                    .and_then(Message::as_text)
                    .map(|t| t.lines().next().unwrap_or("").to_string())
                    .unwrap_or_default();
                (msgs.len(), title)
            }
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping unreadable session log");
                (0, String::new())
            }
        };
        out.push(SessionInfo {
            id: id.to_string(),
            created,
            modified,
            size_bytes: meta.len(),
            message_count,
            title,
        });
    }
    out.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.id.cmp(&a.id)));
    Ok(out)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use meto_model::ToolCallRequest;

    fn sample_history() -> Vec<Message> {
        vec![
            Message::user("list the files"),
            Message::assistant(
                "",
                vec![ToolCallRequest {
                    id: "call_1".into(),
                    name: "list_dir".into(),
                    arguments: json!({"path": "."}),
                }],
            ),
            Message::tool_result("call_1", "file  12  2026-01-01 10:00  a.txt"),
            Message::assistant("There is one file.", vec![]),
        ]
    }

    #[test]
    fn session_id_format() {
        let id = new_session_id();
        let re = regex::Regex::new(r"^\d{8}_\d{6}-[0-9a-f]{6}$").unwrap();
        assert!(re.is_match(&id), "{id}");
    }

    #[test]
    fn replay_reconstructs_identical_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = Session::create(dir.path()).unwrap();
        for m in sample_history() {
            s.append(m).unwrap();
        }
        let resumed = Session::resume(dir.path(), &s.id).unwrap();
        assert_eq!(resumed.messages(), s.messages());
        assert_eq!(resumed.messages(), sample_history().as_slice());
    }

    #[test]
    fn each_append_is_one_line_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = Session::create(dir.path()).unwrap();
        s.append(Message::user("hi")).unwrap();
        s.append(Message::assistant("hello", vec![])).unwrap();

        let raw = std::fs::read_to_string(s.log_path().unwrap()).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["session_id"], s.id.as_str());
        assert_eq!(first["role"], "user");
        assert!(first.get("timestamp").is_some());
    }

    #[test]
    fn resumed_session_keeps_appending() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = Session::create(dir.path()).unwrap();
        s.append(Message::user("one")).unwrap();
        let id = s.id.clone();
        drop(s);

        let mut r = Session::resume(dir.path(), &id).unwrap();
        r.append(Message::user("two")).unwrap();
        let again = Session::resume(dir.path(), &id).unwrap();
        assert_eq!(again.messages().len(), 2);
    }

    #[test]
    fn resume_unknown_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Session::resume(dir.path(), "nope").unwrap_err();
        assert!(matches!(err, SessionLogError::NotFound { .. }));
    }

    #[test]
    fn corrupt_line_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("session-bad.jsonl"), "{not json}\n").unwrap();
        let err = Session::resume(dir.path(), "bad").unwrap_err();
        assert!(matches!(err, SessionLogError::Corrupt { line: 1, .. }));
    }

    #[test]
    fn renew_starts_a_new_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = Session::create(dir.path()).unwrap();
        s.append(Message::user("old")).unwrap();
        s.todos().lock().unwrap().create("task").unwrap();
        let old = s.id.clone();
        std::thread::sleep(std::time::Duration::from_millis(5));
        s.renew().unwrap();
        assert_ne!(s.id, old);
        assert!(s.messages().is_empty());
        assert!(s.todos().lock().unwrap().items().is_empty());
        s.append(Message::user("new")).unwrap();
        assert_eq!(Session::resume(dir.path(), &old).unwrap().messages().len(), 1);
    }

    #[test]
    fn list_sessions_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = Session::create(dir.path()).unwrap();
        a.append(Message::user("first session")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let mut b = Session::create(dir.path()).unwrap();
        b.append(Message::user("second session")).unwrap();
        b.append(Message::assistant("ok", vec![])).unwrap();

        let list = list_sessions(dir.path()).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, b.id);
        assert_eq!(list[0].message_count, 2);
        assert_eq!(list[0].title, "second session");
        assert!(list[0].size_bytes > 0);
    }

    #[test]
    fn list_sessions_missing_dir_is_empty() {
        assert!(list_sessions(Path::new("/no/such/meto/dir")).unwrap().is_empty());
    }

    #[test]
    fn ephemeral_session_writes_nothing() {
        let mut s = Session::ephemeral();
        s.append(Message::user("x")).unwrap();
        assert!(s.log_path().is_none());
        assert_eq!(s.messages().len(), 1);
    }
}
