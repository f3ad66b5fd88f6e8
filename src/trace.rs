// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-session JSONL trace file.
//!
//! The logging layer is installed before any session exists, so the
//! destination is switchable: lines are discarded until [`TraceFile::open`]
//! points it at `trace-<session id>.jsonl`, and `/clear` or `/compact`
//! re-point it at the new session's file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

pub fn trace_path(dir: &Path, session_id: &str) -> PathBuf {
    dir.join(format!("trace-{session_id}.jsonl"))
}

#[derive(Debug, Clone, Default)]
pub struct TraceFile {
    file: Arc<Mutex<Option<File>>>,
}

impl TraceFile {
    /// Append further trace lines to the file for `session_id` in `dir`.
    pub fn open(&self, dir: &Path, session_id: &str) -> io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = trace_path(dir, session_id);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        *self.file.lock().unwrap_or_else(PoisonError::into_inner) = Some(file);
        Ok(path)
    }
}

pub struct TraceWriter {
    file: Arc<Mutex<Option<File>>>,
}

impl Write for TraceWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
            Some(f) => f.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self.file.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
            Some(f) => f.write_all(buf),
            None => Ok(()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for TraceFile {
    type Writer = TraceWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TraceWriter { file: Arc::clone(&self.file) }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::prelude::*;

    fn json_subscriber(trace: TraceFile) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_span_list(true)
                .with_current_span(false)
                .with_writer(trace),
        )
    }

    #[test]
    fn lines_before_open_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let trace = TraceFile::default();
        tracing::subscriber::with_default(json_subscriber(trace.clone()), || {
            tracing::info!("nobody listens");
            trace.open(dir.path(), "s1").unwrap();
            tracing::info!("recorded");
        });
        let text = std::fs::read_to_string(trace_path(dir.path(), "s1")).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("recorded"));
    }

    #[test]
    fn lines_carry_session_and_agent_span_fields() {
        let dir = tempfile::tempdir().unwrap();
        let trace = TraceFile::default();
        trace.open(dir.path(), "s1").unwrap();
        tracing::subscriber::with_default(json_subscriber(trace.clone()), || {
            let agent = tracing::info_span!("agent", session_id = "s1", agent_name = "main");
            let _a = agent.enter();
            let turn = tracing::info_span!("turn", turn = 2u32);
            let _t = turn.enter();
            tracing::warn!(tool = "shell", "denied");
        });
        let text = std::fs::read_to_string(trace_path(dir.path(), "s1")).unwrap();
        let line: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(line["level"], "WARN");
        assert!(line["timestamp"].is_string());
        assert_eq!(line["fields"]["message"], "denied");
        assert_eq!(line["spans"][0]["session_id"], "s1");
        assert_eq!(line["spans"][0]["agent_name"], "main");
        assert_eq!(line["spans"][1]["turn"], 2);
    }

    #[test]
    fn reopening_switches_files() {
        let dir = tempfile::tempdir().unwrap();
        let trace = TraceFile::default();
        tracing::subscriber::with_default(json_subscriber(trace.clone()), || {
            trace.open(dir.path(), "a").unwrap();
            tracing::info!("first");
            trace.open(dir.path(), "b").unwrap();
            tracing::info!("second");
        });
        assert!(std::fs::read_to_string(trace_path(dir.path(), "a")).unwrap().contains("first"));
        let b = std::fs::read_to_string(trace_path(dir.path(), "b")).unwrap();
        assert!(b.contains("second") && !b.contains("first"));
    }
}
