// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use thiserror::Error;

use meto_model::ModelCallError;

/// Recoverable failures of a single tool call.  The `Display` text is what
/// the model sees as the tool message content.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: '{name}'. Available tools: {available}")]
    NotFound { name: String, available: String },

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("permission denied for {tool}: {reason}")]
    PermissionDenied { tool: String, reason: String },

    #[error("{tool}: {message}")]
    Timeout { tool: String, message: String },

    #[error("{tool} failed: {message}")]
    Execution { tool: String, message: String },

    /// The content is exactly what the blocking hook printed.
    #[error("{reason}")]
    HookBlocked { reason: String },
}

/// Durable log failures.  These abort the loop.
#[derive(Debug, Error)]
pub enum SessionLogError {
    #[error("session log I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt session log {} at line {line}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("no session '{id}' in {}", dir.display())]
    NotFound { id: String, dir: PathBuf },
}

/// Fatal errors that stop an agent loop early.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Model(#[from] ModelCallError),

    #[error(transparent)]
    Log(#[from] SessionLogError),
}

/// Why a nested loop produced no answer for its caller.
#[derive(Debug, Error)]
pub enum SubagentError {
    #[error("maximum sub-agent depth ({0}) reached")]
    DepthExceeded(usize),

    #[error("sub-agent error: {0}")]
    Loop(#[from] LoopError),
}
