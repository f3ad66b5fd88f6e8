// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Failure of a model call.  Always fatal for the loop that issued it.
#[derive(Debug, Error)]
pub enum ModelCallError {
    #[error("model request failed: {0}")]
    Transport(String),
    #[error("model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model stream error: {0}")]
    Stream(String),
    #[error("model call timed out after {0}s")]
    Timeout(u64),
}

impl ModelCallError {
    /// True for 401/403 responses.
    pub fn is_auth(&self) -> bool {
        matches!(self, ModelCallError::Status { status: 401 | 403, .. })
    }
}

impl From<reqwest::Error> for ModelCallError {
    fn from(e: reqwest::Error) -> Self {
        ModelCallError::Transport(e.to_string())
    }
}
