// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use meto_config::ToolsConfig;

use crate::{truncate_head_tail, Tool, ToolCall, ToolOutput, Truncation};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("tool timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("tool crashed: {0}")]
    Crashed(String),
}

/// Runs tool bodies under a deadline and caps the size of what they return.
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    timeout: Duration,
    max_output_chars: usize,
}

impl ToolExecutor {
    pub fn new(timeout: Duration, max_output_chars: usize) -> Self {
        Self { timeout, max_output_chars }
    }

    pub fn from_config(cfg: &ToolsConfig) -> Self {
        Self::new(Duration::from_secs(cfg.timeout_secs), cfg.max_output_chars)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `tool` on its own task.  On timeout the task is aborted, which
    /// drops any child process the tool spawned with `kill_on_drop`.
    /// A panicking tool is reported as [`ExecError::Crashed`].
    pub async fn execute(&self, tool: Arc<dyn Tool>, call: ToolCall) -> Result<ToolOutput, ExecError> {
        let name = call.name.clone();
        let self_bounded = tool.self_bounded();
        let mut handle = tokio::spawn(async move { tool.execute(&call).await });
        if self_bounded {
            return match handle.await {
                Ok(output) => Ok(output),
                Err(join_err) => Err(ExecError::Crashed(join_err.to_string())),
            };
        }
        match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(output)) => {
                debug!(tool = %name, is_error = output.is_error, "tool finished");
                Ok(output)
            }
            Ok(Err(join_err)) => {
                warn!(tool = %name, error = %join_err, "tool task failed");
                Err(ExecError::Crashed(join_err.to_string()))
            }
            Err(_) => {
                handle.abort();
                warn!(tool = %name, timeout = ?self.timeout, "tool timed out");
                Err(ExecError::Timeout(self.timeout))
            }
        }
    }

    pub fn truncate(&self, content: &str) -> Truncation {
        truncate_head_tail(content, self.max_output_chars)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
