// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;

/// A pending confirmation shown to the user.
#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    pub agent_name: String,
    pub tool_name: String,
    /// The argument the user needs to judge the call (command, url, path …)
    pub detail: String,
}

/// The user-facing side of the runtime.
///
/// `confirm` blocks the calling loop until the user answers; there is no
/// timeout.  Front-ends without a human attached should use [`DenyAll`].
#[async_trait]
pub trait UserInteraction: Send + Sync {
    async fn confirm(&self, req: &ConfirmRequest) -> bool;

    /// Ask a free-form question.  `None` means no answer is available.
    async fn ask(&self, question: &str, options: &[String]) -> Option<String>;
}

/// Rejects every confirmation and answers no questions.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

#[async_trait]
impl UserInteraction for DenyAll {
    async fn confirm(&self, _req: &ConfirmRequest) -> bool {
        false
    }

    async fn ask(&self, _question: &str, _options: &[String]) -> Option<String> {
        None
    }
}

/// Approves every confirmation.  Questions are answered with the first
/// option when one is offered.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApproveAll;

#[async_trait]
impl UserInteraction for ApproveAll {
    async fn confirm(&self, _req: &ConfirmRequest) -> bool {
        true
    }

    async fn ask(&self, _question: &str, options: &[String]) -> Option<String> {
        options.first().cloned()
    }
}
