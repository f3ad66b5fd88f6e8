// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod ask_question;
pub mod fetch;
pub mod fs;
pub mod grep;
pub mod list_dir;
pub mod shell;

use std::sync::Arc;

use crate::{ToolRegistry, UserInteraction};

/// Register every session-independent built-in tool.
pub fn register_builtins(registry: &mut ToolRegistry, interaction: Arc<dyn UserInteraction>) {
    registry.register(shell::ShellTool);
    registry.register(list_dir::ListDirTool);
    registry.register(fs::ReadFileTool);
    registry.register(fs::WriteFileTool);
    registry.register(grep::GrepSearchTool);
    registry.register(fetch::FetchTool::default());
    registry.register(ask_question::AskUserQuestionTool::new(interaction));
}
