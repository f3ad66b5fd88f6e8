// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod agent_loop;
pub mod agents;
pub mod commands;
pub mod compact;
pub mod context;
mod dispatcher;
mod error;
mod events;
mod frontmatter;
pub mod hooks;
mod mode;
pub mod prompts;
mod runtime;
mod session;
pub mod skills;
mod subagent;
mod todo;

pub use agent_loop::{AgentLoop, LoopOutcome, LoopState};
pub use dispatcher::ToolDispatcher;
pub use error::{LoopError, SessionLogError, SubagentError, ToolError};
pub use events::AgentEvent;
pub use hooks::{HookEvent, HookOutcome, HookRunner};
pub use mode::{Mode, ModeController, ModeExitResult, PlanMode};
pub use runtime::Runtime;
pub use session::{
    list_sessions, JsonlSessionLog, NullSessionLog, Session, SessionInfo, SessionLog, SkillCache,
};
pub use subagent::{RunTaskTool, SubagentOrchestrator, MAX_DEPTH};
pub use todo::{
    ConstraintViolation, ManageTodosTool, SharedTodos, TodoItem, TodoManager, TodoStatus, MAX_TODOS,
};
