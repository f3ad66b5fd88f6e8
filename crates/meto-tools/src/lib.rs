// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod builtin;
mod context;
mod executor;
mod interaction;
mod policy;
mod registry;
mod tool;
mod truncate;
mod validate;

pub use context::{AgentContext, Allowlist};
pub use executor::{ExecError, ToolExecutor};
pub use interaction::{ApproveAll, ConfirmRequest, DenyAll, UserInteraction};
pub use policy::{PermissionDecision, PermissionPolicy, ToolPermission};
pub use registry::ToolRegistry;
pub use tool::{required_str, Tool, ToolCall, ToolOutput};
pub use truncate::{truncate_head_tail, Truncation};
pub use validate::validate_args;

pub use meto_model::ToolSchema;
