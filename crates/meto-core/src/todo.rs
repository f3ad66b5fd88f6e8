// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use meto_tools::{required_str, Tool, ToolCall, ToolOutput, ToolPermission};

pub const MAX_TODOS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    /// 1-based, assigned in creation order
    pub id: u32,
    pub text: String,
    pub status: TodoStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintViolation {
    #[error("Max {MAX_TODOS} tasks allowed")]
    TooManyItems,
    #[error("Task text must not be empty")]
    EmptyText,
    #[error("Only one task can be in_progress at a time (task {0} is in progress)")]
    AlreadyInProgress(u32),
    #[error("Task {0} does not exist")]
    UnknownId(u32),
    #[error("Task {0} is already done")]
    AlreadyDone(u32),
    #[error("Task {0} is not in progress")]
    NotInProgress(u32),
}

/// The bounded task list of one session.
///
/// Every operation validates before it mutates, so a rejected call leaves
/// the list untouched.
#[derive(Debug, Clone, Default)]
pub struct TodoManager {
    items: Vec<TodoItem>,
}

impl TodoManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    pub fn create(&mut self, text: &str) -> Result<u32, ConstraintViolation> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ConstraintViolation::EmptyText);
        }
        if self.items.len() >= MAX_TODOS {
            return Err(ConstraintViolation::TooManyItems);
        }
        let id = self.items.len() as u32 + 1;
        self.items.push(TodoItem { id, text: text.to_string(), status: TodoStatus::Pending });
        Ok(id)
    }

    pub fn start(&mut self, id: u32) -> Result<(), ConstraintViolation> {
        let idx = self.index_of(id)?;
        if let Some(active) = self.items.iter().find(|t| t.status == TodoStatus::InProgress) {
            return Err(ConstraintViolation::AlreadyInProgress(active.id));
        }
        if self.items[idx].status == TodoStatus::Done {
            return Err(ConstraintViolation::AlreadyDone(id));
        }
        self.items[idx].status = TodoStatus::InProgress;
        Ok(())
    }

    pub fn complete(&mut self, id: u32) -> Result<(), ConstraintViolation> {
        let idx = self.index_of(id)?;
        if self.items[idx].status != TodoStatus::InProgress {
            return Err(ConstraintViolation::NotInProgress(id));
        }
        self.items[idx].status = TodoStatus::Done;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// The model-facing view of the list.
    pub fn render(&self) -> String {
        if self.items.is_empty() {
            return "No tasks.".to_string();
        }
        let mut lines: Vec<String> = self
            .items
            .iter()
            .map(|t| {
                let mark = match t.status {
                    TodoStatus::Done => "[x]",
                    TodoStatus::InProgress => "[>]",
                    TodoStatus::Pending => "[ ]",
                };
                format!("{mark} {}", t.text)
            })
            .collect();
        let done = self.items.iter().filter(|t| t.status == TodoStatus::Done).count();
        lines.push(format!("({done}/{} completed)", self.items.len()));
        lines.join("\n")
    }

    fn index_of(&self, id: u32) -> Result<usize, ConstraintViolation> {
        self.items
            .iter()
            .position(|t| t.id == id)
            .ok_or(ConstraintViolation::UnknownId(id))
    }
}

/// Shared handle to a session's task list.
pub type SharedTodos = Arc<Mutex<TodoManager>>;

/// `manage_todos` tool bound to one session's task list.
pub struct ManageTodosTool {
    todos: SharedTodos,
}

impl ManageTodosTool {
    pub fn new(todos: SharedTodos) -> Self {
        Self { todos }
    }
}

#[async_trait]
impl Tool for ManageTodosTool {
    fn name(&self) -> &str {
        "manage_todos"
    }

    fn description(&self) -> &str {
        "Track multi-step work in a task list (max 20 tasks, one in progress at a time).\n\
         Tasks are numbered from 1 in creation order.\n\
         actions: create (text), start (id), complete (id), list.\n\
         A task must be started before it can be completed; done tasks cannot be reopened."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["create", "start", "complete", "list"],
                    "description": "Operation to perform"
                },
                "text": {
                    "type": "string",
                    "description": "Task description (create)"
                },
                "id": {
                    "type": "integer",
                    "description": "Task number (start, complete)"
                }
            },
            "required": ["action"]
        })
    }

    fn permission(&self) -> ToolPermission {
        ToolPermission::Never
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let action = match required_str(call, "action") {
            Ok(a) => a,
            Err(out) => return out,
        };
        let id = call.args.get("id").and_then(Value::as_u64).map(|i| i as u32);

        debug!(action = %action, ?id, "manage_todos tool");

        let mut todos = self.todos.lock().unwrap_or_else(PoisonError::into_inner);
        let result = match action {
            "create" => match required_str(call, "text") {
                Ok(text) => todos.create(text).map(|_| ()),
                Err(out) => return out,
            },
            "start" | "complete" => {
                let Some(id) = id else {
                    return ToolOutput::err(&call.id, format!("action '{action}' requires an integer 'id'"));
                };
                if action == "start" {
                    todos.start(id)
                } else {
                    todos.complete(id)
                }
            }
            "list" => Ok(()),
            other => {
                return ToolOutput::err(
                    &call.id,
                    format!("unknown action '{other}'; expected create, start, complete or list"),
                )
            }
        };
        match result {
            Ok(()) => ToolOutput::ok(&call.id, todos.render()),
            Err(violation) => ToolOutput::err(&call.id, format!("Rejected: {violation}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
