// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream;

use crate::{provider::ResponseStream, CompletionRequest, ModelCallError, ResponseEvent, Role};

/// Deterministic offline provider.  Echoes the last user message back as the
/// assistant response and never calls tools.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl crate::ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> Result<ResponseStream, ModelCallError> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.as_text())
            .unwrap_or("[no input]")
            .to_string();

        let events: Vec<Result<ResponseEvent, ModelCallError>> = vec![
            Ok(ResponseEvent::TextDelta(format!("MOCK: {reply}"))),
            Ok(ResponseEvent::Usage { input_tokens: 10, output_tokens: 10 }),
            Ok(ResponseEvent::Done),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

/// One scripted model response.
#[derive(Debug, Clone)]
pub enum Script {
    Events(Vec<ResponseEvent>),
    /// The call fails before any event is produced.
    Fail(String),
}

/// A pre-scripted mock provider.  Each call to `complete` pops the next
/// response script from the front of the queue.  This lets tests specify
/// exact event sequences, including tool calls, without network access.
pub struct ScriptedMockProvider {
    scripts: Arc<Mutex<Vec<Script>>>,
    /// Script replayed forever once the queue is empty.
    repeat: Option<Vec<ResponseEvent>>,
    /// The last `CompletionRequest` seen by this provider.
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
    /// Number of `complete` calls served so far.
    pub calls: Arc<Mutex<usize>>,
}

impl ScriptedMockProvider {
    /// Build a provider from a list of response scripts.
    /// The outer `Vec` is the ordered list of calls; the inner `Vec` is the
    /// sequence of [`ResponseEvent`]s emitted for that call.
    pub fn new(scripts: Vec<Vec<ResponseEvent>>) -> Self {
        Self::from_scripts(scripts.into_iter().map(Script::Events).collect())
    }

    pub fn from_scripts(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            repeat: None,
            last_request: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Provider that answers every call with the same event sequence.
    pub fn repeating(events: Vec<ResponseEvent>) -> Self {
        let mut p = Self::new(Vec::new());
        p.repeat = Some(events);
        p
    }

    /// Convenience: provider that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![text_script(reply)])
    }

    /// Convenience: provider that returns a tool call followed by a text reply.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            vec![tool_call_event(0, tool_id, tool_name, args_json), ResponseEvent::Done],
            text_script(final_text),
        ])
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// A complete text-only response script.
pub fn text_script(reply: impl Into<String>) -> Vec<ResponseEvent> {
    vec![
        ResponseEvent::TextDelta(reply.into()),
        ResponseEvent::Usage { input_tokens: 5, output_tokens: 5 },
        ResponseEvent::Done,
    ]
}

/// A single complete tool-call event.
pub fn tool_call_event(
    index: u32,
    id: impl Into<String>,
    name: impl Into<String>,
    args_json: impl Into<String>,
) -> ResponseEvent {
    ResponseEvent::ToolCall {
        index,
        id: id.into(),
        name: name.into(),
        arguments: args_json.into(),
    }
}

#[async_trait]
impl crate::ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> Result<ResponseStream, ModelCallError> {
        *self.last_request.lock().unwrap_or_else(PoisonError::into_inner) = Some(req);
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        let script = {
            let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
            if !scripts.is_empty() {
                scripts.remove(0)
            } else if let Some(events) = &self.repeat {
                Script::Events(events.clone())
            } else {
                // Default fallback when all scripts are consumed
                Script::Events(vec![
                    ResponseEvent::TextDelta("[no more scripts]".into()),
                    ResponseEvent::Done,
                ])
            }
        };
        match script {
            Script::Events(events) => {
                let wrapped: Vec<Result<ResponseEvent, ModelCallError>> =
                    events.into_iter().map(Ok).collect();
                Ok(Box::pin(stream::iter(wrapped)))
            }
            Script::Fail(msg) => Err(ModelCallError::Transport(msg)),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
