// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, debug_span, info_span, trace, warn, Instrument};

use meto_model::{CompletionRequest, Message, ModelCallError, ModelProvider, ResponseEvent, ToolCallRequest};
use meto_tools::{AgentContext, ToolCall};

use crate::dispatcher::ToolDispatcher;
use crate::error::LoopError;
use crate::events::AgentEvent;
use crate::prompts::PromptBuilder;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModel,
    Dispatching,
    Done,
    MaxTurnsReached,
}

/// How a loop run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    /// `Done` or `MaxTurnsReached`
    pub state: LoopState,
    /// Final assistant text (`Done`) or the latest one of the run
    /// (`MaxTurnsReached`).
    pub text: String,
    /// Completed dispatch turns
    pub turns: u32,
    pub model_calls: u32,
}

/// One model response, collected from the stream.
struct ModelTurn {
    text: String,
    calls: Vec<ToolCall>,
}

/// The turn-taking control loop: ask the model, dispatch the calls it makes,
/// repeat until it answers without calls or the turn budget is spent.
pub struct AgentLoop {
    model: Arc<dyn ModelProvider>,
    dispatcher: ToolDispatcher,
    prompt: PromptBuilder,
    model_timeout: Duration,
    events: Option<mpsc::Sender<AgentEvent>>,
    /// Set once the event receiver has gone away.
    events_closed: AtomicBool,
}

impl AgentLoop {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        dispatcher: ToolDispatcher,
        prompt: PromptBuilder,
        model_timeout: Duration,
    ) -> Self {
        Self { model, dispatcher, prompt, model_timeout, events: None, events_closed: AtomicBool::new(false) }
    }

    pub fn with_events(mut self, tx: mpsc::Sender<AgentEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Run `prompt` to completion on `session`.
    ///
    /// An empty prompt ends immediately in `Done` without touching the
    /// session or the model.  Everything logged during the run carries the
    /// session id and agent name as span fields.
    pub async fn run(&self, session: &mut Session, ctx: &AgentContext, prompt: &str) -> Result<LoopOutcome, LoopError> {
        let span = info_span!("agent", session_id = %session.id, agent_name = %ctx.agent_name);
        self.run_states(session, ctx, prompt).instrument(span).await
    }

    /// True when events could not be delivered because the receiver was
    /// dropped.
    pub fn events_closed(&self) -> bool {
        self.events_closed.load(Ordering::Relaxed)
    }

    async fn run_states(&self, session: &mut Session, ctx: &AgentContext, prompt: &str) -> Result<LoopOutcome, LoopError> {
        let mut outcome = LoopOutcome {
            state: LoopState::AwaitingModel,
            text: String::new(),
            turns: 0,
            model_calls: 0,
        };
        if prompt.trim().is_empty() {
            outcome.state = LoopState::Done;
            return Ok(outcome);
        }

        session.append(Message::user(prompt))?;

        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut synthetic = 0usize;
        let mut pending: Vec<ToolCall> = Vec::new();

        loop {
            trace!(agent = %ctx.agent_name, state = ?outcome.state, turns = outcome.turns, "agent loop");
            match outcome.state {
                LoopState::AwaitingModel => {
                    let turn = self
                        .call_model(session, ctx)
                        .instrument(debug_span!("turn", turn = outcome.turns + 1))
                        .await?;
                    outcome.model_calls += 1;
                    if !turn.text.is_empty() {
                        outcome.text = turn.text.clone();
                    }

                    let mut calls = turn.calls;
                    for call in &mut calls {
                        if call.id.is_empty() || seen_ids.contains(&call.id) {
                            let fresh = loop {
                                let candidate = format!("tc_synthetic_{synthetic}");
                                synthetic += 1;
                                if !seen_ids.contains(&candidate) {
                                    break candidate;
                                }
                            };
                            warn!(
                                tool_name = %call.name,
                                tool_call_id = %call.id,
                                replacement = %fresh,
                                "tool call id empty or reused; generated synthetic id"
                            );
                            call.id = fresh;
                        }
                        seen_ids.insert(call.id.clone());
                    }

                    let requests: Vec<ToolCallRequest> = calls
                        .iter()
                        .map(|c| ToolCallRequest { id: c.id.clone(), name: c.name.clone(), arguments: c.args.clone() })
                        .collect();
                    session.append(Message::assistant(turn.text, requests))?;

                    if calls.is_empty() {
                        outcome.state = LoopState::Done;
                    } else {
                        pending = calls;
                        outcome.state = LoopState::Dispatching;
                    }
                }
                LoopState::Dispatching => {
                    let turn_span = debug_span!("turn", turn = outcome.turns + 1);
                    for call in pending.drain(..) {
                        self.emit(AgentEvent::ToolCallStarted {
                            call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                            args: call.args.clone(),
                        })
                        .await;
                        let output =
                            self.dispatcher.dispatch(&call, ctx, session).instrument(turn_span.clone()).await?;
                        self.emit(AgentEvent::ToolCallFinished {
                            call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                            output: output.content,
                            is_error: output.is_error,
                        })
                        .await;
                    }
                    outcome.turns += 1;
                    self.emit(AgentEvent::TurnComplete { turns: outcome.turns }).await;
                    outcome.state = if outcome.turns >= ctx.max_turns {
                        debug!(agent = %ctx.agent_name, max_turns = ctx.max_turns, "turn budget exhausted");
                        LoopState::MaxTurnsReached
                    } else {
                        LoopState::AwaitingModel
                    };
                }
                LoopState::Done | LoopState::MaxTurnsReached => break,
            }
        }

        debug!(
            agent = %ctx.agent_name,
            state = ?outcome.state,
            turns = outcome.turns,
            model_calls = outcome.model_calls,
            "agent loop finished"
        );
        Ok(outcome)
    }

    async fn call_model(&self, session: &Session, ctx: &AgentContext) -> Result<ModelTurn, ModelCallError> {
        let registry = self.dispatcher.registry();
        let tool_names = registry.names_for(&ctx.allowlist);
        let req = CompletionRequest {
            system_prompt: self.prompt.build(&tool_names, session.mode()),
            messages: session.messages().to_vec(),
            tools: registry.schemas_for(&ctx.allowlist),
        };
        let secs = self.model_timeout.as_secs();
        match tokio::time::timeout(self.model_timeout, self.stream_one_turn(req)).await {
            Ok(result) => result,
            Err(_) => Err(ModelCallError::Timeout(secs)),
        }
    }

    /// Call the model once, streaming text deltas and collecting tool-call
    /// fragments into complete calls ordered by index.
    async fn stream_one_turn(&self, req: CompletionRequest) -> Result<ModelTurn, ModelCallError> {
        let mut stream = self.model.complete(req).await?;

        let mut text = String::new();
        // Keyed by the parallel-tool-call index from the provider.
        let mut pending: HashMap<u32, PendingToolCall> = HashMap::new();

        while let Some(event) = stream.next().await {
            match event? {
                ResponseEvent::TextDelta(delta) if !delta.is_empty() => {
                    text.push_str(&delta);
                    self.emit(AgentEvent::TextDelta(delta)).await;
                }
                ResponseEvent::TextDelta(_) => {}
                ResponseEvent::ToolCall { index, id, name, arguments } => {
                    let ptc = pending.entry(index).or_default();
                    if !id.is_empty() {
                        ptc.id = id;
                    }
                    if !name.is_empty() {
                        ptc.name = name;
                    }
                    ptc.args_buf.push_str(&arguments);
                }
                ResponseEvent::Usage { input_tokens, output_tokens } => {
                    self.emit(AgentEvent::TokenUsage { input: input_tokens, output: output_tokens }).await;
                }
                ResponseEvent::Done => break,
            }
        }

        // Calls with an empty name cannot be dispatched and are dropped.
        let mut sorted: Vec<(u32, PendingToolCall)> = pending.into_iter().collect();
        sorted.sort_by_key(|(idx, _)| *idx);
        let calls = sorted
            .into_iter()
            .filter_map(|(_, ptc)| {
                if ptc.name.is_empty() {
                    warn!(tool_call_id = %ptc.id, "dropping tool call with empty name from model");
                    None
                } else {
                    Some(ptc.finish())
                }
            })
            .collect();

        if !text.is_empty() {
            self.emit(AgentEvent::TextComplete(text.clone())).await;
        }
        Ok(ModelTurn { text, calls })
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).await.is_err() && !self.events_closed.swap(true, Ordering::Relaxed) {
                debug!("event receiver dropped; discarding further events");
            }
        }
    }
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    args_buf: String,
}

impl PendingToolCall {
    /// Always resolves to a JSON value; unparseable arguments become `{}` so
    /// schema validation reports them instead of the loop failing.
    fn finish(self) -> ToolCall {
        let args = if self.args_buf.trim().is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            match serde_json::from_str(&self.args_buf) {
                Ok(v) => v,
                Err(e) => match attempt_json_repair(&self.args_buf) {
                    Some(v) => {
                        warn!(tool_name = %self.name, tool_call_id = %self.id, "repaired invalid JSON arguments from model");
                        v
                    }
                    None => {
                        warn!(
                            tool_name = %self.name,
                            tool_call_id = %self.id,
                            args_buf = %self.args_buf,
                            error = %e,
                            "model sent tool call with invalid JSON arguments; substituting {{}}"
                        );
                        serde_json::Value::Object(Default::default())
                    }
                },
            }
        };
        ToolCall { id: self.id, name: self.name, args }
    }
}

/// Repair the two malformations models produce most: a missing comma
/// between members, and output cut off before the closing quote/brace.
fn attempt_json_repair(json_str: &str) -> Option<serde_json::Value> {
    if let Ok(re) = regex::Regex::new(r#""([^"]+)"([a-zA-Z_][a-zA-Z0-9_]*)":\s*"#) {
        let repaired = re.replace_all(json_str, r#""$1", "$2": "#);
        if let Ok(v) = serde_json::from_str(&repaired) {
            return Some(v);
        }
    }

    let trimmed = json_str.trim_end();
    if !trimmed.ends_with('}') {
        let mut completed = trimmed.to_string();
        if trimmed.chars().filter(|&c| c == '"').count() % 2 == 1 {
            completed.push('"');
        }
        completed.push('}');
        if let Ok(v) = serde_json::from_str(&completed) {
            return Some(v);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_args_become_object() {
        let tc = PendingToolCall { id: "1".into(), name: "x".into(), args_buf: String::new() }.finish();
        assert_eq!(tc.args, serde_json::json!({}));
    }

    #[test]
    fn truncated_args_are_repaired() {
        let tc = PendingToolCall { id: "1".into(), name: "x".into(), args_buf: r#"{"path": "a.txt"#.into() }.finish();
        assert_eq!(tc.args, serde_json::json!({"path": "a.txt"}));
    }

    #[test]
    fn hopeless_args_become_object() {
        let tc = PendingToolCall { id: "1".into(), name: "x".into(), args_buf: "not json at all".into() }.finish();
        assert_eq!(tc.args, serde_json::json!({}));
    }
}
