// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! OpenAI-compatible chat completion provider.
//!
//! Speaks the `/chat/completions` SSE streaming wire format used by OpenAI,
//! LiteLLM proxies, vLLM and most self-hosted gateways.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use meto_config::ModelConfig;

use crate::{provider::ResponseStream, CompletionRequest, Message, ModelCallError, ResponseEvent, Role};

pub struct OpenAiProvider {
    model: String,
    api_key: Option<String>,
    chat_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// `base_url` ends before `/chat/completions`.  A key of `None` sends
    /// no `Authorization` header, which is what most local proxies expect.
    pub fn new(model: impl Into<String>, api_key: Option<String>, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            model: model.into(),
            api_key,
            chat_url: format!("{base}/chat/completions"),
            max_tokens: None,
            temperature: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(cfg: &ModelConfig) -> Self {
        let mut p = Self::new(cfg.name.clone(), cfg.api_key.clone(), &cfg.base_url);
        p.max_tokens = cfg.max_tokens;
        p.temperature = cfg.temperature;
        p
    }

    fn build_body(&self, req: &CompletionRequest) -> Value {
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": build_openai_messages(&req.system_prompt, &req.messages),
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        if let Some(max) = self.max_tokens {
            body["max_tokens"] = json!(max);
        }
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        body
    }
}

#[async_trait]
impl crate::ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: CompletionRequest) -> Result<ResponseStream, ModelCallError> {
        let body = self.build_body(&req);
        debug!(
            model = %self.model,
            tool_count = req.tools.len(),
            message_count = req.messages.len(),
            "sending completion request"
        );
        tracing::trace!(request_body = ?body, "full completion request");

        let mut http_req = self.client.post(&self.chat_url).json(&body);
        if let Some(key) = &self.api_key {
            http_req = http_req.bearer_auth(key);
        }

        let resp = http_req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelCallError::Status { status, body });
        }

        // SSE events can be split across multiple TCP packets.  Maintain a
        // line buffer across chunks; emit events only for complete lines.
        let event_stream = resp
            .bytes_stream()
            .scan(String::new(), |buf, chunk| {
                let events: Vec<Result<ResponseEvent, ModelCallError>> = match chunk {
                    Ok(b) => {
                        buf.push_str(&String::from_utf8_lossy(&b));
                        drain_complete_sse_lines(buf)
                    }
                    Err(e) => vec![Err(ModelCallError::Stream(e.to_string()))],
                };
                std::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }
}

/// Parse a single complete SSE `data:` line.  Empty lines, comments and
/// unparseable data yield no events.
fn parse_sse_data_line(line: &str) -> Vec<Result<ResponseEvent, ModelCallError>> {
    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return Vec::new();
    };
    if data.is_empty() {
        return Vec::new();
    }
    if data == "[DONE]" {
        return vec![Ok(ResponseEvent::Done)];
    }
    match serde_json::from_str::<Value>(data) {
        Ok(v) => parse_sse_chunk(&v),
        Err(e) => {
            debug!(error = %e, "skipping unparseable SSE data");
            Vec::new()
        }
    }
}

/// Drain all complete `\n`-terminated SSE lines from `buf`, leaving any
/// trailing partial line in place for the next chunk.
pub(crate) fn drain_complete_sse_lines(buf: &mut String) -> Vec<Result<ResponseEvent, ModelCallError>> {
    let mut events = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        buf.drain(..=nl_pos);
        events.extend(parse_sse_data_line(&line));
    }
    events
}

/// One chunk may carry text, several tool-call deltas and usage at once.
/// Each tool-call delta keeps its own `index`, which routes accumulation
/// in the agent loop.
fn parse_sse_chunk(v: &Value) -> Vec<Result<ResponseEvent, ModelCallError>> {
    if let Some(err) = v.get("error").filter(|e| !e.is_null()) {
        let msg = err["message"].as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
        return vec![Err(ModelCallError::Stream(msg))];
    }

    let mut events = Vec::new();
    let delta = &v["choices"][0]["delta"];

    if let Some(text) = delta.get("content").and_then(Value::as_str).filter(|t| !t.is_empty()) {
        events.push(Ok(ResponseEvent::TextDelta(text.to_string())));
    }

    if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
        for (pos, tc) in calls.iter().enumerate() {
            let index = tc["index"].as_u64().unwrap_or(pos as u64) as u32;
            let id = tc["id"].as_str().unwrap_or("").to_string();
            let name = tc["function"]["name"].as_str().unwrap_or("").to_string();
            let arguments = tc["function"]["arguments"].as_str().unwrap_or("").to_string();
            events.push(Ok(ResponseEvent::ToolCall { index, id, name, arguments }));
        }
    }

    if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
        events.push(Ok(ResponseEvent::Usage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
        }));
    }

    events
}

/// Convert the system prompt plus history into the OpenAI wire-format
/// message array.
pub(crate) fn build_openai_messages(system_prompt: &str, messages: &[Message]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if !system_prompt.is_empty() {
        out.push(json!({ "role": "system", "content": system_prompt }));
    }
    for m in messages {
        let v = match m.role {
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": m.tool_call_id.as_deref().unwrap_or_default(),
                "content": m.content.as_deref().unwrap_or_default(),
            }),
            Role::Assistant if m.has_tool_calls() => {
                let calls: Vec<Value> = m
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                json!({ "role": "assistant", "content": m.content, "tool_calls": calls })
            }
            role => json!({
                "role": role.as_str(),
                "content": m.content.as_deref().unwrap_or_default(),
            }),
        };
        out.push(v);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolCallRequest;

    fn parse(line: &str) -> ResponseEvent {
        let mut events = parse_all(line);
        assert_eq!(events.len(), 1, "{events:?}");
        events.remove(0)
    }

    fn parse_all(line: &str) -> Vec<ResponseEvent> {
        parse_sse_data_line(line).into_iter().map(Result::unwrap).collect()
    }

    #[test]
    fn chat_url_strips_trailing_slash() {
        let p = OpenAiProvider::new("m", None, "http://localhost:4444/");
        assert_eq!(p.chat_url, "http://localhost:4444/chat/completions");
    }

    #[test]
    fn parse_sse_text_delta() {
        let ev = parse(r#"data: {"choices":[{"delta":{"content":"hello"}}]}"#);
        assert_eq!(ev, ResponseEvent::TextDelta("hello".into()));
    }

    #[test]
    fn parse_sse_tool_call_start() {
        let ev = parse(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_9","function":{"name":"shell","arguments":""}}]}}]}"#,
        );
        assert_eq!(
            ev,
            ResponseEvent::ToolCall { index: 1, id: "call_9".into(), name: "shell".into(), arguments: String::new() }
        );
    }

    #[test]
    fn parse_sse_usage() {
        let ev = parse(r#"data: {"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":3}}"#);
        assert_eq!(ev, ResponseEvent::Usage { input_tokens: 12, output_tokens: 3 });
    }

    #[test]
    fn parse_sse_error_object_is_stream_error() {
        let mut r = parse_sse_data_line(r#"data: {"error":{"message":"rate limited"}}"#);
        assert_eq!(r.len(), 1);
        assert!(matches!(r.remove(0), Err(ModelCallError::Stream(m)) if m == "rate limited"));
    }

    #[test]
    fn every_tool_call_in_a_chunk_is_kept() {
        let events = parse_all(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"a","function":{"name":"list_dir","arguments":"{}"}},{"index":1,"id":"b","function":{"name":"read_file","arguments":"{\"path\":\"x\"}"}}]}}]}"#,
        );
        assert_eq!(
            events,
            vec![
                ResponseEvent::ToolCall { index: 0, id: "a".into(), name: "list_dir".into(), arguments: "{}".into() },
                ResponseEvent::ToolCall {
                    index: 1,
                    id: "b".into(),
                    name: "read_file".into(),
                    arguments: r#"{"path":"x"}"#.into()
                },
            ]
        );
    }

    #[test]
    fn content_tool_call_and_usage_share_a_chunk() {
        let events = parse_all(
            r#"data: {"choices":[{"delta":{"content":"checking","tool_calls":[{"index":0,"id":"a","function":{"name":"shell","arguments":""}}]}}],"usage":{"prompt_tokens":5,"completion_tokens":2}}"#,
        );
        assert_eq!(
            events,
            vec![
                ResponseEvent::TextDelta("checking".into()),
                ResponseEvent::ToolCall { index: 0, id: "a".into(), name: "shell".into(), arguments: String::new() },
                ResponseEvent::Usage { input_tokens: 5, output_tokens: 2 },
            ]
        );
    }

    #[test]
    fn empty_delta_yields_nothing() {
        assert!(parse_all(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).is_empty());
    }

    #[test]
    fn done_sentinel() {
        assert_eq!(parse("data: [DONE]"), ResponseEvent::Done);
    }

    #[test]
    fn drain_retains_incomplete_last_line() {
        let mut buf = String::from("data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\r\ndata: {\"cho");
        let events = drain_complete_sse_lines(&mut buf);
        assert_eq!(events.len(), 1);
        assert_eq!(buf, "data: {\"cho");
    }

    #[test]
    fn comment_lines_are_skipped() {
        let mut buf = String::from(": keep-alive\n\n");
        assert!(drain_complete_sse_lines(&mut buf).is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn messages_include_system_and_tool_round_trip() {
        let history = vec![
            Message::user("list"),
            Message::assistant(
                "",
                vec![ToolCallRequest { id: "c1".into(), name: "list_dir".into(), arguments: json!({"path": "."}) }],
            ),
            Message::tool_result("c1", "a.txt"),
        ];
        let wire = build_openai_messages("be brief", &history);
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["tool_calls"][0]["function"]["name"], "list_dir");
        assert_eq!(wire[2]["tool_calls"][0]["function"]["arguments"], r#"{"path":"."}"#);
        assert!(wire[2]["content"].is_null());
        assert_eq!(wire[3]["tool_call_id"], "c1");
    }

    #[test]
    fn body_omits_tools_when_none_allowed() {
        let p = OpenAiProvider::new("gpt-4.1", None, "http://x");
        let body = p.build_body(&CompletionRequest::default());
        assert!(body.get("tools").is_none());
        assert_eq!(body["stream"], true);
    }
}
