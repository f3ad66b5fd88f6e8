// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ToolPermission;
use crate::tool::{required_str, Tool, ToolCall, ToolOutput};

const DEFAULT_MAX_BYTES: usize = 100_000;

pub struct FetchTool {
    client: reqwest::Client,
}

impl Default for FetchTool {
    fn default() -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("meto/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl Tool for FetchTool {
    fn name(&self) -> &str {
        "fetch"
    }

    fn description(&self) -> &str {
        "Fetch an http(s) URL and return its body. HTML is converted to plain text, \
         JSON is pretty-printed. The body is capped at max_bytes (default 100000)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch (http or https)"
                },
                "max_bytes": {
                    "type": "integer",
                    "description": "Maximum number of body bytes to read (default 100000)"
                }
            },
            "required": ["url"]
        })
    }

    fn permission(&self) -> ToolPermission {
        ToolPermission::Always { detail_arg: "url" }
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let url = match required_str(call, "url") {
            Ok(u) => u,
            Err(out) => return out,
        };
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return ToolOutput::err(&call.id, format!("unsupported URL scheme: {url}"));
        }
        let max_bytes = call
            .args
            .get("max_bytes")
            .and_then(Value::as_u64)
            .map(|b| b as usize)
            .unwrap_or(DEFAULT_MAX_BYTES);

        debug!(url = %url, max_bytes, "fetch tool");

        match self.fetch(url, max_bytes).await {
            Ok(content) => ToolOutput::ok(&call.id, content),
            Err(e) => ToolOutput::err(&call.id, format!("fetch error: {e}")),
        }
    }
}

impl FetchTool {
    async fn fetch(&self, url: &str, max_bytes: usize) -> anyhow::Result<String> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        let mut body: Vec<u8> = Vec::new();
        let mut cut = false;
        while let Some(chunk) = response.chunk().await? {
            let room = max_bytes.saturating_sub(body.len());
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                cut = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }

        let text = String::from_utf8_lossy(&body).into_owned();
        let mut content = render_body(&content_type, text);
        if cut {
            content.push_str(&format!("\n...[body truncated at {max_bytes} bytes]"));
        }
        if !status.is_success() {
            anyhow::bail!("HTTP {status}\n{content}");
        }
        Ok(content)
    }
}

fn render_body(content_type: &str, body: String) -> String {
    if content_type.contains("html") {
        html_to_text(&body)
    } else if content_type.contains("json") {
        match serde_json::from_str::<Value>(&body) {
            Ok(v) => serde_json::to_string_pretty(&v).unwrap_or(body),
            Err(_) => body,
        }
    } else {
        body
    }
}

/// Convert HTML to plain text using html2text.
fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_strips_tags() {
        let text = render_body("text/html; charset=utf-8", "<html><body><h1>Hello</h1><p>World</p></body></html>".into());
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains("<h1>"));
    }

    #[test]
    fn json_is_pretty_printed() {
        let text = render_body("application/json", r#"{"a":1}"#.into());
        assert_eq!(text, "{\n  \"a\": 1\n}");
    }

    #[tokio::test]
    async fn non_http_scheme_is_rejected() {
        let call = ToolCall { id: "1".into(), name: "fetch".into(), args: json!({"url": "file:///etc/passwd"}) };
        let out = FetchTool::default().execute(&call).await;
        assert!(out.is_error);
        assert!(out.content.contains("unsupported URL scheme"));
    }

    #[test]
    fn fetch_always_asks_with_url_detail() {
        assert_eq!(FetchTool::default().permission(), ToolPermission::Always { detail_arg: "url" });
    }
}
