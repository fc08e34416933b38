//! Chat-completions adapter (OpenAI wire format).
//!
//! The request contract is fixed: `stream=true`, `temperature`/`top_p`
//! from config, `tool_choice="auto"`, `parallel_tool_calls=false`. Tool
//! call deltas are passed through raw (index + optional id/name + argument
//! fragment); aggregation is the LLM worker's job.

use cb_domain::chat::{ChatMessage, ChatRole, ToolDescriptor};
use cb_domain::config::{Config, LlmConfig};
use cb_domain::stream::{BoxStream, LlmStreamEvent};
use cb_domain::{Error, Result};
use serde_json::Value;

use crate::sse::SseBuffer;
use crate::traits::{ChatRequest, LlmProvider};
use crate::util::from_reqwest;

pub struct OpenAiChatProvider {
    base_url: String,
    model: String,
    temperature: f32,
    top_p: f32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiChatProvider {
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = Config::api_key(&cfg.api_key_env)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            api_key,
            client,
        })
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_wire).collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "top_p": self.top_p,
            "stream": true,
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_wire).collect();
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = Value::String("auto".into());
            body["parallel_tool_calls"] = Value::Bool(false);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    }
}

fn msg_to_wire(msg: &ChatMessage) -> Value {
    match msg.role {
        ChatRole::Tool => serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.as_deref().unwrap_or(""),
            "content": msg.content.as_deref().unwrap_or(""),
        }),
        ChatRole::Assistant if msg.tool_calls.is_some() => {
            let calls: Vec<Value> = msg
                .tool_calls
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.id,
                        "type": "function",
                        "function": { "name": tc.name, "arguments": tc.arguments },
                    })
                })
                .collect();
            let mut obj = serde_json::json!({ "role": "assistant", "tool_calls": calls });
            if let Some(content) = &msg.content {
                obj["content"] = Value::String(content.clone());
            } else {
                obj["content"] = Value::Null;
            }
            obj
        }
        _ => serde_json::json!({
            "role": role_str(msg.role),
            "content": msg.content.as_deref().unwrap_or(""),
        }),
    }
}

fn tool_to_wire(tool: &ToolDescriptor) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Delta parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pull the response body through the SSE buffer, parsing each completed
/// event into deltas. A body error ends the stream after surfacing it;
/// anything still buffered when the body closes is flushed.
fn delta_event_stream(response: reqwest::Response) -> BoxStream<'static, Result<LlmStreamEvent>> {
    Box::pin(async_stream::stream! {
        let mut response = response;
        let mut sse = SseBuffer::new();
        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    for data in sse.feed(&bytes) {
                        for event in parse_sse_data(&data) {
                            yield event;
                        }
                    }
                }
                Ok(None) => {
                    if let Some(data) = sse.finish() {
                        for event in parse_sse_data(&data) {
                            yield event;
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    break;
                }
            }
        }
    })
}

fn parse_sse_data(data: &str) -> Vec<Result<LlmStreamEvent>> {
    if data.trim() == "[DONE]" {
        // the finish chunk already carried the reason; nothing left to say
        return Vec::new();
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    let Some(choice) = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
    else {
        return Vec::new();
    };

    if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
        return vec![Ok(LlmStreamEvent::Done {
            finish_reason: Some(fr.to_string()),
        })];
    }

    let delta = choice.get("delta").unwrap_or(&Value::Null);
    let mut events = Vec::new();

    if let Some(tc_arr) = delta.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tc_arr {
            let index = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            let id = tc
                .get("id")
                .and_then(|v| v.as_str())
                .map(ToString::to_string);
            let name = tc
                .get("function")
                .and_then(|f| f.get("name"))
                .and_then(|v| v.as_str())
                .map(ToString::to_string);
            let arguments = tc
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            events.push(Ok(LlmStreamEvent::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            }));
        }
    }

    if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            events.push(Ok(LlmStreamEvent::Token {
                text: text.to_string(),
            }));
        }
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiChatProvider {
    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<LlmStreamEvent>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(req);

        tracing::debug!(model = %self.model, messages = req.messages.len(), "chat stream request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Provider {
                provider: "openai_chat".into(),
                message: format!("HTTP {} - {}", status.as_u16(), err_text),
            });
        }

        Ok(delta_event_stream(resp))
    }

    fn provider_id(&self) -> &str {
        "openai_chat"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
