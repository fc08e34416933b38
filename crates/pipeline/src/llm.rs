//! LLM worker: streams chat completions, chunks text into sentence units,
//! aggregates tool-call fragments, and honors barge-in cancellation.
//!
//! At most one call is in flight. A new `llm_request` cancels the current
//! one (that is how the coordinator forces an abort), and `llm_abort`
//! cancels without a replacement. Cancellation is silent — no tail flush,
//! because that output would be stale — but every exit path still emits
//! `llm_response_done` so the coordinator is never left waiting.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinHandle;

use cb_domain::chat::ToolCall;
use cb_domain::event::Event;
use cb_domain::stream::LlmStreamEvent;
use cb_domain::{Error, Result};
use cb_providers::{ChatRequest, LlmProvider};

use crate::bus::EventBus;
use crate::cancel::CancelToken;
use crate::chunker::SentenceChunker;
use crate::worker::Worker;

pub struct LlmWorker {
    provider: Arc<dyn LlmProvider>,
    bus: EventBus,
    current: Option<(CancelToken, JoinHandle<()>)>,
}

impl LlmWorker {
    pub fn new(provider: Arc<dyn LlmProvider>, bus: EventBus) -> Self {
        Self {
            provider,
            bus,
            current: None,
        }
    }

    fn cancel_current(&mut self) {
        if let Some((token, _handle)) = self.current.take() {
            // never awaited: the turn fence catches whatever the dying
            // task still manages to emit
            token.cancel();
        }
    }
}

#[async_trait::async_trait]
impl Worker for LlmWorker {
    fn name(&self) -> &'static str {
        "llm"
    }

    fn subscriptions(&self) -> &'static [&'static str] {
        &["llm_request", "llm_abort"]
    }

    async fn on_event(&mut self, event: Arc<Event>) -> Result<()> {
        match &*event {
            Event::LlmRequest {
                messages,
                tools,
                turn,
            } => {
                self.cancel_current();
                let token = CancelToken::new();
                let handle = tokio::spawn(run_request(
                    self.provider.clone(),
                    ChatRequest {
                        messages: messages.clone(),
                        tools: tools.clone(),
                    },
                    *turn,
                    self.bus.clone(),
                    token.clone(),
                ));
                self.current = Some((token, handle));
            }
            Event::LlmAbort { turn } => {
                tracing::debug!(turn, "llm abort");
                self.cancel_current();
            }
            _ => {}
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The streaming call
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_request(
    provider: Arc<dyn LlmProvider>,
    req: ChatRequest,
    turn: u64,
    bus: EventBus,
    cancel: CancelToken,
) {
    match consume_stream(provider, req, turn, &bus, &cancel).await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => tracing::debug!(turn, "llm call cancelled"),
        Err(e) => tracing::warn!(turn, error = %e, "llm call failed"),
    }
    // one done per request, on every exit path
    bus.publish(Event::LlmResponseDone { turn });
}

async fn consume_stream(
    provider: Arc<dyn LlmProvider>,
    req: ChatRequest,
    turn: u64,
    bus: &EventBus,
    cancel: &CancelToken,
) -> Result<()> {
    let mut stream = provider.chat_stream(&req).await?;

    let mut chunker = SentenceChunker::new();
    let mut calls: BTreeMap<u32, ToolCall> = BTreeMap::new();
    let mut finish_reason: Option<String> = None;

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            item = stream.next() => item,
        };
        let Some(item) = item else { break };

        let event = match item {
            Ok(event) => event,
            Err(Error::Json(e)) => {
                // malformed vendor delta: skip it, keep the stream
                tracing::warn!(turn, error = %e, "skipping malformed delta");
                continue;
            }
            Err(e) => return Err(e),
        };

        match event {
            LlmStreamEvent::Token { text } => {
                if let Some(chunk) = chunker.push(&text) {
                    let first = chunker.emitted() == 1;
                    bus.publish(Event::LlmResponse {
                        text: chunk,
                        turn,
                        first,
                    });
                }
            }
            LlmStreamEvent::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => {
                let call = calls.entry(index).or_insert_with(|| ToolCall {
                    id: String::new(),
                    name: String::new(),
                    arguments: String::new(),
                    result: None,
                });
                if let Some(id) = id {
                    call.id = id;
                }
                if let Some(name) = name {
                    call.name = name;
                }
                call.arguments.push_str(&arguments);
            }
            LlmStreamEvent::Done {
                finish_reason: reason,
            } => {
                finish_reason = reason;
                break;
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    if let Some(chunk) = chunker.finish() {
        let first = chunker.emitted() == 1;
        bus.publish(Event::LlmResponse {
            text: chunk,
            turn,
            first,
        });
    }

    if finish_reason.as_deref() == Some("tool_calls") && !calls.is_empty() {
        // BTreeMap iteration gives ascending index order
        let tool_calls: Vec<ToolCall> = calls.into_values().collect();
        tracing::debug!(turn, count = tool_calls.len(), "aggregated tool calls");
        bus.publish(Event::LlmToolCalls { tool_calls, turn });
    }

    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
