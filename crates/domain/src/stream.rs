//! Provider-agnostic streaming types.

use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// A boxed async stream, used for provider streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted while streaming a chat completion.
///
/// Tool-call deltas keep the wire shape: they arrive indexed, the first
/// delta for an index carries `id` and `name`, later deltas only append
/// to `arguments`. Aggregation happens in the LLM worker, not here.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum LlmStreamEvent {
    /// A text content fragment.
    #[serde(rename = "token")]
    Token { text: String },

    /// One tool-call fragment.
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta {
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },

    /// The stream finished ("stop", "tool_calls", ...).
    #[serde(rename = "done")]
    Done { finish_reason: Option<String> },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// STT streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events consumed from the streaming ASR session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SttEvent {
    Open,
    Close,
    Transcript {
        text: String,
        confidence: f32,
        is_final: bool,
        speech_final: bool,
        duration: f32,
    },
    UtteranceEnd,
    Metadata { duration: f32 },
    Error { message: String },
}
