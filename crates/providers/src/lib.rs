//! Vendor adapters for the three external services the pipeline talks to:
//! a chat-completions LLM (SSE), a streaming speech synthesizer (Ogg-Opus
//! over HTTP), and a streaming speech recognizer (websocket).
//!
//! Everything is behind a trait so the pipeline and its tests never see a
//! vendor wire format.

pub mod deepgram;
pub mod openai_chat;
pub mod openai_speech;
pub(crate) mod sse;
pub mod traits;
pub(crate) mod util;

pub use deepgram::DeepgramRecognizer;
pub use openai_chat::OpenAiChatProvider;
pub use openai_speech::OpenAiSpeechProvider;
pub use traits::{ChatRequest, LlmProvider, SpeechRecognizer, SpeechSynthesizer, SttSessionHandle};
