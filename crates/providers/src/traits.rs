use cb_domain::chat::{ChatMessage, ToolDescriptor};
use cb_domain::stream::{BoxStream, LlmStreamEvent, SttEvent};
use cb_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A streaming chat-completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The conversation view to send (already filtered by the coordinator).
    pub messages: Vec<ChatMessage>,
    /// Tool descriptors the model may invoke. Empty = no tools.
    pub tools: Vec<ToolDescriptor>,
}

/// A streaming chat-completions backend.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Open a streaming completion and return the delta stream.
    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<LlmStreamEvent>>>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TTS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A streaming speech synthesizer. The byte stream is an Ogg-Opus
/// container; the media layer handles page framing.
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<BoxStream<'static, Result<Vec<u8>>>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// STT
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handles for one live recognition session. Raw 16-bit 48 kHz PCM goes
/// into `audio`; vendor events come back on `events`. Dropping `audio`
/// closes the session.
pub struct SttSessionHandle {
    pub audio: tokio::sync::mpsc::Sender<Vec<u8>>,
    pub events: tokio::sync::mpsc::UnboundedReceiver<SttEvent>,
}

/// A streaming speech recognizer maintaining a persistent session.
#[async_trait::async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn start(&self) -> Result<SttSessionHandle>;
}
