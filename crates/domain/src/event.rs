//! Events flowing over the session bus.
//!
//! Events are immutable after publication (the bus fans out `Arc<Event>`).
//! The `kind()` string doubles as the subscription key and the log label.
//! Audio itself does not travel on the bus — media pumps feed the VAD and
//! STT workers directly; the bus carries the semantic layer on top.

use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, ToolCall, ToolDescriptor};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VAD sample
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-chunk voice-activity statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VadSample {
    /// Model probability for the current 512-sample chunk.
    pub speech_prob: f32,
    /// Mean probability over the last 5 chunks.
    pub mean_prob: f32,
    /// Fraction of the last 5 chunks below 0.05.
    pub silence_ratio_short: f32,
    /// Fraction of the last 20 chunks below 0.05.
    pub silence_ratio_long: f32,
}

/// Why TTS playback stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    /// The packet queue drained naturally.
    End,
    /// A barge-in abort advanced the turn fence.
    Abort,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub enum Event {
    // ── VAD ───────────────────────────────────────────────────────
    VadData(VadSample),
    VadStart,
    VadEnd,

    // ── STT ───────────────────────────────────────────────────────
    SpeechInterim { text: String, confidence: f32 },
    SpeechFinal { text: String, confidence: f32 },
    UtteranceEnd { text: String },
    SttSave,
    AudioLogReady { file_name: String },

    // ── LLM ───────────────────────────────────────────────────────
    LlmRequest {
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDescriptor>,
        turn: u64,
    },
    LlmResponse { text: String, turn: u64, first: bool },
    LlmToolCalls { tool_calls: Vec<ToolCall>, turn: u64 },
    LlmResponseDone { turn: u64 },
    LlmAbort { turn: u64 },

    // ── TTS ───────────────────────────────────────────────────────
    TtsRequest { text: String, turn: u64 },
    TtsAbort { turn: u64 },
    TtsSpeechStarted,
    TtsSpeechStopped { reason: StopReason },

    // ── Transport ─────────────────────────────────────────────────
    RtcMessage { payload: String },
}

impl Event {
    /// Stable string identifier, used for subscription and logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::VadData(_) => "on_vad_data",
            Event::VadStart => "on_vad_start",
            Event::VadEnd => "on_vad_end",
            Event::SpeechInterim { .. } => "on_speech_interim",
            Event::SpeechFinal { .. } => "on_speech_final",
            Event::UtteranceEnd { .. } => "on_utterance_end",
            Event::SttSave => "stt_save",
            Event::AudioLogReady { .. } => "audio_log_ready",
            Event::LlmRequest { .. } => "llm_request",
            Event::LlmResponse { .. } => "llm_response",
            Event::LlmToolCalls { .. } => "llm_tool_calls",
            Event::LlmResponseDone { .. } => "llm_response_done",
            Event::LlmAbort { .. } => "llm_abort",
            Event::TtsRequest { .. } => "tts_request",
            Event::TtsAbort { .. } => "tts_abort",
            Event::TtsSpeechStarted => "tts_speech_started",
            Event::TtsSpeechStopped { .. } => "tts_speech_stopped",
            Event::RtcMessage { .. } => "rtc_message",
        }
    }
}
