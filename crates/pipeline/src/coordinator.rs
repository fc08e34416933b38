//! The coordinator: turn taking, barge-in, and chat-context mutation.
//!
//! It owns the only mutable copy of the conversation. Speech fragments
//! accumulate in `unhandled_text` until the endpointing policy decides the
//! user is done; committing a turn aborts whatever the agent was doing,
//! bumps the turn number, and sends the context to the LLM. Every event
//! that crosses a stage boundary carries its turn number, and anything
//! tagged below `current_turn` is dropped on arrival — that fence, not
//! cancellation timing, is what keeps stale work out.

use std::sync::Arc;

use tokio::time::Instant;

use cb_domain::chat::{ChatContext, ChatLog, ChatMessage};
use cb_domain::config::TurnConfig;
use cb_domain::event::{Event, VadSample};
use cb_domain::Result;

use crate::bus::EventBus;
use crate::endpoint::EndpointPolicy;
use crate::tools::ToolsHandler;
use crate::worker::Worker;

/// A VAD sample at or above this probability counts as a voice tick and
/// resets the silence clock.
const VOICE_TICK_PROB: f32 = 0.1;

/// Interim results below this confidence never trigger a barge-in.
const INTERIM_CONFIDENCE_FLOOR: f32 = 0.8;

/// Commands handled locally, never sent to the model.
const TECHNICAL_COMMANDS: &[&str] = &["stop", "pause"];

fn system_prompt() -> String {
    let date = chrono::Local::now().format("%A, %B %-d, %Y");
    format!(
        "1. You are a voice assistant. Your interface with users will be voice only. \
         2. Today is {date}. \
         3. Your goal is to unobtrusively improve users conversational English. \
         4. You are strict sometimes and not very supportive. \
         5. No special formatting or headings. Don't use numbered lists. \
         6. You use Speech-to-Text for user input. Do not assume perfect recognition. STT is \
         imperfect and might misinterpret or autocorrect due to recognition errors or assumptions. \
         7. Prioritize the context of the recognized sentence rather than detected \
         spelling or grammar issues. \
         IMPORTANT: always remember that you are a voice assistant with no visual interface. \
         IMPORTANT: Avoid follow-up questions. Use laconic and concise language. "
    )
}

pub struct Coordinator {
    bus: EventBus,
    chat: ChatContext,
    chat_log: Option<ChatLog>,
    tools: Arc<ToolsHandler>,
    policy: EndpointPolicy,
    config: TurnConfig,
    current_turn: u64,
    unhandled_text: String,
    last_voice: Instant,
    tts_last_speech_start: Option<Instant>,
}

impl Coordinator {
    pub fn new(
        bus: EventBus,
        tools: Arc<ToolsHandler>,
        chat_log: Option<ChatLog>,
        config: TurnConfig,
    ) -> Self {
        let mut chat = ChatContext::with_elide_ms(config.interrupt_elide_ms);
        let seed = ChatMessage::system(system_prompt());
        if let Some(log) = &chat_log {
            if let Err(e) = log.append(&seed) {
                tracing::warn!(error = %e, "chat log write failed");
            }
        }
        chat.append(seed);

        Self {
            bus,
            chat,
            chat_log,
            tools,
            policy: EndpointPolicy::default(),
            config,
            current_turn: 1,
            unhandled_text: String::new(),
            last_voice: Instant::now(),
            tts_last_speech_start: None,
        }
    }

    fn silence_duration(&self) -> f64 {
        self.last_voice.elapsed().as_secs_f64()
    }

    fn append(&mut self, message: ChatMessage) {
        if let Some(log) = &self.chat_log {
            if let Err(e) = log.append(&message) {
                tracing::warn!(error = %e, "chat log write failed");
            }
        }
        self.chat.append(message);
    }

    // ── VAD ticks ─────────────────────────────────────────────────

    fn on_vad_data(&mut self, sample: VadSample) {
        if sample.speech_prob >= VOICE_TICK_PROB {
            self.last_voice = Instant::now();
            return;
        }

        let silence = self.silence_duration();

        if silence > self.config.stale_text_reset_secs && !self.unhandled_text.is_empty() {
            tracing::info!(
                text = %self.unhandled_text,
                silence,
                "dropping stale unhandled text"
            );
            self.unhandled_text.clear();
            return;
        }

        if !self.unhandled_text.is_empty()
            && self
                .policy
                .should_take_turn(&sample, silence, &self.unhandled_text)
        {
            self.commit_turn();
        }
    }

    // ── Speech ingestion ──────────────────────────────────────────

    fn on_speech_interim(&mut self, text: &str, confidence: f32) {
        // continued speech over agent audio: cut the agent off, but the
        // text itself stays with the recognizer until it finalizes
        if self.silence_duration() < self.config.stale_speech_secs
            && !text.is_empty()
            && confidence > INTERIM_CONFIDENCE_FLOOR
        {
            self.abort_agent_speech();
        }
    }

    fn on_speech_text(&mut self, text: &str) {
        let silence = self.silence_duration();
        if silence > self.config.stale_speech_secs {
            tracing::info!(%text, silence, "discarding late transcript");
            return;
        }
        let text = text.trim();
        if !text.is_empty() {
            if !self.unhandled_text.is_empty() {
                self.unhandled_text.push(' ');
            }
            self.unhandled_text.push_str(text);
        }
        self.abort_agent_speech();
    }

    // ── Turn commit ───────────────────────────────────────────────

    fn commit_turn(&mut self) {
        let text = std::mem::take(&mut self.unhandled_text);
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }

        if is_technical_command(&text) {
            tracing::info!(%text, "technical command handled locally");
            self.abort_agent_speech();
            return;
        }

        self.abort_agent_speech();
        self.current_turn += 1;
        let turn = self.current_turn;
        tracing::info!(turn, %text, "user turn committed");

        self.append(ChatMessage::user(text, turn));
        self.emit_llm_request(turn);
    }

    fn emit_llm_request(&self, turn: u64) {
        self.bus.publish(Event::LlmRequest {
            messages: self.chat.view(),
            tools: self.tools.descriptors(),
            turn,
        });
    }

    /// Barge-in: mark the audible assistant message as interrupted (when
    /// the agent only just started talking) and abort both downstream
    /// stages for the current turn.
    fn abort_agent_speech(&mut self) {
        if let Some(start) = self.tts_last_speech_start {
            let elapsed = start.elapsed().as_secs_f64();
            if elapsed < self.config.barge_in_window_secs {
                self.chat.interrupt(self.current_turn, elapsed);
            }
        }
        self.bus.publish(Event::TtsAbort {
            turn: self.current_turn,
        });
        self.bus.publish(Event::LlmAbort {
            turn: self.current_turn,
        });
    }

    // ── Assistant path ────────────────────────────────────────────

    fn on_llm_response(&mut self, text: &str, turn: u64) {
        if turn < self.current_turn {
            tracing::debug!(turn, current = self.current_turn, "stale llm response dropped");
            return;
        }
        self.append(ChatMessage::assistant(text, turn));
        self.bus.publish(Event::TtsRequest {
            text: text.to_string(),
            turn,
        });
    }

    async fn on_llm_tool_calls(&mut self, calls: Vec<cb_domain::chat::ToolCall>, turn: u64) {
        if turn < self.current_turn {
            tracing::debug!(turn, current = self.current_turn, "stale tool calls dropped");
            return;
        }

        self.append(ChatMessage::assistant_tool_calls(calls.clone(), turn));

        let executed = self.tools.execute(calls).await;
        for call in executed {
            let content = call
                .result
                .unwrap_or_else(|| "error: tool produced no result".into());
            self.append(ChatMessage::tool_result(call.id, content, turn));
        }

        // give other handlers a chance before re-entering the model
        tokio::task::yield_now().await;
        self.emit_llm_request(turn);
    }
}

fn is_technical_command(text: &str) -> bool {
    let normalized = text.to_lowercase();
    let normalized = normalized.trim().trim_end_matches(['.', '!']);
    TECHNICAL_COMMANDS.contains(&normalized)
}

#[async_trait::async_trait]
impl Worker for Coordinator {
    fn name(&self) -> &'static str {
        "coordinator"
    }

    fn subscriptions(&self) -> &'static [&'static str] {
        &[
            "on_vad_data",
            "on_speech_interim",
            "on_speech_final",
            "on_utterance_end",
            "llm_response",
            "llm_tool_calls",
            "llm_response_done",
            "tts_speech_started",
            "tts_speech_stopped",
            "rtc_message",
        ]
    }

    async fn on_event(&mut self, event: Arc<Event>) -> Result<()> {
        match &*event {
            Event::VadData(sample) => self.on_vad_data(*sample),
            Event::SpeechInterim { text, confidence } => {
                self.on_speech_interim(text, *confidence)
            }
            Event::SpeechFinal { text, .. } => self.on_speech_text(text),
            Event::UtteranceEnd { text } => self.on_speech_text(text),
            Event::LlmResponse { text, turn, .. } => self.on_llm_response(text, *turn),
            Event::LlmToolCalls { tool_calls, turn } => {
                self.on_llm_tool_calls(tool_calls.clone(), *turn).await
            }
            Event::LlmResponseDone { turn } => {
                tracing::debug!(turn, "llm response done");
            }
            Event::TtsSpeechStarted => {
                self.tts_last_speech_start = Some(Instant::now());
            }
            Event::TtsSpeechStopped { reason } => {
                tracing::debug!(?reason, "tts speech stopped");
            }
            Event::RtcMessage { payload } => match payload.as_str() {
                "f3" => {
                    tracing::info!("forced barge-in from data channel");
                    self.abort_agent_speech();
                }
                other => tracing::debug!(payload = other, "unhandled rtc message"),
            },
            _ => {}
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn technical_commands_normalize() {
        assert!(is_technical_command("Stop"));
        assert!(is_technical_command("stop."));
        assert!(is_technical_command("PAUSE!"));
        assert!(!is_technical_command("stop the music"));
    }

    #[test]
    fn system_prompt_is_dated() {
        let sp = system_prompt();
        assert!(sp.contains("voice assistant"));
        let year = chrono::Local::now().format("%Y").to_string();
        assert!(sp.contains(&year));
    }
}
