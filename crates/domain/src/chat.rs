//! Conversation state: messages, tool calls, and the append-only context.
//!
//! The context is mutated only by the coordinator. Everything else gets a
//! read-only view (`ChatContext::view`) that already excludes assistant
//! messages the user talked over almost immediately.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default cutoff below which an interrupted assistant message is elided
/// from the context shipped to the LLM. A product knob, not a protocol
/// invariant.
pub const DEFAULT_ELIDE_MS: u64 = 3000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Roles and tool calls
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One function call requested by the model.
///
/// `arguments` is the raw JSON string accumulated across streamed deltas;
/// it is parsed only at execution time. `result` is attached by the tools
/// handler and merged back into the context as a tool-role message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Tool descriptor advertised to the LLM (JSON-schema parameters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChatMessage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One record in the conversation log.
///
/// Exactly one of `content` / `tool_calls` is populated, except tool-role
/// messages which always carry `content` plus the `tool_call_id` they
/// answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Milliseconds since the Unix epoch.
    pub ts: i64,
    pub role: ChatRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<u64>,
    /// How long the message had been audible when the user barged in, ms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interruption_ms: Option<u64>,
}

impl ChatMessage {
    fn new(role: ChatRole) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp_millis(),
            role,
            content: None,
            tool_calls: None,
            tool_call_id: None,
            turn: None,
            interruption_ms: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::new(ChatRole::System)
        }
    }

    pub fn user(text: impl Into<String>, turn: u64) -> Self {
        Self {
            content: Some(text.into()),
            turn: Some(turn),
            ..Self::new(ChatRole::User)
        }
    }

    pub fn assistant(text: impl Into<String>, turn: u64) -> Self {
        Self {
            content: Some(text.into()),
            turn: Some(turn),
            ..Self::new(ChatRole::Assistant)
        }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>, turn: u64) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            turn: Some(turn),
            ..Self::new(ChatRole::Assistant)
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        turn: u64,
    ) -> Self {
        Self {
            content: Some(content.into()),
            tool_call_id: Some(tool_call_id.into()),
            turn: Some(turn),
            ..Self::new(ChatRole::Tool)
        }
    }

    /// Was this message talked over before `elide_ms` of it played?
    pub fn interrupted_early(&self, elide_ms: u64) -> bool {
        self.interruption_ms.is_some_and(|ms| ms < elide_ms)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChatContext
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ordered, append-only conversation log. The first message is always the
/// system prompt.
#[derive(Debug)]
pub struct ChatContext {
    messages: Vec<ChatMessage>,
    elide_ms: u64,
}

impl Default for ChatContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatContext {
    pub fn new() -> Self {
        Self::with_elide_ms(DEFAULT_ELIDE_MS)
    }

    pub fn with_elide_ms(elide_ms: u64) -> Self {
        Self {
            messages: Vec::new(),
            elide_ms,
        }
    }

    /// Append a message, returning a reference to the stored record.
    pub fn append(&mut self, message: ChatMessage) -> &ChatMessage {
        self.messages.push(message);
        self.messages.last().expect("just pushed")
    }

    /// Mark the in-flight assistant message for `turn` as interrupted after
    /// `played_secs` of audio. Only the tail is scanned; calling again for
    /// the same turn overwrites the previous mark (last write wins).
    pub fn interrupt(&mut self, turn: u64, played_secs: f64) {
        let ms = (played_secs * 1000.0) as u64;
        for message in self.messages.iter_mut().rev().take(5) {
            if message.turn == Some(turn) && message.role == ChatRole::Assistant {
                tracing::warn!(turn, played_ms = ms, "assistant message interrupted");
                message.interruption_ms = Some(ms);
            }
        }
    }

    /// The message list shipped to the LLM: everything except assistant
    /// messages that were interrupted before the elide cutoff.
    pub fn view(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| !m.interrupted_early(self.elide_ms))
            .cloned()
            .collect()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChatLog — append-only JSONL persistence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Writes every appended message as one JSON line. Non-ASCII text is
/// preserved verbatim (serde_json never escapes it).
pub struct ChatLog {
    path: PathBuf,
}

impl ChatLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, message: &ChatMessage) -> Result<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_order() {
        let mut ctx = ChatContext::new();
        ctx.append(ChatMessage::system("sp"));
        ctx.append(ChatMessage::user("one", 2));
        ctx.append(ChatMessage::assistant("two", 2));

        let roles: Vec<_> = ctx.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![ChatRole::System, ChatRole::User, ChatRole::Assistant]
        );
    }

    #[test]
    fn interrupt_marks_matching_turn_only() {
        let mut ctx = ChatContext::new();
        ctx.append(ChatMessage::system("sp"));
        ctx.append(ChatMessage::assistant("old", 2));
        ctx.append(ChatMessage::assistant("current", 3));

        ctx.interrupt(3, 1.2);

        assert_eq!(ctx.messages()[1].interruption_ms, None);
        assert_eq!(ctx.messages()[2].interruption_ms, Some(1200));
    }

    #[test]
    fn interrupt_last_write_wins() {
        let mut ctx = ChatContext::new();
        ctx.append(ChatMessage::assistant("a", 2));
        ctx.interrupt(2, 0.5);
        ctx.interrupt(2, 2.5);
        assert_eq!(ctx.messages()[0].interruption_ms, Some(2500));
    }

    #[test]
    fn view_elides_early_interrupted_assistant() {
        let mut ctx = ChatContext::new();
        ctx.append(ChatMessage::system("sp"));
        ctx.append(ChatMessage::assistant("cut off", 2));
        ctx.append(ChatMessage::assistant("played long enough", 3));
        ctx.interrupt(2, 1.2); // 1200 ms < 3000 ms
        ctx.interrupt(3, 3.5); // 3500 ms, kept

        let view = ctx.view();
        assert_eq!(view.len(), 2);
        assert_eq!(view[1].content.as_deref(), Some("played long enough"));
    }

    #[test]
    fn view_does_not_reorder() {
        let mut ctx = ChatContext::new();
        ctx.append(ChatMessage::system("sp"));
        ctx.append(ChatMessage::user("q", 2));
        ctx.append(ChatMessage::assistant("a", 2));
        let view = ctx.view();
        assert_eq!(view[1].content.as_deref(), Some("q"));
        assert_eq!(view[2].content.as_deref(), Some("a"));
    }

    #[test]
    fn tool_message_carries_content_and_call_id() {
        let msg = ChatMessage::tool_result("call_1", "42 degrees", 2);
        assert_eq!(msg.role, ChatRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(msg.content.is_some());
    }

    #[test]
    fn chat_log_preserves_non_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let log = ChatLog::new(dir.path().join("db.jsonl"));
        log.append(&ChatMessage::user("привет", 2)).unwrap();
        log.append(&ChatMessage::assistant("¡hola!", 2)).unwrap();

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.contains("привет"));
        assert!(raw.contains("¡hola!"));
    }
}
