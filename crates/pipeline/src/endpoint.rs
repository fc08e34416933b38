//! Endpointing: deciding that the user has finished their turn.
//!
//! The decision combines instantaneous VAD state, short/long silence
//! ratios, elapsed silence, and text features of what was said so far.
//! All the magic numbers live in [`EndpointPolicy`] so tuning never
//! touches the coordinator's state machine.

use std::sync::OnceLock;

use cb_domain::event::VadSample;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Question heuristic
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const QUESTION_WORDS: &[&str] = &[
    "what", "where", "when", "why", "how", "who", "which", "whose",
];

fn auxiliary_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(
            r"^(do|does|did|is|are|was|were|can|could|should|would|will|shall|have|has|had)\b",
        )
        .expect("static regex")
    })
}

fn tag_question_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(
            r", (isn[’']t it|aren[’']t you|don[’']t you|didn[’']t he|won[’']t they|can[’']t we)\b",
        )
        .expect("static regex")
    })
}

/// Slice off the last sentence: everything after the last `.`/`!`/`?`
/// that is followed by whitespace.
fn last_sentence(text: &str) -> &str {
    let trimmed = text.trim();
    let mut start = 0;
    let mut chars = trimmed.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(j, next)) = chars.peek() {
                if next.is_whitespace() {
                    start = j;
                }
            }
        }
    }
    trimmed[start..].trim_start()
}

/// Is the last sentence of `text` a finished question?
///
/// True when it ends with `?`, starts with a wh-word, starts with an
/// auxiliary ("do you", "is she", ...), or carries a tag question.
pub fn is_last_sentence_a_question(text: &str) -> bool {
    let sentence = last_sentence(text).to_lowercase();
    if sentence.is_empty() {
        return false;
    }
    if sentence.ends_with('?') {
        return true;
    }
    if let Some(first_word) = sentence.split_whitespace().next() {
        if QUESTION_WORDS.contains(&first_word) {
            return true;
        }
    }
    if auxiliary_re().is_match(&sentence) {
        return true;
    }
    tag_question_re().is_match(&sentence)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EndpointPolicy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tunable endpointing thresholds. Defaults are the product-tuned values.
#[derive(Debug, Clone)]
pub struct EndpointPolicy {
    /// Text shorter than this uses the fast path.
    pub short_text_chars: usize,
    /// Fast path: silence needed after a short question.
    pub short_question_silence: f64,
    /// Fast path: silence needed with a near-total short silence ratio.
    pub short_statement_silence: f64,
    /// Long path: silence needed after a question.
    pub long_question_silence: f64,
    /// Long path: silence needed after a terminated statement.
    pub long_statement_silence: f64,
    /// Long path: silence needed otherwise, and whenever the user asked
    /// for time ("let me think").
    pub long_hesitation_silence: f64,
    /// Silence-ratio floor shared by both paths.
    pub ratio_floor: f32,
}

impl Default for EndpointPolicy {
    fn default() -> Self {
        Self {
            short_text_chars: 50,
            short_question_silence: 0.5,
            short_statement_silence: 1.0,
            long_question_silence: 1.0,
            long_statement_silence: 2.0,
            long_hesitation_silence: 3.0,
            ratio_floor: 0.9,
        }
    }
}

/// Phrases that push the threshold out to the hesitation maximum.
const HOLD_PHRASES: &[&str] = &["let me think", "let me explain", "let me finish"];

impl EndpointPolicy {
    /// Commit the turn now? First matching rule wins.
    pub fn should_take_turn(&self, sample: &VadSample, silence_duration: f64, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        let is_quiet_now = (sample.speech_prob < 0.1 && sample.mean_prob < 0.05)
            || (sample.speech_prob < 0.01 && sample.mean_prob < 0.01);
        if !is_quiet_now {
            return false;
        }

        let is_question = is_last_sentence_a_question(text);

        if text.chars().count() < self.short_text_chars {
            if is_question && silence_duration > self.short_question_silence {
                return true;
            }
            return sample.silence_ratio_short > self.ratio_floor
                && silence_duration > self.short_statement_silence;
        }

        let mut threshold = if is_question {
            self.long_question_silence
        } else if text.ends_with('.') || text.ends_with('!') {
            self.long_statement_silence
        } else {
            self.long_hesitation_silence
        };

        // "let me think" near the end means the user asked for time
        let tail: String = {
            let chars: Vec<char> = text.chars().collect();
            let from = chars.len().saturating_sub(300);
            chars[from..].iter().collect::<String>().to_lowercase()
        };
        if HOLD_PHRASES.iter().any(|p| tail.contains(p)) {
            threshold = self.long_hesitation_silence;
        }

        sample.silence_ratio_long > self.ratio_floor && silence_duration > threshold
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
