//! Configuration tree.
//!
//! Loaded once at startup from TOML (all fields defaulted, so an empty
//! file is valid) and validated before anything is wired up. API keys are
//! never stored in the file — each provider section names the environment
//! variable that holds its key, and a missing key is a validation error.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub vad: VadConfig,
    #[serde(default)]
    pub turns: TurnConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Directory holding the reference client (`index.html`, `client.js`).
    #[serde(default = "d_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
            static_dir: d_static_dir(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_openai_base")]
    pub base_url: String,
    #[serde(default = "d_llm_model")]
    pub model: String,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_top_p")]
    pub top_p: f32,
    #[serde(default = "d_openai_key_env")]
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_openai_base(),
            model: d_llm_model(),
            temperature: d_temperature(),
            top_p: d_top_p(),
            api_key_env: d_openai_key_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    #[serde(default = "d_stt_url")]
    pub url: String,
    #[serde(default = "d_stt_model")]
    pub model: String,
    #[serde(default = "d_stt_language")]
    pub language: String,
    /// Silence window (ms) after which the vendor sets `speech_final`.
    #[serde(default = "d_stt_endpointing_ms")]
    pub endpointing_ms: u32,
    #[serde(default = "d_stt_key_env")]
    pub api_key_env: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            url: d_stt_url(),
            model: d_stt_model(),
            language: d_stt_language(),
            endpointing_ms: d_stt_endpointing_ms(),
            api_key_env: d_stt_key_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "d_openai_base")]
    pub base_url: String,
    #[serde(default = "d_tts_model")]
    pub model: String,
    #[serde(default = "d_tts_voice")]
    pub voice: String,
    #[serde(default = "d_openai_key_env")]
    pub api_key_env: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: d_openai_base(),
            model: d_tts_model(),
            voice: d_tts_voice(),
            api_key_env: d_openai_key_env(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VAD / turn taking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// Chunk probability at or above which a chunk counts toward activation.
    #[serde(default = "d_activation_prob")]
    pub activation_prob: f32,
    /// Consecutive qualifying chunks needed to activate.
    #[serde(default = "d_activation_chunks")]
    pub activation_chunks: u32,
    /// Window mean at or below which an activated stretch deactivates.
    #[serde(default = "d_deactivation_mean")]
    pub deactivation_mean: f32,
    /// Chunks in the deactivation window.
    #[serde(default = "d_deactivation_window")]
    pub deactivation_window: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            activation_prob: d_activation_prob(),
            activation_chunks: d_activation_chunks(),
            deactivation_mean: d_deactivation_mean(),
            deactivation_window: d_deactivation_window(),
        }
    }
}

/// Turn-taking knobs consumed by the coordinator and the endpointing
/// policy. Empirically tuned; see the policy for how they combine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Assistant messages interrupted before this many ms are elided from
    /// the LLM context.
    #[serde(default = "d_elide_ms")]
    pub interrupt_elide_ms: u64,
    /// Barge-in only fires while the agent has been audible less than this.
    #[serde(default = "d_barge_in_window")]
    pub barge_in_window_secs: f64,
    /// Finals arriving after this much silence are discarded as spurious.
    #[serde(default = "d_stale_speech")]
    pub stale_speech_secs: f64,
    /// Unhandled text is dropped after this much silence.
    #[serde(default = "d_stale_text_reset")]
    pub stale_text_reset_secs: f64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            interrupt_elide_ms: d_elide_ms(),
            barge_in_window_secs: d_barge_in_window(),
            stale_speech_secs: d_stale_speech(),
            stale_text_reset_secs: d_stale_text_reset(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Conversation dump, one message per line.
    #[serde(default = "d_db_path")]
    pub db_path: PathBuf,
    /// Directory for inbound-audio snapshots.
    #[serde(default = "d_audio_log_dir")]
    pub audio_log_dir: PathBuf,
    /// Text file served by the `load_context` tool, when present.
    #[serde(default)]
    pub context_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: d_db_path(),
            audio_log_dir: d_audio_log_dir(),
            context_path: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Parse a TOML config file. A missing file yields the defaults.
    pub fn load(path: Option<&std::path::Path>) -> crate::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| crate::Error::Config(format!("{}: {e}", path.display())))
    }

    /// Validate the configuration, including the presence of provider API
    /// keys in the environment. Errors abort startup.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.port == 0 {
            issues.push(err("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            issues.push(err("server.host", "host must not be empty"));
        }
        if !self.server.static_dir.is_dir() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "server.static_dir".into(),
                message: format!(
                    "{} does not exist — reference client will 404",
                    self.server.static_dir.display()
                ),
            });
        }

        for (field, env) in [
            ("llm.api_key_env", &self.llm.api_key_env),
            ("stt.api_key_env", &self.stt.api_key_env),
            ("tts.api_key_env", &self.tts.api_key_env),
        ] {
            if std::env::var(env).map(|v| v.is_empty()).unwrap_or(true) {
                issues.push(err(field, &format!("environment variable {env} is not set")));
            }
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            issues.push(err("llm.temperature", "must be within [0.0, 2.0]"));
        }
        if !(0.0..=1.0).contains(&self.llm.top_p) {
            issues.push(err("llm.top_p", "must be within [0.0, 1.0]"));
        }

        issues
    }

    /// Resolve a provider API key from the environment.
    pub fn api_key(env_var: &str) -> crate::Result<String> {
        match std::env::var(env_var) {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err(crate::Error::Config(format!(
                "environment variable {env_var} is not set"
            ))),
        }
    }
}

fn err(field: &str, message: &str) -> ConfigIssue {
    ConfigIssue {
        severity: ConfigSeverity::Error,
        field: field.into(),
        message: message.into(),
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_port() -> u16 {
    8080
}
fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_static_dir() -> PathBuf {
    "static".into()
}
fn d_openai_base() -> String {
    "https://api.openai.com/v1".into()
}
fn d_llm_model() -> String {
    "gpt-4o-mini".into()
}
fn d_temperature() -> f32 {
    0.8
}
fn d_top_p() -> f32 {
    0.5
}
fn d_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn d_stt_url() -> String {
    "wss://api.deepgram.com/v1/listen".into()
}
fn d_stt_model() -> String {
    "nova-2".into()
}
fn d_stt_language() -> String {
    "en-US".into()
}
fn d_stt_endpointing_ms() -> u32 {
    100
}
fn d_stt_key_env() -> String {
    "DEEPGRAM_API_KEY".into()
}
fn d_tts_model() -> String {
    "tts-1".into()
}
fn d_tts_voice() -> String {
    "alloy".into()
}
fn d_activation_prob() -> f32 {
    0.2
}
fn d_activation_chunks() -> u32 {
    5
}
fn d_deactivation_mean() -> f32 {
    0.1
}
fn d_deactivation_window() -> usize {
    20
}
fn d_elide_ms() -> u64 {
    3000
}
fn d_barge_in_window() -> f64 {
    4.0
}
fn d_stale_speech() -> f64 {
    3.0
}
fn d_stale_text_reset() -> f64 {
    6.0
}
fn d_db_path() -> PathBuf {
    "db.jsonl".into()
}
fn d_audio_log_dir() -> PathBuf {
    "audio_log".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.tts.voice, "alloy");
        assert_eq!(config.turns.interrupt_elide_ms, 3000);
        assert_eq!(config.vad.activation_chunks, 5);
    }

    #[test]
    fn partial_toml_overrides() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [llm]
            temperature = 0.3
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.llm.temperature, 0.3);
        // untouched sections keep defaults
        assert_eq!(config.stt.endpointing_ms, 100);
    }

    #[test]
    fn zero_port_is_an_error() {
        let config: Config = toml::from_str("[server]\nport = 0").unwrap();
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "server.port" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn bad_sampling_params_are_errors() {
        let config: Config = toml::from_str("[llm]\ntemperature = 3.0\ntop_p = 1.5").unwrap();
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.field == "llm.temperature"));
        assert!(issues.iter().any(|i| i.field == "llm.top_p"));
    }
}
