//! Streaming speech-synthesis adapter (OpenAI audio API).
//!
//! Requests `response_format="opus"` and returns the raw Ogg-Opus byte
//! stream as it arrives; page framing happens in the media layer so the
//! TTS worker can start pacing packets before the request finishes.

use cb_domain::config::{Config, TtsConfig};
use cb_domain::stream::BoxStream;
use cb_domain::{Error, Result};

use crate::traits::SpeechSynthesizer;
use crate::util::from_reqwest;

pub struct OpenAiSpeechProvider {
    base_url: String,
    model: String,
    voice: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiSpeechProvider {
    pub fn from_config(cfg: &TtsConfig) -> Result<Self> {
        let api_key = Config::api_key(&cfg.api_key_env)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            voice: cfg.voice.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for OpenAiSpeechProvider {
    async fn synthesize(&self, text: &str) -> Result<BoxStream<'static, Result<Vec<u8>>>> {
        let url = format!("{}/audio/speech", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "voice": self.voice,
            "input": text,
            "response_format": "opus",
        });

        tracing::debug!(voice = %self.voice, chars = text.len(), "speech synthesis request");

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
                provider: "openai_speech".into(),
                message: format!("HTTP {} - {}", status.as_u16(), err_text),
            });
        }

        let stream = async_stream::stream! {
            let mut resp = resp;
            loop {
                match resp.chunk().await {
                    Ok(Some(bytes)) => yield Ok(bytes.to_vec()),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(from_reqwest(e));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
