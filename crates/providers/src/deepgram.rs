//! Streaming speech-recognition adapter (Deepgram live websocket).
//!
//! The session parameters are a fixed contract with the rest of the
//! pipeline: interim results on, punctuation on, endpointing at 100 ms,
//! no smart formatting, no numeral substitution, linear16 stereo at
//! 48 kHz. The coordinator's endpointing policy depends on transcripts
//! behaving exactly this way — change them only together.

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use cb_domain::config::{Config, SttConfig};
use cb_domain::stream::SttEvent;
use cb_domain::{Error, Result};

use crate::traits::{SpeechRecognizer, SttSessionHandle};

/// Keepalive cadence while no audio is flowing.
const KEEPALIVE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

pub struct DeepgramRecognizer {
    url: String,
    api_key: String,
}

impl DeepgramRecognizer {
    pub fn from_config(cfg: &SttConfig) -> Result<Self> {
        let api_key = Config::api_key(&cfg.api_key_env)?;
        Ok(Self {
            url: session_url(cfg),
            api_key,
        })
    }
}

/// Build the live-session URL with the fixed parameter contract.
fn session_url(cfg: &SttConfig) -> String {
    format!(
        "{}?model={}&language={}&encoding=linear16&channels=2&sample_rate=48000\
         &interim_results=true&punctuate=true&endpointing={}\
         &smart_format=false&numerals=false&filler_words=false\
         &profanity_filter=false&no_delay=true&vad_events=false",
        cfg.url, cfg.model, cfg.language, cfg.endpointing_ms
    )
}

/// Parse one vendor JSON frame into an [`SttEvent`].
///
/// Unknown frame types yield `None` (logged and skipped by the caller);
/// a `Results` frame missing its alternatives is a protocol error that we
/// also skip rather than kill the session over.
fn parse_frame(raw: &str) -> Option<SttEvent> {
    let v: serde_json::Value = serde_json::from_str(raw).ok()?;
    match v.get("type").and_then(|t| t.as_str())? {
        "Results" => {
            let alt = v
                .get("channel")
                .and_then(|c| c.get("alternatives"))
                .and_then(|a| a.as_array())
                .and_then(|a| a.first())?;
            Some(SttEvent::Transcript {
                text: alt
                    .get("transcript")
                    .and_then(|t| t.as_str())
                    .unwrap_or("")
                    .to_string(),
                confidence: alt
                    .get("confidence")
                    .and_then(|c| c.as_f64())
                    .unwrap_or(0.0) as f32,
                is_final: v.get("is_final").and_then(|b| b.as_bool()).unwrap_or(false),
                speech_final: v
                    .get("speech_final")
                    .and_then(|b| b.as_bool())
                    .unwrap_or(false),
                duration: v.get("duration").and_then(|d| d.as_f64()).unwrap_or(0.0) as f32,
            })
        }
        "UtteranceEnd" => Some(SttEvent::UtteranceEnd),
        "Metadata" => Some(SttEvent::Metadata {
            duration: v.get("duration").and_then(|d| d.as_f64()).unwrap_or(0.0) as f32,
        }),
        "Error" => Some(SttEvent::Error {
            message: v
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
                .to_string(),
        }),
        other => {
            tracing::debug!(frame_type = other, "unhandled recognizer frame");
            None
        }
    }
}

#[async_trait::async_trait]
impl SpeechRecognizer for DeepgramRecognizer {
    async fn start(&self) -> Result<SttSessionHandle> {
        let mut request = self
            .url
            .clone()
            .into_client_request()
            .map_err(|e| Error::Http(e.to_string()))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Token {}", self.api_key)
                .parse()
                .map_err(|_| Error::Config("API key contains invalid header bytes".into()))?,
        );

        let (ws, _) = connect_async(request)
            .await
            .map_err(|e| Error::Http(format!("recognizer connect: {e}")))?;
        let (mut sink, mut source) = ws.split();

        let (audio_tx, mut audio_rx) = tokio::sync::mpsc::channel::<Vec<u8>>(64);
        let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel::<SttEvent>();

        let _ = event_tx.send(SttEvent::Open);

        // Writer: forward audio, keep the session alive through silence,
        // and ask the vendor to flush when the audio channel closes.
        tokio::spawn(async move {
            let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
            keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    chunk = audio_rx.recv() => match chunk {
                        Some(pcm) => {
                            if sink.send(Message::Binary(pcm)).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = sink
                                .send(Message::Text(r#"{"type":"CloseStream"}"#.into()))
                                .await;
                            break;
                        }
                    },
                    _ = keepalive.tick() => {
                        if sink
                            .send(Message::Text(r#"{"type":"KeepAlive"}"#.into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });

        // Reader: translate vendor frames into session events.
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(raw)) => {
                        if let Some(event) = parse_frame(&raw) {
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        let _ = event_tx.send(SttEvent::Close);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = event_tx.send(SttEvent::Error {
                            message: e.to_string(),
                        });
                        break;
                    }
                }
            }
        });

        Ok(SttSessionHandle {
            audio: audio_tx,
            events: event_rx,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_the_fixed_contract() {
        let url = session_url(&SttConfig::default());
        for param in [
            "interim_results=true",
            "punctuate=true",
            "endpointing=100",
            "smart_format=false",
            "numerals=false",
            "encoding=linear16",
            "channels=2",
            "sample_rate=48000",
            "vad_events=false",
        ] {
            assert!(url.contains(param), "missing {param} in {url}");
        }
    }

    #[test]
    fn results_frame_parses_first_alternative() {
        let raw = r#"{
            "type": "Results",
            "is_final": true,
            "speech_final": false,
            "duration": 1.44,
            "channel": { "alternatives": [
                { "transcript": "hello there", "confidence": 0.97, "words": [] },
                { "transcript": "yellow hair", "confidence": 0.41, "words": [] }
            ]}
        }"#;
        match parse_frame(raw) {
            Some(SttEvent::Transcript {
                text,
                confidence,
                is_final,
                speech_final,
                duration,
            }) => {
                assert_eq!(text, "hello there");
                assert!((confidence - 0.97).abs() < 1e-6);
                assert!(is_final);
                assert!(!speech_final);
                assert!((duration - 1.44).abs() < 1e-6);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn utterance_end_and_metadata() {
        assert!(matches!(
            parse_frame(r#"{"type":"UtteranceEnd","last_word_end":3.1}"#),
            Some(SttEvent::UtteranceEnd)
        ));
        assert!(matches!(
            parse_frame(r#"{"type":"Metadata","duration":12.5}"#),
            Some(SttEvent::Metadata { .. })
        ));
    }

    #[test]
    fn unknown_frames_are_skipped() {
        assert!(parse_frame(r#"{"type":"SpeechStarted"}"#).is_none());
        assert!(parse_frame("not json at all").is_none());
    }

    #[test]
    fn results_without_alternatives_is_skipped() {
        assert!(parse_frame(r#"{"type":"Results","channel":{}}"#).is_none());
    }
}
