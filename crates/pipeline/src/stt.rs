//! STT worker: feeds inbound PCM into the streaming recognizer and
//! re-emits its events on the bus.
//!
//! Finals are accumulated so `on_utterance_end` can carry the joined text
//! of the utterance. The raw PCM is also kept for on-demand snapshots
//! (`stt_save` from the data channel).

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use cb_domain::config::StorageConfig;
use cb_domain::event::Event;
use cb_domain::stream::SttEvent;
use cb_domain::Result;
use cb_media::{pcm, wav, TRANSPORT_SAMPLE_RATE};
use cb_providers::SpeechRecognizer;

use crate::bus::EventBus;
use crate::worker::Shutdown;

pub struct SttWorker {
    recognizer: Arc<dyn SpeechRecognizer>,
    storage: StorageConfig,
    finals: Vec<String>,
    pcm_log: Vec<u8>,
}

impl SttWorker {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, storage: StorageConfig) -> Self {
        Self {
            recognizer,
            storage,
            finals: Vec::new(),
            pcm_log: Vec::new(),
        }
    }

    /// Open the recognizer session and run until the audio channel closes
    /// or the session shuts down.
    pub fn spawn(
        mut self,
        mut audio: mpsc::Receiver<Vec<u8>>,
        bus: EventBus,
        mut shutdown: Shutdown,
    ) -> JoinHandle<Result<()>> {
        let mut commands = bus.subscribe(&["stt_save"]);
        tokio::spawn(async move {
            let mut session = self.recognizer.start().await?;
            tracing::info!("stt session open");

            loop {
                tokio::select! {
                    maybe_chunk = audio.recv() => {
                        let Some(chunk) = maybe_chunk else { break };
                        self.pcm_log.extend_from_slice(&chunk);
                        if session.audio.send(chunk).await.is_err() {
                            tracing::warn!("stt session sink closed");
                            break;
                        }
                    }
                    maybe_event = session.events.recv() => {
                        let Some(event) = maybe_event else {
                            tracing::warn!("stt session event stream ended");
                            break;
                        };
                        self.on_session_event(event, &bus);
                    }
                    maybe_command = commands.recv() => {
                        let Some(command) = maybe_command else { break };
                        if matches!(&*command, Event::SttSave) {
                            self.save(&bus);
                        }
                    }
                    _ = shutdown.wait() => break,
                }
            }

            tracing::debug!("stt worker stopped");
            Ok(())
        })
    }

    fn on_session_event(&mut self, event: SttEvent, bus: &EventBus) {
        match event {
            SttEvent::Transcript {
                text,
                confidence,
                is_final,
                speech_final,
                duration,
            } => {
                // zero-confidence frames are vendor noise
                if confidence == 0.0 {
                    return;
                }
                if is_final {
                    tracing::debug!(%text, confidence, duration, speech_final, "final");
                    if !text.is_empty() {
                        self.finals.push(text.clone());
                    }
                    bus.publish(Event::SpeechFinal { text, confidence });
                } else {
                    bus.publish(Event::SpeechInterim { text, confidence });
                }
            }
            SttEvent::UtteranceEnd => {
                if self.finals.is_empty() {
                    tracing::debug!("utterance end with no new finals");
                    return;
                }
                let text = self.finals.join(" ");
                self.finals.clear();
                bus.publish(Event::UtteranceEnd { text });
            }
            SttEvent::Open => tracing::info!("stt connection opened"),
            SttEvent::Close => tracing::warn!("stt connection closed"),
            SttEvent::Metadata { duration } => tracing::debug!(duration, "stt metadata"),
            SttEvent::Error { message } => tracing::warn!(%message, "stt error"),
        }
    }

    /// Snapshot the buffered PCM to `audio_log/YYYYMMDD_HHMMSS.wav`
    /// (stereo input downmixed to mono) and reset the buffers.
    fn save(&mut self, bus: &EventBus) {
        if self.pcm_log.is_empty() {
            return;
        }
        let file_name = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let dir = &self.storage.audio_log_dir;
        let result = std::fs::create_dir_all(dir).map_err(cb_domain::Error::Io).and_then(|_| {
            let samples = pcm::stereo_to_mono_i16(&pcm::bytes_to_i16(&self.pcm_log));
            let path = dir.join(format!("{file_name}.wav"));
            wav::write_wav(&path, &samples, TRANSPORT_SAMPLE_RATE, 1)
        });

        match result {
            Ok(()) => {
                let seconds =
                    self.pcm_log.len() as f64 / (TRANSPORT_SAMPLE_RATE as f64 * 2.0 * 2.0);
                tracing::info!(file_name, seconds, "saved audio snapshot");
                bus.publish(Event::AudioLogReady { file_name });
                self.pcm_log.clear();
                self.finals.clear();
            }
            Err(e) => tracing::warn!(error = %e, "audio snapshot failed"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use cb_providers::SttSessionHandle;

    /// Recognizer whose session replays a scripted event sequence and
    /// swallows audio.
    struct Scripted {
        events: parking_lot::Mutex<Vec<SttEvent>>,
    }

    #[async_trait::async_trait]
    impl SpeechRecognizer for Scripted {
        async fn start(&self) -> Result<SttSessionHandle> {
            let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(16);
            let (event_tx, event_rx) = mpsc::unbounded_channel();
            for event in self.events.lock().drain(..) {
                let _ = event_tx.send(event);
            }
            tokio::spawn(async move { while audio_rx.recv().await.is_some() {} });
            Ok(SttSessionHandle {
                audio: audio_tx,
                events: event_rx,
            })
        }
    }

    fn transcript(text: &str, confidence: f32, is_final: bool) -> SttEvent {
        SttEvent::Transcript {
            text: text.into(),
            confidence,
            is_final,
            speech_final: false,
            duration: 0.5,
        }
    }

    async fn run_events(events: Vec<SttEvent>) -> Vec<Arc<Event>> {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(&[
            "on_speech_interim",
            "on_speech_final",
            "on_utterance_end",
        ]);
        let shutdown = Shutdown::new();
        let worker = SttWorker::new(
            Arc::new(Scripted {
                events: parking_lot::Mutex::new(events),
            }),
            StorageConfig::default(),
        );
        let (audio_tx, audio_rx) = mpsc::channel(4);
        let handle = worker.spawn(audio_rx, bus.clone(), shutdown.clone());

        // give the scripted events time to flow, then close the session
        tokio::task::yield_now().await;
        drop(audio_tx);
        handle.await.unwrap().unwrap();

        let mut out = Vec::new();
        while let Ok(event) = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            rx.recv(),
        )
        .await
        {
            match event {
                Some(e) => out.push(e),
                None => break,
            }
        }
        out
    }

    #[tokio::test]
    async fn interim_and_final_are_reemitted() {
        let events = run_events(vec![
            transcript("hel", 0.4, false),
            transcript("hello there", 0.93, true),
        ])
        .await;
        assert!(matches!(&*events[0], Event::SpeechInterim { text, .. } if text == "hel"));
        assert!(
            matches!(&*events[1], Event::SpeechFinal { text, confidence } if text == "hello there" && *confidence > 0.9)
        );
    }

    #[tokio::test]
    async fn zero_confidence_frames_are_dropped() {
        let events = run_events(vec![
            transcript("ghost", 0.0, true),
            transcript("real", 0.8, true),
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&*events[0], Event::SpeechFinal { text, .. } if text == "real"));
    }

    #[tokio::test]
    async fn utterance_end_joins_accumulated_finals() {
        let events = run_events(vec![
            transcript("one thing", 0.9, true),
            transcript("and another", 0.9, true),
            SttEvent::UtteranceEnd,
        ])
        .await;
        let last = events.last().unwrap();
        assert!(
            matches!(&**last, Event::UtteranceEnd { text } if text == "one thing and another")
        );
    }

    #[tokio::test]
    async fn utterance_end_without_finals_is_silent() {
        let events = run_events(vec![SttEvent::UtteranceEnd]).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn save_writes_mono_snapshot_and_resets() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = StorageConfig::default();
        storage.audio_log_dir = dir.path().join("audio_log");

        let mut worker = SttWorker::new(
            Arc::new(Scripted {
                events: parking_lot::Mutex::new(vec![]),
            }),
            storage,
        );
        // two stereo sample pairs: (1000, 3000) and (-2000, -4000)
        for sample in [1000i16, 3000, -2000, -4000] {
            worker.pcm_log.extend_from_slice(&sample.to_le_bytes());
        }

        let bus = EventBus::new();
        let mut rx = bus.subscribe(&["audio_log_ready"]);
        worker.save(&bus);
        assert!(worker.pcm_log.is_empty());

        let event = rx.recv().await.unwrap();
        let Event::AudioLogReady { file_name } = &*event else {
            panic!("expected audio_log_ready, got {event:?}");
        };

        let raw = std::fs::read(
            dir.path().join("audio_log").join(format!("{file_name}.wav")),
        )
        .unwrap();
        // fmt chunk says mono, payload is the downmixed pair averages
        assert_eq!(u16::from_le_bytes([raw[22], raw[23]]), 1);
        assert_eq!(i16::from_le_bytes([raw[44], raw[45]]), 2000);
        assert_eq!(i16::from_le_bytes([raw[46], raw[47]]), -3000);
        assert_eq!(raw.len(), 44 + 4);
    }
}
